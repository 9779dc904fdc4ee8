//! Result handle ("future") shared between a scheduled task and its callers
//!
//! The executor thread moves a handle through `Pending -> Running ->
//! {Completed, Failed}`; any thread may move it `Pending -> Cancelled`.
//! Terminal states are final. Waiters block on a condvar that is notified
//! on every terminal transition.

use crate::error::{ActionError, SchedulerError, TaskError};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Observable state of a result handle
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HandleStatus {
    /// Scheduled, not yet started
    Pending,
    /// Action is executing on the worker
    Running,
    /// Action returned a value
    Completed,
    /// Action returned an error or panicked
    Failed,
    /// Cancelled before it started
    Cancelled,
}

impl HandleStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            HandleStatus::Completed | HandleStatus::Failed | HandleStatus::Cancelled
        )
    }
}

enum Slot<T> {
    Pending,
    Running,
    Completed(T),
    Failed(ActionError),
    Cancelled,
}

impl<T> Slot<T> {
    fn status(&self) -> HandleStatus {
        match self {
            Slot::Pending => HandleStatus::Pending,
            Slot::Running => HandleStatus::Running,
            Slot::Completed(_) => HandleStatus::Completed,
            Slot::Failed(_) => HandleStatus::Failed,
            Slot::Cancelled => HandleStatus::Cancelled,
        }
    }
}

impl<T: Clone> Slot<T> {
    fn outcome(&self) -> Option<Result<T, TaskError>> {
        match self {
            Slot::Pending | Slot::Running => None,
            Slot::Completed(value) => Some(Ok(value.clone())),
            Slot::Failed(error) => Some(Err(TaskError::Failed(error.clone()))),
            Slot::Cancelled => Some(Err(TaskError::Cancelled)),
        }
    }
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    done: Condvar,
}

/// Cross-thread handle to the eventual outcome of one scheduled task
pub struct ResultHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> ResultHandle<T> {
    /// Create a handle in the `Pending` state
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::Pending),
                done: Condvar::new(),
            }),
        }
    }

    /// Current state
    pub fn status(&self) -> HandleStatus {
        self.shared.slot.lock().status()
    }

    /// Whether the handle reached a terminal state
    pub fn is_done(&self) -> bool {
        self.status().is_terminal()
    }

    /// Whether the handle was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.status() == HandleStatus::Cancelled
    }

    /// Whether the action is executing right now
    pub fn is_running(&self) -> bool {
        self.status() == HandleStatus::Running
    }

    /// Cancel the task if it has not started yet.
    ///
    /// Returns `false` when the action is already running or the handle is
    /// terminal; the outcome is then recorded normally.
    pub fn cancel(&self) -> bool {
        let mut slot = self.shared.slot.lock();
        match *slot {
            Slot::Pending => {
                *slot = Slot::Cancelled;
                self.shared.done.notify_all();
                true
            }
            _ => false,
        }
    }

    /// Mark the action as started. Returns `false` if the handle was
    /// cancelled, in which case the action must not run.
    pub fn set_running(&self) -> bool {
        let mut slot = self.shared.slot.lock();
        match *slot {
            Slot::Pending => {
                *slot = Slot::Running;
                true
            }
            _ => false,
        }
    }

    /// Record the action's value
    pub fn set_result(&self, value: T) -> Result<(), SchedulerError> {
        self.settle(Slot::Completed(value))
    }

    /// Record the action's failure
    pub fn set_error(&self, error: ActionError) -> Result<(), SchedulerError> {
        self.settle(Slot::Failed(error))
    }

    fn settle(&self, outcome: Slot<T>) -> Result<(), SchedulerError> {
        let mut slot = self.shared.slot.lock();
        if !matches!(*slot, Slot::Running) {
            return Err(SchedulerError::ConsistencyViolation {
                from: slot.status(),
                to: outcome.status(),
            });
        }
        *slot = outcome;
        self.shared.done.notify_all();
        Ok(())
    }
}

impl<T: Clone> ResultHandle<T> {
    /// Block until the handle is terminal and return its outcome
    pub fn await_result(&self) -> Result<T, TaskError> {
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(outcome) = slot.outcome() {
                return outcome;
            }
            self.shared.done.wait(&mut slot);
        }
    }

    /// Block for at most `timeout`. Returns `None` if the handle is still
    /// pending or running when the time is up.
    pub fn await_timeout(&self, timeout: Duration) -> Option<Result<T, TaskError>> {
        // A timeout past the representable range waits forever
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.await_result());
        };
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(outcome) = slot.outcome() {
                return Some(outcome);
            }
            if self.shared.done.wait_until(&mut slot, deadline).timed_out() {
                return slot.outcome();
            }
        }
    }

    /// Outcome without blocking, if terminal
    pub fn try_result(&self) -> Option<Result<T, TaskError>> {
        self.shared.slot.lock().outcome()
    }
}

impl<T> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for ResultHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ResultHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("status", &self.status())
            .finish()
    }
}
