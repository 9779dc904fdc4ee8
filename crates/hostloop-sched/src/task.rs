//! Task records and the type-erased jobs they carry

use crate::error::ActionError;
use crate::handle::ResultHandle;
use std::cmp::Ordering;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Task priority. Lower value means higher priority.
pub type Priority = i32;

/// Highest priority
pub const TOP_PRIORITY: Priority = 0;

/// Zero delay
pub const IMMEDIATE: Duration = Duration::ZERO;

/// Outcome of running a job on the worker
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The action returned a value
    Completed,
    /// The action returned an error or panicked
    Failed,
    /// The handle was cancelled, the action was not invoked
    Skipped,
}

/// Work item executed by the worker thread.
///
/// The queue only sees this trait, so tasks with different result types
/// share one queue.
pub trait Runnable: Send {
    /// Run the action once and settle its handle
    fn run(self: Box<Self>) -> RunOutcome;

    /// Whether the associated handle was cancelled
    fn is_cancelled(&self) -> bool;

    /// Cancel the associated handle if it is still pending
    fn cancel(&self) -> bool;
}

/// An action paired with the handle that receives its outcome
pub(crate) struct Job<T, F> {
    action: F,
    handle: ResultHandle<T>,
}

impl<T, F> Job<T, F>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    pub(crate) fn new(action: F, handle: ResultHandle<T>) -> Self {
        Self { action, handle }
    }
}

impl<T, F> Runnable for Job<T, F>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    fn run(self: Box<Self>) -> RunOutcome {
        let Job { action, handle } = *self;
        if !handle.set_running() {
            return RunOutcome::Skipped;
        }

        let (outcome, settled) = match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(value)) => (RunOutcome::Completed, handle.set_result(value)),
            Ok(Err(error)) => (RunOutcome::Failed, handle.set_error(ActionError::new(error))),
            Err(payload) => (
                RunOutcome::Failed,
                handle.set_error(ActionError::from_panic(payload)),
            ),
        };

        if let Err(e) = settled {
            tracing::error!(error = %e, "result handle rejected task outcome");
        }
        outcome
    }

    fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    fn cancel(&self) -> bool {
        self.handle.cancel()
    }
}

/// A scheduled unit of work
pub struct Task {
    deadline: Instant,
    priority: Priority,
    seq: u64,
    job: Box<dyn Runnable>,
}

impl Task {
    pub(crate) fn new(deadline: Instant, priority: Priority, seq: u64, job: Box<dyn Runnable>) -> Self {
        Self {
            deadline,
            priority,
            seq,
            job,
        }
    }

    /// When the task becomes eligible to run
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Task priority
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Insertion sequence number within its queue
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Whether the task's handle was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.job.is_cancelled()
    }

    /// Cancel the task's handle if it has not started
    pub fn cancel(&self) -> bool {
        self.job.cancel()
    }

    /// Execute the action, consuming the task
    pub fn run(self) -> RunOutcome {
        self.job.run()
    }

    fn key(&self) -> (Instant, Priority, u64) {
        (self.deadline, self.priority, self.seq)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("deadline", &self.deadline)
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

// Reverse ordering so `BinaryHeap` pops the earliest (deadline, priority, seq)
impl Ord for Task {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Task {}
