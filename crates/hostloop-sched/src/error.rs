//! Error types for the executor and for task outcomes

use crate::handle::HandleStatus;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Errors raised by the executor itself
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Work was submitted after shutdown was signalled
    #[error("Scheduler is stopped and no longer accepts tasks")]
    Stopped,

    /// A second worker loop was requested while one is active
    #[error("Executor loop is already running on another thread")]
    AlreadyRunning,

    /// A result handle was driven through an invalid transition
    #[error("Invalid result handle transition: {from:?} -> {to:?}")]
    ConsistencyViolation {
        /// State the handle was in
        from: HandleStatus,
        /// State that was requested
        to: HandleStatus,
    },

    /// The worker thread could not be spawned
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failure captured from a task action.
///
/// Cheap to clone so every waiter on a handle observes the same error.
#[derive(Clone)]
pub struct ActionError(Arc<anyhow::Error>);

impl ActionError {
    /// Wrap an action's error
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// Build an error from a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new(anyhow::anyhow!("action panicked: {}", message))
    }

    /// The underlying error
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Attempt to view the cause as a concrete error type
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Debug for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl From<anyhow::Error> for ActionError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

/// Outcome of waiting on a task that did not complete successfully
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// The handle was cancelled before its action started
    #[error("Task was cancelled")]
    Cancelled,

    /// The action returned an error or panicked
    #[error("Task action failed: {0}")]
    Failed(ActionError),
}

impl TaskError {
    /// Whether this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}
