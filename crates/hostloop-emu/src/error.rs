//! Emulation errors

use crate::bus::PortId;
use crate::stack::StackError;
use hostloop_sched::{ConfigError, SchedulerError, TaskError};

/// Errors raised while building or driving an emulated network
#[derive(Debug, thiserror::Error)]
pub enum EmuError {
    /// The host or bus executor rejected the work
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Work ran on an executor but did not complete
    #[error(transparent)]
    Task(#[from] TaskError),

    /// The network stack reported an error code
    #[error("Stack error: {0}")]
    Stack(#[from] StackError),

    /// Invalid network description
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Malformed dotted-quad address
    #[error("Invalid IPv4 address: {0}")]
    InvalidAddress(String),

    /// A host with this name already exists
    #[error("Duplicate host: {0}")]
    DuplicateHost(String),

    /// The host already has an interface with this name
    #[error("Duplicate interface {interface} on host {host}")]
    DuplicateInterface {
        /// Host name
        host: String,
        /// Interface name
        interface: String,
    },

    /// A port with this id is already attached to the bus
    #[error("Port already attached to the bus: {0}")]
    DuplicatePort(PortId),

    /// No host with this name
    #[error("Unknown host: {0}")]
    UnknownHost(String),

    /// The host has no interface with this name
    #[error("Unknown interface {interface} on host {host}")]
    UnknownInterface {
        /// Host name
        host: String,
        /// Interface name
        interface: String,
    },

    /// A worker thread panicked outside of any task
    #[error("Worker thread {0} panicked")]
    WorkerPanicked(String),
}

impl EmuError {
    /// Unwrap a task outcome, recovering stack errors raised inside the task
    pub(crate) fn settle<T>(outcome: Result<T, TaskError>) -> Result<T, EmuError> {
        match outcome {
            Ok(value) => Ok(value),
            Err(TaskError::Failed(err)) => match err.downcast_ref::<StackError>() {
                Some(stack) => Err(EmuError::Stack(*stack)),
                None => Err(EmuError::Task(TaskError::Failed(err))),
            },
            Err(err) => Err(EmuError::Task(err)),
        }
    }
}
