//! Hostloop scheduler
//!
//! A single-thread cooperative executor for code that must never be
//! entered concurrently, such as a network stack built for a no-OS main
//! loop. Any thread can hand work to the executor; one worker thread runs
//! it in `(deadline, priority, insertion)` order.
//!
//! # Example
//!
//! ```ignore
//! use hostloop_sched::{SingleThreadExecutor, IMMEDIATE, TOP_PRIORITY};
//!
//! let executor = SingleThreadExecutor::new();
//! let worker = executor.spawn_worker()?;
//!
//! let handle = executor.schedule_delayed(IMMEDIATE, TOP_PRIORITY, || Ok(2 + 2))?;
//! assert_eq!(handle.await_result()?, 4);
//!
//! executor.stop(true);
//! worker.join().ok();
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod executor;
pub mod handle;
pub mod queue;
pub mod task;
pub mod unlock;

pub use config::{ConfigError, ExecutorConfig};
pub use error::{ActionError, SchedulerError, TaskError};
pub use executor::{ExecutorState, ExecutorStats, SingleThreadExecutor, WorkerHandle};
pub use handle::{HandleStatus, ResultHandle};
pub use queue::TaskQueue;
pub use task::{Priority, RunOutcome, Runnable, Task, IMMEDIATE, TOP_PRIORITY};
