//! Executor plus the worker thread that drives it
//!
//! Hosts and the bus each own one context: everything they do happens on
//! its worker thread.

use crate::error::EmuError;
use hostloop_sched::{ExecutorConfig, ExecutorState, SchedulerError, SingleThreadExecutor, WorkerHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) struct ExecutionContext {
    executor: Arc<SingleThreadExecutor>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl ExecutionContext {
    pub(crate) fn new(config: ExecutorConfig) -> Self {
        Self {
            executor: SingleThreadExecutor::with_config(config),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn executor(&self) -> &Arc<SingleThreadExecutor> {
        &self.executor
    }

    pub(crate) fn is_running(&self) -> bool {
        self.executor.state() == ExecutorState::Running
    }

    /// Spawn the worker
    pub(crate) fn start(&self) -> Result<(), EmuError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(SchedulerError::AlreadyRunning.into());
        }
        let handle = self.executor.spawn_worker()?;
        debug!(thread = handle.name(), "worker started");
        *worker = Some(handle);
        Ok(())
    }

    /// Drain the queue, then join the worker. Must not be called from the
    /// worker itself.
    pub(crate) fn stop(&self) -> Result<(), EmuError> {
        self.executor.stop(true);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let name = worker.name().to_string();
            worker
                .join()
                .map_err(|_| EmuError::WorkerPanicked(name.clone()))?;
            debug!(thread = %name, "worker stopped");
        }
        Ok(())
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            self.executor.stop(false);
            let name = worker.name().to_string();
            if worker.join().is_err() {
                warn!(thread = %name, "worker panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_stop() {
        let context = ExecutionContext::new(ExecutorConfig::named("ctx-test"));
        assert!(!context.is_running());

        context.start().unwrap();
        assert!(context.is_running());
        let handle = context.executor().schedule(|| Ok(7)).unwrap();
        assert_eq!(handle.await_result().unwrap(), 7);

        context.stop().unwrap();
        assert!(!context.is_running());
    }

    #[test]
    fn test_double_start_rejected() {
        let context = ExecutionContext::new(ExecutorConfig::default());
        context.start().unwrap();
        assert!(matches!(
            context.start(),
            Err(EmuError::Scheduler(SchedulerError::AlreadyRunning))
        ));
        context.stop().unwrap();
    }

    #[test]
    fn test_restart_after_stop() {
        let context = ExecutionContext::new(ExecutorConfig::default());
        context.start().unwrap();
        context.stop().unwrap();
        context.start().unwrap();
        assert!(context.is_running());
        context.stop().unwrap();
    }

    #[test]
    fn test_stop_without_start() {
        let context = ExecutionContext::new(ExecutorConfig::default());
        context.stop().unwrap();
    }

    #[test]
    fn test_drop_joins_worker() {
        let context = ExecutionContext::new(ExecutorConfig::default());
        context.start().unwrap();
        let executor = Arc::clone(context.executor());
        drop(context);
        assert_eq!(executor.state(), ExecutorState::Stopped);
    }
}
