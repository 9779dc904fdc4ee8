//! Single-thread executor
//!
//! One worker thread sleeps until the earliest deadline in the queue (or
//! until a new task is inserted), pops every due task, and runs them one
//! after another with the queue lock released. Any thread may schedule
//! work or request a stop.
//!
//! Lifecycle:
//!
//! ```text
//!            run()                stop(true), work pending
//! Stopped ---------> Running -------------------------------> DrainAndStop
//!    ^                  |                                          |
//!    |   stop(false) or |                                          |
//!    +------------------+   queue empty or drained tasks done      |
//!    +-------------------------------------------------------------+
//! ```

use crate::config::ExecutorConfig;
use crate::error::SchedulerError;
use crate::handle::ResultHandle;
use crate::queue::TaskQueue;
use crate::task::{Job, Priority, RunOutcome, Task, IMMEDIATE, TOP_PRIORITY};
use crate::unlock::unlocked;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Longest accepted delay; larger delays are clamped so deadlines never overflow
const MAX_DELAY: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

enum Deadline {
    After(Duration),
    At(Instant),
}

/// Lifecycle state of the executor
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExecutorState {
    /// Not accepting work; the loop exits at its next wake
    Stopped,
    /// Accepting and executing work
    Running,
    /// Finishing work accepted before `stop(true)`, rejecting new work
    DrainAndStop,
}

/// Executor statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Tasks accepted by `schedule_delayed`
    pub scheduled: u64,

    /// Actions that returned a value
    pub completed: u64,

    /// Actions that returned an error or panicked
    pub failed: u64,

    /// Popped tasks skipped because their handle was cancelled
    pub skipped: u64,
}

#[derive(Default)]
struct Counters {
    scheduled: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// State guarded by the executor mutex
struct LoopState {
    queue: TaskQueue,
    state: ExecutorState,
    /// Tasks still to run before a drain completes
    remaining: usize,
    /// Set while a thread is inside the loop
    worker_active: bool,
}

/// Executor that runs every task on one dedicated worker thread
pub struct SingleThreadExecutor {
    config: ExecutorConfig,
    state: Mutex<LoopState>,
    /// Signalled on every insert and on stop
    notify: Condvar,
    counters: Counters,
}

impl SingleThreadExecutor {
    /// Create a stopped executor with default settings
    pub fn new() -> Arc<Self> {
        Self::with_config(ExecutorConfig::default())
    }

    /// Create a stopped executor
    pub fn with_config(config: ExecutorConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(LoopState {
                queue: TaskQueue::new(),
                state: ExecutorState::Stopped,
                remaining: 0,
                worker_active: false,
            }),
            notify: Condvar::new(),
            counters: Counters::default(),
        })
    }

    /// Executor settings
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> ExecutorState {
        self.state.lock().state
    }

    /// Number of queued tasks, cancelled ones included
    pub fn pending_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Snapshot of the executor counters
    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
        }
    }

    /// Schedule `action` to run `delay` from now.
    ///
    /// Never waits for the worker. Fails with [`SchedulerError::Stopped`]
    /// unless the executor is `Running`.
    pub fn schedule_delayed<T, F>(
        &self,
        delay: Duration,
        priority: Priority,
        action: F,
    ) -> Result<ResultHandle<T>, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.submit(Deadline::After(delay), priority, action)
    }

    /// Schedule `action` at an absolute deadline. Tasks sharing a deadline
    /// run by priority, then in scheduling order.
    pub fn schedule_at<T, F>(
        &self,
        deadline: Instant,
        priority: Priority,
        action: F,
    ) -> Result<ResultHandle<T>, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.submit(Deadline::At(deadline), priority, action)
    }

    /// Schedule `action` to run as soon as possible at top priority
    pub fn schedule<T, F>(&self, action: F) -> Result<ResultHandle<T>, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.schedule_delayed(IMMEDIATE, TOP_PRIORITY, action)
    }

    /// Run the loop on the calling thread until a stop takes full effect
    pub fn run(&self) -> Result<(), SchedulerError> {
        self.enter()?;
        self.run_loop();
        Ok(())
    }

    /// Switch to `Running` and spawn the worker thread.
    ///
    /// The transition happens before this returns, so work scheduled right
    /// after it is accepted.
    pub fn spawn_worker(self: &Arc<Self>) -> Result<WorkerHandle, SchedulerError> {
        self.enter()?;

        let executor = Arc::clone(self);
        let name = self.config.thread_name.clone();
        let spawned = thread::Builder::new()
            .name(name.clone())
            .spawn(move || executor.run_loop());

        match spawned {
            Ok(handle) => Ok(WorkerHandle { name, handle }),
            Err(e) => {
                let mut guard = self.state.lock();
                guard.worker_active = false;
                guard.state = ExecutorState::Stopped;
                Err(SchedulerError::Spawn(e))
            }
        }
    }

    /// Request the loop to stop.
    ///
    /// With `sync` the worker first runs every non-cancelled task already
    /// queued; without it the worker exits at its next wake and queued tasks
    /// never run. Their handles stay pending unless `cancel_on_abort` is set.
    /// Joining the worker is up to the caller.
    pub fn stop(&self, sync: bool) {
        let mut guard = self.state.lock();
        let pending = guard.queue.pending_uncancelled();

        if guard.state != ExecutorState::Stopped {
            guard.remaining = pending;
            guard.state = if sync && pending > 0 {
                ExecutorState::DrainAndStop
            } else {
                ExecutorState::Stopped
            };
        }

        let abandoned = if !sync && self.config.cancel_on_abort {
            guard.queue.drain()
        } else {
            Vec::new()
        };
        self.notify.notify_all();
        let state = guard.state;
        drop(guard);

        let cancelled = abandoned.iter().filter(|task| task.cancel()).count();
        debug!(sync, pending, cancelled, ?state, "stop requested");
    }

    fn submit<T, F>(
        &self,
        deadline: Deadline,
        priority: Priority,
        action: F,
    ) -> Result<ResultHandle<T>, SchedulerError>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let handle = ResultHandle::new();
        let job = Box::new(Job::new(action, handle.clone()));

        let mut guard = self.state.lock();
        if guard.state != ExecutorState::Running {
            return Err(SchedulerError::Stopped);
        }
        let deadline = match deadline {
            Deadline::After(delay) => Instant::now() + delay.min(MAX_DELAY),
            Deadline::At(at) => at,
        };
        let seq = guard.queue.insert(deadline, priority, job);
        self.notify.notify_one();
        drop(guard);

        self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        trace!(seq, priority, ?deadline, "task scheduled");
        Ok(handle)
    }

    fn enter(&self) -> Result<(), SchedulerError> {
        let mut guard = self.state.lock();
        if guard.worker_active {
            return Err(SchedulerError::AlreadyRunning);
        }
        guard.worker_active = true;
        guard.remaining = 0;
        guard.state = ExecutorState::Running;
        debug!(thread = %self.config.thread_name, "executor running");
        Ok(())
    }

    fn run_loop(&self) {
        let mut guard = self.state.lock();

        while self.wait_for_due(&mut guard) {
            let draining = guard.state == ExecutorState::DrainAndStop;
            let due = guard.queue.pop_due(Instant::now());

            let executed = unlocked(&mut guard, || self.execute(due));

            // Only tasks that were queued when the drain began are counted
            if draining {
                guard.remaining = guard.remaining.saturating_sub(executed);
            }
        }

        guard.worker_active = false;
        debug!(
            thread = %self.config.thread_name,
            left_queued = guard.queue.len(),
            "executor loop exited"
        );
    }

    /// Block until at least one task is due. Returns `false` when the loop
    /// must exit.
    fn wait_for_due(&self, guard: &mut MutexGuard<'_, LoopState>) -> bool {
        loop {
            match guard.state {
                ExecutorState::Stopped => return false,
                ExecutorState::DrainAndStop
                    if guard.queue.is_empty() || guard.remaining == 0 =>
                {
                    guard.state = ExecutorState::Stopped;
                    debug!("drain complete");
                    return false;
                }
                _ => {}
            }

            match guard.queue.time_until_next(Instant::now()) {
                Some(wait) if wait.is_zero() => return true,
                Some(wait) => {
                    self.notify.wait_for(guard, wait);
                }
                None => self.notify.wait(guard),
            }
        }
    }

    /// Run popped tasks in order. Returns how many actions were invoked.
    fn execute(&self, due: Vec<Task>) -> usize {
        let mut executed = 0;
        for task in due {
            let seq = task.seq();
            let priority = task.priority();
            match task.run() {
                RunOutcome::Completed => {
                    self.counters.completed.fetch_add(1, Ordering::Relaxed);
                    executed += 1;
                    trace!(seq, priority, "task completed");
                }
                RunOutcome::Failed => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    executed += 1;
                    debug!(seq, priority, "task failed");
                }
                RunOutcome::Skipped => {
                    self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    trace!(seq, priority, "cancelled task skipped");
                }
            }
        }
        executed
    }
}

/// Join handle for a worker spawned by [`SingleThreadExecutor::spawn_worker`]
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Worker thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker loop has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker to exit
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }

    /// Wait at most `timeout` for the worker to exit. Gives the handle back
    /// if it is still running.
    pub fn join_timeout(self, timeout: Duration) -> Result<thread::Result<()>, Self> {
        let start = Instant::now();
        loop {
            if self.handle.is_finished() {
                return Ok(self.handle.join());
            }
            if start.elapsed() > timeout {
                return Err(self);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}
