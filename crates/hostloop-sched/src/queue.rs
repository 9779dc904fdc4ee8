//! Time-and-priority ordered queue of pending tasks

use crate::task::{Priority, Runnable, Task};
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// Pending tasks ordered by `(deadline, priority, insertion sequence)`
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<Task>,
    next_seq: u64,
}

impl TaskQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job. Returns the sequence number it was given.
    pub fn insert(&mut self, deadline: Instant, priority: Priority, job: Box<dyn Runnable>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Task::new(deadline, priority, seq, job));
        seq
    }

    /// Whether no task is queued
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of queued tasks, cancelled ones included
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Remove and return every task with `deadline <= now`, in queue order
    pub fn pop_due(&mut self, now: Instant) -> Vec<Task> {
        let mut due = Vec::new();
        while let Some(next) = self.heap.peek() {
            if next.deadline() > now {
                break;
            }
            if let Some(task) = self.heap.pop() {
                due.push(task);
            }
        }
        due
    }

    /// Deadline of the first queued task
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(Task::deadline)
    }

    /// Time left until the first task is due, `None` if empty.
    ///
    /// Saturates at zero: a zero duration means the task is already due.
    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Number of queued tasks whose handles are not cancelled
    pub fn pending_uncancelled(&self) -> usize {
        self.heap.iter().filter(|task| !task.is_cancelled()).count()
    }

    /// Remove every task, in queue order
    pub fn drain(&mut self) -> Vec<Task> {
        let mut tasks = std::mem::take(&mut self.heap).into_sorted_vec();
        // `into_sorted_vec` is ascending by `Ord`, which is reversed
        tasks.reverse();
        tasks
    }
}
