//! Task ready queue implementation (internal use only).
use std::collections::VecDeque;

use crate::{task::TaskId, utils::PrioBitmap};

/// Tracks the tasks in the Ready state, sorted by priority.
///
/// Each priority level has its own FIFO queue. A bitmap remembers which
/// levels are non-empty, so that finding the most urgent level doesn't
/// require scanning every queue.
#[derive(Debug)]
pub(crate) struct ReadyQueue {
    queues: Vec<VecDeque<TaskId>>,
    // Invariant: `bitmap.get(i) == !queues[i].is_empty()`
    bitmap: PrioBitmap,
}

impl ReadyQueue {
    pub(crate) fn new(num_levels: usize) -> Self {
        Self {
            queues: vec![VecDeque::new(); num_levels],
            bitmap: PrioBitmap::default(),
        }
    }

    /// Insert `task` after all Ready tasks having the same priority.
    pub(crate) fn push_back(&mut self, task: TaskId, priority: usize) {
        self.queues[priority].push_back(task);
        self.bitmap.set(priority);
    }

    /// Insert `task` before all Ready tasks having the same priority. Used
    /// when a running task is preempted, so that it resumes as soon as the
    /// more urgent tasks are done.
    pub(crate) fn push_front(&mut self, task: TaskId, priority: usize) {
        self.queues[priority].push_front(task);
        self.bitmap.set(priority);
    }

    /// Get the priority of the most urgent Ready task.
    pub(crate) fn highest_priority(&self) -> Option<usize> {
        self.bitmap.find_set()
    }

    /// Remove and return the most urgent Ready task.
    pub(crate) fn pop_front(&mut self) -> Option<TaskId> {
        let priority = self.bitmap.find_set()?;
        let queue = &mut self.queues[priority];
        let task = queue.pop_front();
        if queue.is_empty() {
            self.bitmap.clear(priority);
        }
        task
    }
}
