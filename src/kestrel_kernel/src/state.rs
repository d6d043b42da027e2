//! The kernel state protected by CPU Lock
use std::{any::Any, thread::Thread};

use crate::{
    event_group::EventGroupCb,
    klock::CpuLockGuard,
    mailbox::MailboxCb,
    semaphore::SemaphoreCb,
    task::{readyqueue::ReadyQueue, TaskCb, TaskId},
    timeout::{TimeoutHeap, TimeoutKind},
    timer::TimerCb,
    HaltReason, Ticks,
};

pub(crate) struct State {
    /// The current virtual time.
    pub(crate) now: Ticks,
    /// The run stops when the clock would have to be advanced past this
    /// point.
    pub(crate) time_limit: Ticks,

    pub(crate) tasks: Vec<TaskCb>,
    pub(crate) ready_queue: ReadyQueue,
    /// The task currently holding the CPU. `None` while the dispatcher or the
    /// timer service is running.
    pub(crate) running_task: Option<TaskId>,

    pub(crate) event_groups: Vec<EventGroupCb>,
    pub(crate) semaphores: Vec<SemaphoreCb>,
    pub(crate) mailboxes: Vec<MailboxCb>,
    pub(crate) timers: Vec<TimerCb>,

    pub(crate) timeouts: TimeoutHeap,
    /// Incremented every time a task starts waiting. Used to tell a live
    /// wait timeout from a stale one.
    pub(crate) next_wait_seq: u64,

    /// Set once the system starts shutting down.
    pub(crate) halted: Option<HaltReason>,
    /// The first panic raised by a task or a timer callback.
    pub(crate) panic: Option<Box<dyn Any + Send>>,
    /// The thread that called [`Kernel::boot`](crate::Kernel::boot).
    pub(crate) boot_thread: Option<Thread>,
}

impl State {
    /// Check if a timeout entry still refers to a pending wait or an armed
    /// timer. Entries are removed lazily, so the heap can hold stale ones.
    pub(crate) fn is_timeout_live(&self, kind: &TimeoutKind) -> bool {
        match *kind {
            TimeoutKind::TaskWait { task, wait_seq } => self.tasks[task]
                .wait
                .as_ref()
                .map_or(false, |wait| wait.seq == wait_seq),
            TimeoutKind::Timer { timer, gen } => {
                let timer_cb = &self.timers[timer];
                timer_cb.active && timer_cb.gen == gen
            }
        }
    }

    /// Start shutting down the system. The first reason wins.
    pub(crate) fn halt(&mut self, reason: HaltReason) {
        if self.halted.is_none() {
            log::debug!("halting at tick {} ({reason:?})", self.now);
            self.halted = Some(reason);
            self.running_task = None;
        }
    }
}

/// Release CPU Lock and wake up every thread managed by the kernel so that
/// they can observe the shutdown.
pub(crate) fn release_all(st: CpuLockGuard<'_>) {
    let threads: Vec<Thread> = st
        .tasks
        .iter()
        .filter_map(|task_cb| task_cb.thread.clone())
        .chain(st.boot_thread.clone())
        .collect();
    drop(st);

    for thread in threads {
        thread.unpark();
    }
}
