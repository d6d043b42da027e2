//! Wait queues and the Waiting state of tasks
use std::collections::VecDeque;

use crate::{
    event_group::EventBits,
    klock::CpuLockGuard,
    state::State,
    task::{self, TaskId, TaskState},
    timeout::{Timeout, TimeoutKind},
    Kernel,
};

/// Describes *what* a task is waiting for.
#[derive(Debug)]
pub(crate) enum WaitObject {
    /// Waiting for the condition registered in the event group's waiter slot.
    EventGroup(usize),
    Semaphore(usize),
    /// Waiting for a message to arrive in an empty mailbox.
    MailboxRecv(usize),
    /// Waiting for a free slot in a full mailbox. The message to deliver is
    /// carried by the wait itself.
    MailboxSend(usize, Box<[u8]>),
    /// Waiting for the timeout only.
    Sleep,
}

/// Information delivered by a wake-upper.
#[derive(Debug)]
pub(crate) enum WaitPayload {
    None,
    /// The event group bits observed when the condition was satisfied.
    Bits(EventBits),
    /// A message handed over by a writer.
    Message(Box<[u8]>),
}

#[derive(Debug)]
pub(crate) enum WaitOutcome {
    Complete(WaitPayload),
    Timeout,
}

/// The ongoing wait operation of a task.
#[derive(Debug)]
pub(crate) struct Wait {
    pub(crate) object: WaitObject,
    /// Distinguishes this wait from the task's earlier ones.
    pub(crate) seq: u64,
}

/// A FIFO queue of tasks waiting on a particular waitable object. The tasks
/// must be in the Blocked state.
#[derive(Debug, Default)]
pub(crate) struct WaitQueue {
    waits: VecDeque<TaskId>,
}

impl WaitQueue {
    pub(crate) fn push_back(&mut self, task: TaskId) {
        self.waits.push_back(task);
    }

    pub(crate) fn pop_front(&mut self) -> Option<TaskId> {
        self.waits.pop_front()
    }

    pub(crate) fn remove(&mut self, task: TaskId) {
        self.waits.retain(|&t| t != task);
    }
}

/// Transition the running task `task` into the Blocked state and hand over
/// the CPU. Returns when the task is woken up, either by a wake-upper (which
/// must have removed the task from the object's wait queue and called
/// [`complete_wait`]) or by the timeout.
///
/// The caller is responsible for registering `task` with the waitable object
/// before calling this function. `timeout` must not be a no-wait timeout.
pub(crate) fn wait<'a>(
    kernel: &'a Kernel,
    mut st: CpuLockGuard<'a>,
    task: TaskId,
    object: WaitObject,
    timeout: Timeout,
) -> (CpuLockGuard<'a>, WaitOutcome) {
    debug_assert!(!timeout.is_no_wait());
    debug_assert_eq!(st.running_task, Some(task));

    let seq = st.next_wait_seq;
    st.next_wait_seq += 1;

    if let Some(at) = timeout.arrival(st.now) {
        st.timeouts.insert(at, TimeoutKind::TaskWait { task, wait_seq: seq });
    }

    log::trace!("task {task} starts waiting on {object:?}");
    let task_cb = &mut st.tasks[task];
    task_cb.wait = Some(Wait { object, seq });
    task_cb.wait_outcome = None;
    task_cb.st = TaskState::Blocked;
    st.running_task = None;

    let mut st = task::switch_out(kernel, st, task);

    let outcome = match st.tasks[task].wait_outcome.take() {
        Some(outcome) => outcome,
        None => unreachable!("task {task} was resumed without a wait outcome"),
    };
    (st, outcome)
}

/// Deassociate the wait from the waiting task `task` and make the task
/// Ready. Returns the wait object so that the wake-upper can take the data
/// carried by it.
///
/// The task must have been removed from the object's wait queue.
///
/// This function doesn't yield the processor. Call
/// `unlock_cpu_and_check_preemption` as needed.
pub(crate) fn complete_wait(st: &mut State, task: TaskId, payload: WaitPayload) -> WaitObject {
    let wait = match st.tasks[task].wait.take() {
        Some(wait) => wait,
        None => unreachable!("task {task} is not waiting"),
    };
    log::trace!("task {task} is woken up from {:?}", wait.object);
    st.tasks[task].wait_outcome = Some(WaitOutcome::Complete(payload));
    task::make_ready(st, task);
    wait.object
}

/// Abort the wait of `task` because its timeout has arrived.
pub(crate) fn expire_wait(st: &mut State, task: TaskId) {
    let wait = match st.tasks[task].wait.take() {
        Some(wait) => wait,
        None => unreachable!("task {task} is not waiting"),
    };
    log::trace!("the wait of task {task} on {:?} timed out", wait.object);

    // Remove the task from the wait queue
    match wait.object {
        WaitObject::EventGroup(group) => {
            let event_group_cb = &mut st.event_groups[group];
            if matches!(event_group_cb.waiter, Some((waiter, _)) if waiter == task) {
                event_group_cb.waiter = None;
            }
        }
        WaitObject::Semaphore(semaphore) => {
            st.semaphores[semaphore].wait_queue.remove(task);
        }
        WaitObject::MailboxRecv(mailbox) => {
            st.mailboxes[mailbox].readers.remove(task);
        }
        WaitObject::MailboxSend(mailbox, _) => {
            st.mailboxes[mailbox].writers.remove(task);
        }
        WaitObject::Sleep => {}
    }

    st.tasks[task].wait_outcome = Some(WaitOutcome::Timeout);
    task::make_ready(st, task);
}
