#![doc = include_str!("./lib.md")]
#![forbid(unsafe_code)]
use std::{fmt, panic, sync::Arc, thread};

mod cfg;
mod context;
mod error;
mod event_group;
mod klock;
mod mailbox;
mod semaphore;
mod state;
mod task;
mod timeout;
mod timer;
mod utils;
mod wait;

pub use self::{
    cfg::{Cfg, DEFAULT_NUM_TASK_PRIORITY_LEVELS},
    context::{Context, ContextKind, TimerCx},
    error::*,
    event_group::{EventBits, EventGroup, EventGroupDefiner, WaitCondition},
    mailbox::{Mailbox, MailboxDefiner},
    semaphore::{Semaphore, SemaphoreDefiner, SemaphoreMode, SemaphoreValue},
    task::{Task, TaskCx, TaskDefiner, TaskState, DEFAULT_STACK_SIZE, MIN_HOST_STACK_SIZE},
    timeout::{Ticks, Timeout},
    timer::{Timer, TimerDefiner},
    utils::PRIO_BITMAP_MAX_LEN,
};

pub(crate) struct KernelInner {
    pub(crate) state: klock::CpuLock,
}

/// A configured system, ready to boot. Created by [`Cfg::finish`].
pub struct Kernel {
    pub(crate) inner: Arc<KernelInner>,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("self", &Arc::as_ptr(&self.inner))
            .finish_non_exhaustive()
    }
}

/// The reason why a system stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HaltReason {
    /// No task is Ready and no timeout is outstanding, i.e., every task has
    /// exited or is blocked forever.
    Idle,
    /// The clock would have to be advanced past the time limit.
    TimeLimit,
    /// A task called [`TaskCx::shutdown`].
    Requested,
    /// A task or a timer callback panicked. [`Kernel::boot`] re-raises the
    /// panic instead of returning a report with this reason.
    Panicked,
}

/// The final state of a task, included in [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub name: String,
    pub priority: usize,
    pub state: TaskState,
}

/// The outcome of [`Kernel::boot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub reason: HaltReason,
    /// The virtual time when the system halted.
    pub now: Ticks,
    /// The final states of the tasks, in definition order.
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    /// Get the final state of the specified task.
    pub fn task(&self, task: Task) -> &TaskReport {
        &self.tasks[task.0]
    }
}

impl Kernel {
    pub(crate) fn from_inner(inner: KernelInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Get another reference to the same system.
    fn handle(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Start the system and run it until it halts.
    ///
    /// A thread is spawned for each task. All tasks start in the Ready state
    /// and are dispatched in priority order, tasks of the same priority in
    /// definition order. The system runs in virtual time (see [`Ticks`]) and
    /// halts when there's nothing left to do, when the clock would pass
    /// `time_limit`, or when a task requests a shutdown. All threads are
    /// joined before this method returns.
    ///
    /// # Panics
    ///
    /// If a task or a timer callback panics, the system halts and the panic
    /// is propagated to the caller.
    pub fn boot(self, time_limit: Ticks) -> Result<RunReport, BootError> {
        let num_tasks = {
            let mut st = klock::lock_cpu(&self);
            st.time_limit = time_limit;
            st.boot_thread = Some(thread::current());
            st.tasks.len()
        };

        // Spawn the backing threads. They wait until their tasks are
        // dispatched.
        let mut join_handles = Vec::with_capacity(num_tasks);
        for task in 0..num_tasks {
            let (name, stack_size) = {
                let st = klock::lock_cpu(&self);
                (st.tasks[task].name.clone(), st.tasks[task].stack_size)
            };
            let kernel = self.handle();
            let spawn_result = thread::Builder::new()
                .name(name)
                .stack_size(stack_size)
                .spawn(move || task::task_main(kernel, task));

            match spawn_result {
                Ok(join_handle) => {
                    log::trace!("spawned thread {:?} for task {task}", join_handle.thread().id());
                    klock::lock_cpu(&self).tasks[task].thread = Some(join_handle.thread().clone());
                    join_handles.push(join_handle);
                }
                Err(e) => {
                    log::debug!("failed to spawn a thread for task {task}: {e}");
                    let mut st = klock::lock_cpu(&self);
                    st.halt(HaltReason::Requested);
                    state::release_all(st);
                    for join_handle in join_handles {
                        // The threads haven't run any application code
                        let _ = join_handle.join();
                    }
                    return Err(BootError::SpawnThread(e));
                }
            }
        }

        let mut st = klock::lock_cpu(&self);
        for task in 0..num_tasks {
            task::make_ready(&mut st, task);
        }
        log::debug!("booting {num_tasks} tasks (time limit = {time_limit})");
        task::leave_cpu(&self, st);

        // Wait until the system halts
        let reason = loop {
            let st = klock::lock_cpu(&self);
            if let Some(reason) = st.halted {
                break reason;
            }
            drop(st);
            thread::park();
        };

        log::trace!("joining the task threads");
        for join_handle in join_handles {
            if let Err(payload) = join_handle.join() {
                panic::resume_unwind(payload);
            }
        }

        // Propagate any panic that occured in a task or a timer callback
        let mut st = klock::lock_cpu(&self);
        if let Some(payload) = st.panic.take() {
            drop(st);
            panic::resume_unwind(payload);
        }

        Ok(RunReport {
            reason,
            now: st.now,
            tasks: st
                .tasks
                .iter()
                .map(|task_cb| TaskReport {
                    name: task_cb.name.clone(),
                    priority: task_cb.priority,
                    state: task_cb.st,
                })
                .collect(),
        })
    }
}
