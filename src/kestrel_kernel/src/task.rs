//! Tasks
//!
//! Every task is backed by a host thread. At most one of these threads, the
//! one whose task is in the Running state, executes application code at any
//! point of time. The others are parked until the dispatcher selects them.
use std::{
    fmt,
    marker::PhantomData,
    panic::{self, AssertUnwindSafe},
    thread::{self, Thread},
};

use crate::{
    cfg::Cfg,
    context::ContextKind,
    klock::{self, CpuLockGuard},
    state::{self, State},
    timeout::{self, Ticks, Timeout},
    wait::{self, Wait, WaitObject, WaitOutcome},
    HaltReason, Kernel,
};

pub(crate) mod readyqueue;

pub(crate) type TaskId = usize;

/// The entry point of a task.
pub(crate) type TaskEntry = Box<dyn FnOnce(&TaskCx<'_>) + Send>;

/// The default value of [`TaskDefiner::stack_size`].
pub const DEFAULT_STACK_SIZE: usize = 4096;

/// The smallest stack actually allocated for a task thread. Host threads
/// need more room than a microcontroller task because of the logger and the
/// unwinder.
pub const MIN_HOST_STACK_SIZE: usize = 256 * 1024;

/// Represents a single task in a system.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Task(pub(crate) TaskId);

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Task").field(&self.0).finish()
    }
}

impl Task {
    /// Construct a `TaskDefiner` to define a task in a configuration
    /// function.
    pub fn define() -> TaskDefiner {
        TaskDefiner::new()
    }
}

/// The definer (static builder) for [`Task`].
#[must_use = "must call `finish()` to complete registration"]
pub struct TaskDefiner {
    pub(crate) name: Option<String>,
    pub(crate) priority: usize,
    pub(crate) stack_size: usize,
    pub(crate) entry: Option<TaskEntry>,
}

impl TaskDefiner {
    fn new() -> Self {
        Self {
            name: None,
            priority: 0,
            stack_size: DEFAULT_STACK_SIZE,
            entry: None,
        }
    }

    /// \[**Optional**\] Specify the task's name. It's used as the name of the
    /// backing thread and in [`RunReport`](crate::RunReport).
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// \[**Required**\] Specify the task's entry point.
    pub fn start(self, entry: impl FnOnce(&TaskCx<'_>) + Send + 'static) -> Self {
        Self {
            entry: Some(Box::new(entry)),
            ..self
        }
    }

    /// Specify the task's priority. Lower values represent higher
    /// priorities. Defaults to `0`.
    pub fn priority(self, priority: usize) -> Self {
        Self { priority, ..self }
    }

    /// Specify the task's stack size. It's rounded up to
    /// [`MIN_HOST_STACK_SIZE`].
    pub fn stack_size(self, stack_size: usize) -> Self {
        Self { stack_size, ..self }
    }

    /// Complete the definition of a task, returning a reference to the task.
    pub fn finish(self, cfg: &mut Cfg) -> Task {
        Task(cfg.push_task(self))
    }
}

/// The observable state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// The task is waiting for the CPU.
    Ready,
    /// The task holds the CPU.
    Running,
    /// The task is waiting for a synchronization object or a timeout.
    Blocked,
    /// The task's entry point has returned or panicked.
    Terminated,
}

/// *Task control block* - the state data of a task.
pub(crate) struct TaskCb {
    pub(crate) name: String,
    pub(crate) priority: usize,
    pub(crate) stack_size: usize,
    pub(crate) st: TaskState,
    /// Taken by the backing thread when the task starts.
    pub(crate) entry: Option<TaskEntry>,
    /// The backing thread. Assigned at boot time.
    pub(crate) thread: Option<Thread>,
    /// The ongoing wait operation. `Some(_)` iff the task is Blocked.
    pub(crate) wait: Option<Wait>,
    /// The result of the last wait operation. Set by a wake-upper.
    pub(crate) wait_outcome: Option<WaitOutcome>,
}

impl fmt::Debug for TaskCb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TaskCb")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("st", &self.st)
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

impl TaskCb {
    pub(crate) fn new(id: TaskId, definer: TaskDefiner) -> Self {
        Self {
            name: definer.name.unwrap_or_else(|| format!("task{id}")),
            priority: definer.priority,
            stack_size: definer.stack_size.max(MIN_HOST_STACK_SIZE),
            st: TaskState::Ready,
            entry: definer.entry,
            thread: None,
            wait: None,
            wait_outcome: None,
        }
    }
}

/// The context of a task. Passed to a task's entry point.
///
/// This is the only context in which blocking operations can be invoked.
/// It's `!Send` so that it can't leave the task's thread.
pub struct TaskCx<'a> {
    pub(crate) kernel: &'a Kernel,
    pub(crate) task: TaskId,
    _not_send: PhantomData<*const ()>,
}

impl fmt::Debug for TaskCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TaskCx").field("task", &self.task).finish()
    }
}

impl<'a> TaskCx<'a> {
    fn new(kernel: &'a Kernel, task: TaskId) -> Self {
        Self {
            kernel,
            task,
            _not_send: PhantomData,
        }
    }

    /// Get the current task.
    pub fn task(&self) -> Task {
        Task(self.task)
    }

    /// Relinquish the CPU to other Ready tasks of the same priority.
    pub fn yield_now(&self) {
        let mut st = klock::lock_cpu(self.kernel);
        log::trace!("task {} yields", self.task);
        let priority = st.tasks[self.task].priority;
        st.tasks[self.task].st = TaskState::Ready;
        st.ready_queue.push_back(self.task, priority);
        st.running_task = None;
        drop(switch_out(self.kernel, st, self.task));
    }

    /// Block the current task for the specified number of ticks.
    ///
    /// `sleep(0)` is equivalent to [`Self::yield_now`].
    pub fn sleep(&self, duration: Ticks) {
        if duration == 0 {
            return self.yield_now();
        }

        let st = klock::lock_cpu(self.kernel);
        let (st, outcome) = wait::wait(
            self.kernel,
            st,
            self.task,
            WaitObject::Sleep,
            Timeout::Ticks(duration),
        );
        drop(st);
        debug_assert!(matches!(outcome, WaitOutcome::Timeout));
    }

    /// Halt the whole system. [`Kernel::boot`] returns with
    /// [`HaltReason::Requested`].
    pub fn shutdown(&self) -> ! {
        let mut st = klock::lock_cpu(self.kernel);
        log::debug!("task {} requested a shutdown", self.task);
        st.halt(HaltReason::Requested);
        state::release_all(st);
        panic::resume_unwind(Box::new(ShutdownSignal))
    }
}

// Dispatcher
// ---------------------------------------------------------------------------

/// The unwinding payload used to tear down task threads when the system
/// halts.
pub(crate) struct ShutdownSignal;

enum Switch<'a> {
    /// The current task was chosen again.
    Resumed(CpuLockGuard<'a>),
    /// The CPU was given to another thread, or the system halted.
    HandedOver,
}

/// Choose the next task to run and give the CPU to it. If no task is Ready,
/// advance the virtual time until one becomes Ready.
///
/// `current` is the task giving up the CPU if it expects to resume later.
/// It must already be in the Ready queue or Blocked.
fn switch<'a>(kernel: &'a Kernel, mut st: CpuLockGuard<'a>, current: Option<TaskId>) -> Switch<'a> {
    debug_assert_eq!(st.running_task, None);

    loop {
        if st.halted.is_some() {
            state::release_all(st);
            return Switch::HandedOver;
        }

        if let Some(next) = st.ready_queue.pop_front() {
            st.tasks[next].st = TaskState::Running;
            st.running_task = Some(next);

            if Some(next) == current {
                return Switch::Resumed(st);
            }

            log::trace!("dispatching task {next} at tick {}", st.now);
            let thread = st.tasks[next].thread.clone();
            drop(st);
            if let Some(thread) = thread {
                thread.unpark();
            }
            return Switch::HandedOver;
        }

        st = timeout::handle_tick(kernel, st);
    }
}

/// Give up the CPU on behalf of `current` and return when `current` is
/// dispatched again.
///
/// If the system halts in the meantime, this function unwinds with
/// [`ShutdownSignal`] instead of returning.
pub(crate) fn switch_out<'a>(
    kernel: &'a Kernel,
    st: CpuLockGuard<'a>,
    current: TaskId,
) -> CpuLockGuard<'a> {
    match switch(kernel, st, Some(current)) {
        Switch::Resumed(st) => st,
        Switch::HandedOver => wait_for_cpu(kernel, current),
    }
}

/// Give up the CPU without expecting to resume. Used by the boot thread and
/// by exiting tasks.
pub(crate) fn leave_cpu<'a>(kernel: &'a Kernel, st: CpuLockGuard<'a>) {
    match switch(kernel, st, None) {
        Switch::Resumed(_) => unreachable!(),
        Switch::HandedOver => {}
    }
}

/// Park the current thread until the dispatcher selects `task`.
fn wait_for_cpu(kernel: &Kernel, task: TaskId) -> CpuLockGuard<'_> {
    loop {
        let st = klock::lock_cpu(kernel);
        if st.halted.is_some() {
            drop(st);
            log::trace!("task {task} is torn down");
            panic::resume_unwind(Box::new(ShutdownSignal));
        }
        if st.running_task == Some(task) {
            return st;
        }
        drop(st);
        thread::park();
    }
}

/// Transition a task into the Ready state, putting it behind the Ready tasks
/// of the same priority.
///
/// This function doesn't yield the processor. Call
/// `unlock_cpu_and_check_preemption` as needed.
pub(crate) fn make_ready(st: &mut State, task: TaskId) {
    let task_cb = &mut st.tasks[task];
    task_cb.st = TaskState::Ready;
    let priority = task_cb.priority;
    st.ready_queue.push_back(task, priority);
}

/// Relinquish CPU Lock. After that, if there's a higher-priority task than
/// the running task, call the dispatcher.
///
/// Wakeups performed by the timer service are not checked here. The
/// dispatcher picks up the woken tasks once the timer service is done.
pub(crate) fn unlock_cpu_and_check_preemption(
    kernel: &Kernel,
    mut st: CpuLockGuard<'_>,
    context: ContextKind,
) {
    let current = match context {
        ContextKind::Task(task) => task,
        ContextKind::Interrupt => return,
    };

    let priority = st.tasks[current].priority;
    let has_preempting_task = st
        .ready_queue
        .highest_priority()
        .map_or(false, |p| p < priority);

    if has_preempting_task {
        log::trace!("task {current} is preempted");
        st.tasks[current].st = TaskState::Ready;
        st.ready_queue.push_front(current, priority);
        st.running_task = None;
        drop(switch_out(kernel, st, current));
    }
}

/// The main function of a task's backing thread.
pub(crate) fn task_main(kernel: Kernel, task: TaskId) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut st = wait_for_cpu(&kernel, task);
        let entry = st.tasks[task].entry.take();
        drop(st);

        log::debug!("task {task} is now running");
        if let Some(entry) = entry {
            entry(&TaskCx::new(&kernel, task));
        }
    }));

    match result {
        Ok(()) => {
            let mut st = klock::lock_cpu(&kernel);
            log::debug!("task {task} exited at tick {}", st.now);
            st.tasks[task].st = TaskState::Terminated;
            st.running_task = None;
            leave_cpu(&kernel, st);
        }
        Err(payload) if payload.is::<ShutdownSignal>() => {}
        Err(payload) => {
            let mut st = klock::lock_cpu(&kernel);
            log::debug!("task {task} panicked at tick {}", st.now);
            st.tasks[task].st = TaskState::Terminated;
            st.panic.get_or_insert(payload);
            st.halt(HaltReason::Panicked);
            state::release_all(st);
        }
    }
}
