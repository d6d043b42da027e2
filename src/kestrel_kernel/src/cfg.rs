//! Static configuration mechanism for the kernel
//!
//! Every kernel object is defined before boot through its definer, e.g.,
//! [`EventGroup::define`](crate::EventGroup::define). A definer's `finish`
//! method registers the object with a [`Cfg`] and returns a handle. The
//! handle is a plain `Copy` ID, which can be captured by task entry points
//! and timer callbacks freely. [`Cfg::finish`] validates the whole
//! configuration and produces a bootable [`Kernel`].
use std::collections::HashMap;

use crate::{
    error::CfgError,
    event_group::{EventBits, EventGroupCb, EventGroupDefiner, EventLink},
    klock::CpuLock,
    mailbox::{self, MailboxAttr, MailboxCb},
    semaphore::{self, SemaphoreCb, SemaphoreDefiner, SemaphoreMode},
    state::State,
    task::{readyqueue::ReadyQueue, TaskCb, TaskDefiner},
    timeout::TimeoutHeap,
    timer::{self, TimerCb, TimerDefiner},
    utils::PRIO_BITMAP_MAX_LEN,
    Kernel, KernelInner,
};

/// The default number of task priority levels.
pub const DEFAULT_NUM_TASK_PRIORITY_LEVELS: usize = 16;

/// The configuration of a system, populated by definers.
#[must_use = "must call `finish()` to get a kernel"]
pub struct Cfg {
    num_task_priority_levels: usize,
    tasks: Vec<TaskDefiner>,
    event_groups: Vec<EventGroupDefiner>,
    semaphores: Vec<SemaphoreDefiner>,
    mailboxes: Vec<MailboxAttr>,
    timers: Vec<TimerDefiner>,
}

impl Default for Cfg {
    fn default() -> Self {
        Self::new()
    }
}

impl Cfg {
    pub fn new() -> Self {
        Self {
            num_task_priority_levels: DEFAULT_NUM_TASK_PRIORITY_LEVELS,
            tasks: Vec::new(),
            event_groups: Vec::new(),
            semaphores: Vec::new(),
            mailboxes: Vec::new(),
            timers: Vec::new(),
        }
    }

    /// Specify the number of task priority levels. Must be in range
    /// `1..=64`. Defaults to [`DEFAULT_NUM_TASK_PRIORITY_LEVELS`].
    pub fn num_task_priority_levels(&mut self, new_value: usize) {
        self.num_task_priority_levels = new_value;
    }

    pub(crate) fn push_task(&mut self, definer: TaskDefiner) -> usize {
        self.tasks.push(definer);
        self.tasks.len() - 1
    }

    pub(crate) fn push_event_group(&mut self, definer: EventGroupDefiner) -> usize {
        self.event_groups.push(definer);
        self.event_groups.len() - 1
    }

    pub(crate) fn push_semaphore(&mut self, definer: SemaphoreDefiner) -> usize {
        self.semaphores.push(definer);
        self.semaphores.len() - 1
    }

    pub(crate) fn push_mailbox(&mut self, attr: MailboxAttr) -> usize {
        self.mailboxes.push(attr);
        self.mailboxes.len() - 1
    }

    pub(crate) fn push_timer(&mut self, definer: TimerDefiner) -> usize {
        self.timers.push(definer);
        self.timers.len() - 1
    }

    /// Validate the configuration and build a kernel.
    pub fn finish(self) -> Result<Kernel, CfgError> {
        let levels = self.num_task_priority_levels;
        if !(1..=PRIO_BITMAP_MAX_LEN).contains(&levels) {
            return Err(CfgError::BadPriorityLevels { levels });
        }

        if self.tasks.is_empty() {
            return Err(CfgError::NoTasks);
        }

        // Tasks
        let mut tasks = Vec::with_capacity(self.tasks.len());
        for (id, definer) in self.tasks.into_iter().enumerate() {
            if definer.entry.is_none() {
                return Err(CfgError::MissingEntryPoint { object: "task" });
            }
            let task_cb = TaskCb::new(id, definer);
            if task_cb.priority >= levels {
                return Err(CfgError::BadTaskPriority {
                    task: task_cb.name,
                    priority: task_cb.priority,
                });
            }
            tasks.push(task_cb);
        }

        // Event bindings
        let mut links = Vec::new();
        for definer in &self.semaphores {
            let valid_range = match definer.mode {
                SemaphoreMode::Binary => definer.maximum == 1,
                SemaphoreMode::Counting => definer.maximum > 0,
            };
            if !valid_range || definer.initial > definer.maximum {
                return Err(CfgError::BadSemaphoreValue {
                    initial: definer.initial,
                    maximum: definer.maximum,
                });
            }
            links.extend(definer.link);
        }
        for attr in &self.mailboxes {
            if attr.capacity == 0 {
                return Err(CfgError::BadMailboxCapacity);
            }
            if attr.msg_size == 0 {
                return Err(CfgError::BadMessageSize);
            }
            links.extend(attr.reader_link);
            links.extend(attr.writer_link);
        }
        check_event_links(&links, self.event_groups.len())?;

        // Timers
        let mut timers = Vec::with_capacity(self.timers.len());
        for definer in &self.timers {
            let Some(callback) = definer.callback.clone() else {
                return Err(CfgError::MissingEntryPoint { object: "timer" });
            };
            timers.push(TimerCb::new(definer, callback));
        }

        let mut st = State {
            now: 0,
            time_limit: 0,
            tasks,
            ready_queue: ReadyQueue::new(levels),
            running_task: None,
            event_groups: self.event_groups.iter().map(EventGroupCb::new).collect(),
            semaphores: self.semaphores.iter().map(SemaphoreCb::new).collect(),
            mailboxes: self.mailboxes.iter().map(MailboxCb::new).collect(),
            timers,
            timeouts: TimeoutHeap::default(),
            next_wait_seq: 0,
            halted: None,
            panic: None,
            boot_thread: None,
        };

        // Apply the initial states of the bound bits
        for i in 0..st.semaphores.len() {
            semaphore::reflect(&mut st, i);
        }
        for i in 0..st.mailboxes.len() {
            mailbox::reflect(&mut st, i);
        }

        // Arm the timers that start active
        for i in 0..st.timers.len() {
            if st.timers[i].active {
                let at = st.timers[i].delay;
                timer::arm(&mut st, i, at);
            }
        }

        log::debug!(
            "configured {} tasks, {} event groups, {} semaphores, {} mailboxes, {} timers",
            st.tasks.len(),
            st.event_groups.len(),
            st.semaphores.len(),
            st.mailboxes.len(),
            st.timers.len(),
        );

        Ok(Kernel::from_inner(KernelInner {
            state: CpuLock::new(st),
        }))
    }
}

/// Make sure every binding refers to an event group of this configuration
/// and no two bindings mirror the same bit of an event group.
fn check_event_links(links: &[EventLink], num_event_groups: usize) -> Result<(), CfgError> {
    let mut used: HashMap<usize, EventBits> = HashMap::new();
    for link in links {
        if link.group >= num_event_groups {
            return Err(CfgError::UnknownEventGroup { group: link.group });
        }
        if link.bits.is_empty() {
            return Err(CfgError::EmptyEventBits);
        }
        let used_bits = used.entry(link.group).or_default();
        let overlap = *used_bits & link.bits;
        if !overlap.is_empty() {
            return Err(CfgError::EventBitCollision {
                group: link.group,
                bits: overlap.bits(),
            });
        }
        *used_bits |= link.bits;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventGroup, Mailbox, Semaphore, Task, Timer};
    use assert_matches::assert_matches;

    fn cfg_with_task() -> Cfg {
        let mut cfg = Cfg::new();
        Task::define().start(|_| {}).finish(&mut cfg);
        cfg
    }

    #[test]
    fn no_tasks() {
        assert_matches!(Cfg::new().finish(), Err(CfgError::NoTasks));
    }

    #[test]
    fn bad_priority_levels() {
        let mut cfg = cfg_with_task();
        cfg.num_task_priority_levels(65);
        assert_matches!(cfg.finish(), Err(CfgError::BadPriorityLevels { levels: 65 }));
    }

    #[test]
    fn bad_task_priority() {
        let mut cfg = Cfg::new();
        cfg.num_task_priority_levels(4);
        Task::define().name("late").priority(4).start(|_| {}).finish(&mut cfg);
        assert_matches!(
            cfg.finish(),
            Err(CfgError::BadTaskPriority { task, priority: 4 }) if task == "late"
        );
    }

    #[test]
    fn task_without_entry_point() {
        let mut cfg = Cfg::new();
        Task::define().finish(&mut cfg);
        assert_matches!(cfg.finish(), Err(CfgError::MissingEntryPoint { object: "task" }));
    }

    #[test]
    fn timer_without_callback() {
        let mut cfg = cfg_with_task();
        Timer::define().delay(5).finish(&mut cfg);
        assert_matches!(cfg.finish(), Err(CfgError::MissingEntryPoint { object: "timer" }));
    }

    #[test]
    fn bad_semaphore_value() {
        let mut cfg = cfg_with_task();
        Semaphore::define().initial(2).finish(&mut cfg);
        assert_matches!(
            cfg.finish(),
            Err(CfgError::BadSemaphoreValue { initial: 2, maximum: 1 })
        );

        let mut cfg = cfg_with_task();
        Semaphore::define().maximum(3).finish(&mut cfg);
        assert_matches!(
            cfg.finish(),
            Err(CfgError::BadSemaphoreValue { initial: 0, maximum: 3 })
        );

        let mut cfg = cfg_with_task();
        Semaphore::define()
            .mode(SemaphoreMode::Counting)
            .initial(2)
            .maximum(3)
            .finish(&mut cfg);
        assert_matches!(cfg.finish(), Ok(_));
    }

    #[test]
    fn bad_mailbox_capacity() {
        let mut cfg = cfg_with_task();
        Mailbox::<u32>::define().capacity(0).finish(&mut cfg);
        assert_matches!(cfg.finish(), Err(CfgError::BadMailboxCapacity));
    }

    #[test]
    fn zero_sized_message() {
        let mut cfg = cfg_with_task();
        Mailbox::<()>::define().finish(&mut cfg);
        assert_matches!(cfg.finish(), Err(CfgError::BadMessageSize));
    }

    #[test]
    fn empty_event_bits() {
        let mut cfg = cfg_with_task();
        let eg = EventGroup::define().finish(&mut cfg);
        Semaphore::define()
            .event(eg, EventBits::empty())
            .finish(&mut cfg);
        assert_matches!(cfg.finish(), Err(CfgError::EmptyEventBits));
    }

    #[test]
    fn event_bit_collision() {
        let mut cfg = cfg_with_task();
        let eg = EventGroup::define().finish(&mut cfg);
        Semaphore::define()
            .event(eg, EventBits::ID_01)
            .finish(&mut cfg);
        Mailbox::<u16>::define()
            .capacity(2)
            .reader_event(eg, EventBits::ID_02)
            .writer_event(eg, EventBits::ID_01 | EventBits::ID_03)
            .finish(&mut cfg);
        assert_matches!(
            cfg.finish(),
            Err(CfgError::EventBitCollision { group: 0, bits: 0b10 })
        );
    }

    #[test]
    fn event_group_from_another_cfg() {
        let mut other = Cfg::new();
        EventGroup::define().finish(&mut other);
        let foreign = EventGroup::define().finish(&mut other);

        let mut cfg = cfg_with_task();
        Semaphore::define()
            .initial(1)
            .event(foreign, EventBits::ID_01)
            .finish(&mut cfg);
        assert_matches!(cfg.finish(), Err(CfgError::UnknownEventGroup { group: 1 }));

        let mut cfg = cfg_with_task();
        EventGroup::define().finish(&mut cfg);
        Mailbox::<u8>::define()
            .reader_event(foreign, EventBits::ID_02)
            .finish(&mut cfg);
        assert_matches!(cfg.finish(), Err(CfgError::UnknownEventGroup { group: 1 }));
    }

    #[test]
    fn same_bits_in_different_groups() {
        let mut cfg = cfg_with_task();
        let eg1 = EventGroup::define().finish(&mut cfg);
        let eg2 = EventGroup::define().finish(&mut cfg);
        Semaphore::define()
            .event(eg1, EventBits::ID_01)
            .finish(&mut cfg);
        Semaphore::define()
            .event(eg2, EventBits::ID_01)
            .finish(&mut cfg);
        assert_matches!(cfg.finish(), Ok(_));
    }

    #[test]
    fn initial_bound_bits() {
        let mut cfg = cfg_with_task();
        let eg = EventGroup::define()
            .initial(EventBits::ID_07)
            .finish(&mut cfg);
        Semaphore::define()
            .initial(1)
            .event(eg, EventBits::ID_01)
            .finish(&mut cfg);
        Mailbox::<u8>::define()
            .capacity(2)
            .reader_event(eg, EventBits::ID_02)
            .writer_event(eg, EventBits::ID_03)
            .finish(&mut cfg);

        let kernel = cfg.finish().unwrap();
        let st = kernel.inner.state.lock();
        assert_eq!(
            st.event_groups[0].bits,
            EventBits::ID_01 | EventBits::ID_03 | EventBits::ID_07
        );
    }
}
