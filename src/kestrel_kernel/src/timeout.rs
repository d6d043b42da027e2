//! Manages timeouts (timed events) and the system clock.
//!
//! # Virtual Time
//!
//! The clock counts abstract **ticks** and only moves when every task is
//! blocked. Application code runs in zero virtual time. When the ready queue
//! becomes empty, the dispatcher advances the clock straight to the earliest
//! outstanding timeout and processes every timeout that has arrived at that
//! tick:
//!
//!  - Wait timeouts come first, in the order in which the waits started. The
//!    waiting tasks are made Ready with a timeout result.
//!  - Timer expirations follow. Their callbacks run in the timer context
//!    (see [`TimerCx`](crate::TimerCx)).
//!
//! ```text
//!  now                  earliest timeout
//!   │                          │
//! ══╧══════════════════════════╧═══════════════╤═══════════
//!   └── no task is Ready ──────┘           time limit
//!       (the clock jumps)
//! ```
//!
//! If no timeouts are outstanding the system is idle forever and the run
//! ends with [`HaltReason::Idle`](crate::HaltReason::Idle). If the earliest
//! timeout lies past the time limit, the run ends with
//! [`HaltReason::TimeLimit`](crate::HaltReason::TimeLimit).
use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    panic::{self, AssertUnwindSafe},
};

use crate::{
    context::TimerCx,
    klock::{self, CpuLockGuard},
    task::TaskId,
    timer, wait, HaltReason, Kernel,
};

/// A point of time or a time span, measured in ticks.
pub type Ticks = u64;

/// Specifies how long a blocking operation may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Don't wait at all. The operation fails immediately if it can't make
    /// progress.
    NoWait,
    /// Wait for at most the specified number of ticks. `Ticks(0)` is
    /// equivalent to `NoWait`.
    Ticks(Ticks),
    /// Wait indefinitely.
    Forever,
}

impl Timeout {
    /// Get a flag indicating whether the operation must not block.
    #[inline]
    pub fn is_no_wait(self) -> bool {
        matches!(self, Self::NoWait | Self::Ticks(0))
    }

    /// Get the absolute arrival time when starting a wait at `now`.
    ///
    /// Returns `None` for `Forever`. Must not be called for no-wait timeouts.
    pub(crate) fn arrival(self, now: Ticks) -> Option<Ticks> {
        match self {
            Self::NoWait | Self::Forever => None,
            Self::Ticks(duration) => Some(now.saturating_add(duration)),
        }
    }
}

impl From<Ticks> for Timeout {
    #[inline]
    fn from(x: Ticks) -> Self {
        Self::Ticks(x)
    }
}

// Timeout heap
// ---------------------------------------------------------------------------

/// What happens when a timeout arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum TimeoutKind {
    /// Abort the wait identified by `wait_seq`.
    TaskWait { task: TaskId, wait_seq: u64 },
    /// Fire the timer if it's still armed with the generation `gen`.
    Timer { timer: usize, gen: u64 },
}

impl TimeoutKind {
    /// Timeouts of a lower class are processed first within the same tick.
    fn class(&self) -> u8 {
        match self {
            Self::TaskWait { .. } => 0,
            Self::Timer { .. } => 1,
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct TimeoutEntry {
    at: Ticks,
    class: u8,
    /// Registration order
    seq: u64,
    kind: TimeoutKind,
}

/// The priority queue of outstanding timeouts, sorted by arrival time.
///
/// Unregistering a timeout is done by making its entry stale (see
/// `State::is_timeout_live`). Stale entries are discarded when they reach
/// the front of the queue.
#[derive(Debug, Default)]
pub(crate) struct TimeoutHeap {
    heap: BinaryHeap<Reverse<TimeoutEntry>>,
    next_seq: u64,
}

impl TimeoutHeap {
    pub(crate) fn insert(&mut self, at: Ticks, kind: TimeoutKind) {
        log::trace!("insert_timeout({kind:?}, at = {at})");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(TimeoutEntry {
            at,
            class: kind.class(),
            seq,
            kind,
        }));
    }

    /// Get the earliest entry without removing it. The entry may be stale.
    pub(crate) fn peek(&self) -> Option<(Ticks, TimeoutKind)> {
        self.heap.peek().map(|Reverse(entry)| (entry.at, entry.kind))
    }

    /// Remove the earliest entry.
    pub(crate) fn pop(&mut self) {
        self.heap.pop();
    }

    /// Remove and return the earliest entry if it arrives at or before `now`.
    /// The returned entry may be stale.
    pub(crate) fn pop_due(&mut self, now: Ticks) -> Option<TimeoutKind> {
        if self.heap.peek().map_or(false, |Reverse(entry)| entry.at <= now) {
            self.heap.pop().map(|Reverse(entry)| entry.kind)
        } else {
            None
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.heap.len()
    }
}

// Tick handling
// ---------------------------------------------------------------------------

/// Advance the clock to the earliest live timeout and process every timeout
/// that has arrived by then. Called by the dispatcher when no task is Ready.
///
/// Timer callbacks are called with CPU Lock released. Tasks woken up here
/// are only put in the ready queue; the dispatcher takes it from there.
///
/// Halts the system if there's nothing left to wait for or the time limit
/// would be exceeded.
pub(crate) fn handle_tick<'a>(kernel: &'a Kernel, mut st: CpuLockGuard<'a>) -> CpuLockGuard<'a> {
    let at = loop {
        match st.timeouts.peek() {
            None => {
                st.halt(HaltReason::Idle);
                return st;
            }
            Some((at, kind)) if st.is_timeout_live(&kind) => break at,
            Some(_) => st.timeouts.pop(),
        }
    };

    if at > st.time_limit {
        st.now = st.now.max(st.time_limit);
        st.halt(HaltReason::TimeLimit);
        return st;
    }

    log::trace!("advancing the clock from {} to {at}", st.now);
    st.now = at;

    while let Some(kind) = st.timeouts.pop_due(at) {
        if !st.is_timeout_live(&kind) {
            continue;
        }

        match kind {
            TimeoutKind::TaskWait { task, .. } => wait::expire_wait(&mut st, task),
            TimeoutKind::Timer { timer, .. } => {
                let callback = timer::fire(&mut st, timer, at);

                // Release CPU Lock before calling the application-provided
                // callback function
                drop(st);
                log::trace!("calling the callback of timer {timer}");
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    callback(&TimerCx::new(kernel, timer))
                }));
                st = klock::lock_cpu(kernel);

                if let Err(payload) = result {
                    log::debug!("the callback of timer {timer} panicked");
                    st.panic.get_or_insert(payload);
                    st.halt(HaltReason::Panicked);
                }
                if st.halted.is_some() {
                    return st;
                }
            }
        }
    }

    st
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arrival_order() {
        let mut heap = TimeoutHeap::default();
        heap.insert(10, TimeoutKind::Timer { timer: 0, gen: 1 });
        heap.insert(10, TimeoutKind::TaskWait { task: 3, wait_seq: 7 });
        heap.insert(5, TimeoutKind::Timer { timer: 1, gen: 1 });
        heap.insert(10, TimeoutKind::TaskWait { task: 2, wait_seq: 8 });

        assert_eq!(heap.peek().map(|(at, _)| at), Some(5));
        assert_eq!(heap.pop_due(4), None);
        assert_eq!(
            heap.pop_due(5),
            Some(TimeoutKind::Timer { timer: 1, gen: 1 })
        );
        assert_eq!(heap.pop_due(5), None);

        // Wait timeouts precede timers at the same tick, in registration
        // order
        assert_eq!(
            heap.pop_due(10),
            Some(TimeoutKind::TaskWait { task: 3, wait_seq: 7 })
        );
        assert_eq!(
            heap.pop_due(10),
            Some(TimeoutKind::TaskWait { task: 2, wait_seq: 8 })
        );
        assert_eq!(
            heap.pop_due(10),
            Some(TimeoutKind::Timer { timer: 0, gen: 1 })
        );
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn peek_and_pop() {
        let mut heap = TimeoutHeap::default();
        heap.insert(2, TimeoutKind::Timer { timer: 0, gen: 2 });
        heap.insert(1, TimeoutKind::Timer { timer: 0, gen: 1 });

        assert_eq!(heap.peek(), Some((1, TimeoutKind::Timer { timer: 0, gen: 1 })));
        heap.pop();
        assert_eq!(heap.peek(), Some((2, TimeoutKind::Timer { timer: 0, gen: 2 })));
        heap.pop();
        assert_eq!(heap.peek(), None);
    }

    #[test]
    fn arrival_saturates() {
        assert_eq!(Timeout::Ticks(5).arrival(Ticks::MAX - 1), Some(Ticks::MAX));
        assert_eq!(Timeout::Forever.arrival(0), None);
        assert!(Timeout::Ticks(0).is_no_wait());
        assert!(!Timeout::Forever.is_no_wait());
    }
}
