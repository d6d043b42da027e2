//! Event groups
use std::fmt;

use bitflags::bitflags;

use crate::{
    cfg::Cfg,
    context::Context,
    error::WaitEventGroupError,
    klock,
    state::State,
    task::{self, TaskCx, TaskId},
    timeout::Timeout,
    wait::{self, WaitObject, WaitOutcome, WaitPayload},
};

bitflags! {
    /// A set of event bits. Each bit represents an independent wake source.
    ///
    /// The named constants cover the bits used by typical applications. Any
    /// other bit can be specified through [`EventBits::from_bits_retain`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventBits: u32 {
        const ID_00 = 1 << 0;
        const ID_01 = 1 << 1;
        const ID_02 = 1 << 2;
        const ID_03 = 1 << 3;
        const ID_04 = 1 << 4;
        const ID_05 = 1 << 5;
        const ID_06 = 1 << 6;
        const ID_07 = 1 << 7;

        const _ = !0;
    }
}

/// A wait condition of an event group: *all* bits of one mask, *or* any bit
/// of another mask.
///
/// An empty AND mask never satisfies the condition by itself, so a
/// condition created by [`Self::any`] is satisfied only by the OR mask.
///
/// # Examples
///
/// ```
/// use kestrel_kernel::{EventBits, WaitCondition};
/// let cond = WaitCondition::new(EventBits::ID_00 | EventBits::ID_01, EventBits::ID_02);
/// assert!(cond.is_satisfied_by(EventBits::ID_02));
/// assert!(cond.is_satisfied_by(EventBits::ID_00 | EventBits::ID_01));
/// assert!(!cond.is_satisfied_by(EventBits::ID_00));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WaitCondition {
    all: EventBits,
    any: EventBits,
    consume: bool,
}

impl WaitCondition {
    /// Construct a condition satisfied when all bits of `all` are set or any
    /// bit of `any` is set.
    pub const fn new(all: EventBits, any: EventBits) -> Self {
        Self {
            all,
            any,
            consume: false,
        }
    }

    /// Construct a condition satisfied when all bits of `bits` are set.
    pub const fn all(bits: EventBits) -> Self {
        Self::new(bits, EventBits::empty())
    }

    /// Construct a condition satisfied when any bit of `bits` is set.
    pub const fn any(bits: EventBits) -> Self {
        Self::new(EventBits::empty(), bits)
    }

    /// Clear the bits of both masks when the condition is satisfied.
    ///
    /// By default, a satisfied wait leaves the bits as they are, and clearing
    /// them is the responsibility of the objects mirroring them. A consuming
    /// wait clears them right away, which can put the mirrored bits out of
    /// sync with their objects until those objects change state next time.
    pub const fn consume(self) -> Self {
        Self {
            consume: true,
            ..self
        }
    }

    /// Get the AND mask.
    pub const fn and_mask(&self) -> EventBits {
        self.all
    }

    /// Get the OR mask.
    pub const fn or_mask(&self) -> EventBits {
        self.any
    }

    /// Get a flag indicating whether the condition can never be satisfied.
    pub fn is_empty(&self) -> bool {
        self.all.is_empty() && self.any.is_empty()
    }

    /// Check if `bits` satisfies the condition.
    pub fn is_satisfied_by(&self, bits: EventBits) -> bool {
        (!self.all.is_empty() && bits.contains(self.all)) || bits.intersects(self.any)
    }

    /// Check if the current state of an event group satisfies the condition.
    ///
    /// If it does, this method clears the bits of the condition (if
    /// requested) and returns `Some(original_value)`. Otherwise, it returns
    /// `None`.
    fn poll(&self, event_group_bits: &mut EventBits) -> Option<EventBits> {
        if !self.is_satisfied_by(*event_group_bits) {
            return None;
        }
        let original_value = *event_group_bits;
        if self.consume {
            event_group_bits.remove(self.all | self.any);
        }
        Some(original_value)
    }
}

/// Represents a single event group in a system.
///
/// An event group holds a set of [`EventBits`]. Any context can set bits.
/// At most one task at a time can wait for a [`WaitCondition`] to be
/// satisfied.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventGroup(pub(crate) usize);

impl fmt::Debug for EventGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("EventGroup").field(&self.0).finish()
    }
}

impl EventGroup {
    /// Construct an `EventGroupDefiner` to define an event group in a
    /// configuration function.
    pub fn define() -> EventGroupDefiner {
        EventGroupDefiner {
            initial: EventBits::empty(),
        }
    }

    /// Set the specified bits. Setting an already-set bit is a no-op.
    ///
    /// If this satisfies the condition of the waiting task, the task is woken
    /// up.
    pub fn post(self, cx: &impl Context, bits: EventBits) {
        let mut st = klock::lock_cpu(cx.kernel());
        set(&mut st, self.0, bits);
        task::unlock_cpu_and_check_preemption(cx.kernel(), st, cx.kind());
    }

    /// Clear the specified bits.
    pub fn clear(self, cx: &impl Context, bits: EventBits) {
        let mut st = klock::lock_cpu(cx.kernel());
        st.event_groups[self.0].bits.remove(bits);
    }

    /// Get the currently set bits.
    pub fn get(self, cx: &impl Context) -> EventBits {
        klock::lock_cpu(cx.kernel()).event_groups[self.0].bits
    }

    /// Check the wait condition without blocking.
    ///
    /// Returns the bits observed before consuming any of them, or
    /// `Err(Timeout)` if the condition isn't satisfied.
    pub fn poll(
        self,
        cx: &impl Context,
        cond: WaitCondition,
    ) -> Result<EventBits, WaitEventGroupError> {
        if cond.is_empty() {
            return Err(WaitEventGroupError::BadParam);
        }
        let mut st = klock::lock_cpu(cx.kernel());
        let bits = &mut st.event_groups[self.0].bits;
        cond.poll(bits).ok_or(WaitEventGroupError::Timeout)
    }

    /// Wait until the condition is satisfied or the timeout elapses.
    ///
    /// On success, returns the full set of bits observed when the condition
    /// was satisfied, not just the matching subset. The bits are left set
    /// unless the condition is [consuming](WaitCondition::consume).
    ///
    /// Fails with `BadParam` if both masks are empty and with
    /// `BadObjectState` if another task is already waiting on the event
    /// group.
    pub fn pend(
        self,
        cx: &TaskCx<'_>,
        cond: WaitCondition,
        timeout: Timeout,
    ) -> Result<EventBits, WaitEventGroupError> {
        if cond.is_empty() {
            return Err(WaitEventGroupError::BadParam);
        }

        let mut st = klock::lock_cpu(cx.kernel);
        let event_group_cb = &mut st.event_groups[self.0];

        if let Some(original_value) = cond.poll(&mut event_group_cb.bits) {
            return Ok(original_value);
        }

        if event_group_cb.waiter.is_some() {
            return Err(WaitEventGroupError::BadObjectState);
        }

        if timeout.is_no_wait() {
            return Err(WaitEventGroupError::Timeout);
        }

        // The current state does not satify the wait condition. In this case,
        // start waiting. The wake-upper is responsible for using `poll`.
        event_group_cb.waiter = Some((cx.task, cond));
        let (st, outcome) = wait::wait(
            cx.kernel,
            st,
            cx.task,
            WaitObject::EventGroup(self.0),
            timeout,
        );
        drop(st);

        match outcome {
            WaitOutcome::Complete(WaitPayload::Bits(original_value)) => Ok(original_value),
            WaitOutcome::Timeout => Err(WaitEventGroupError::Timeout),
            WaitOutcome::Complete(_) => unreachable!(),
        }
    }
}

/// The definer (static builder) for [`EventGroup`].
#[must_use = "must call `finish()` to complete registration"]
pub struct EventGroupDefiner {
    pub(crate) initial: EventBits,
}

impl EventGroupDefiner {
    /// Specify the initial bit pattern.
    pub fn initial(self, initial: EventBits) -> Self {
        Self { initial }
    }

    /// Complete the definition of an event group, returning a reference to
    /// the event group.
    pub fn finish(self, cfg: &mut Cfg) -> EventGroup {
        EventGroup(cfg.push_event_group(self))
    }
}

/// *Event group control block* - the state data of an event group.
#[derive(Debug)]
pub(crate) struct EventGroupCb {
    pub(crate) bits: EventBits,
    /// The waiting task and its wait condition.
    pub(crate) waiter: Option<(TaskId, WaitCondition)>,
}

impl EventGroupCb {
    pub(crate) fn new(definer: &EventGroupDefiner) -> Self {
        Self {
            bits: definer.initial,
            waiter: None,
        }
    }
}

/// Set bits, waking up the waiting task if its condition is now fulfilled.
///
/// This function doesn't yield the processor. Call
/// `unlock_cpu_and_check_preemption` as needed.
pub(crate) fn set(st: &mut State, group: usize, added_bits: EventBits) {
    let event_group_cb = &mut st.event_groups[group];

    // Return early if no bits will change
    if event_group_cb.bits.contains(added_bits) {
        return;
    }

    event_group_cb.bits |= added_bits;

    let Some((waiter, cond)) = event_group_cb.waiter else {
        return;
    };

    // When waking up the task, some bits might be cleared if the waiter
    // requests clearing bits. Clearing is handled by `poll`.
    if let Some(original_value) = cond.poll(&mut event_group_cb.bits) {
        event_group_cb.waiter = None;
        wait::complete_wait(st, waiter, WaitPayload::Bits(original_value));
    }
}

/// Binds an object's boolean state to bits of an event group. The object
/// calls [`Self::reflect`] whenever the state might have changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EventLink {
    pub(crate) group: usize,
    pub(crate) bits: EventBits,
}

impl EventLink {
    pub(crate) fn new(group: EventGroup, bits: EventBits) -> Self {
        Self {
            group: group.0,
            bits,
        }
    }

    /// Set the bits if `state` is `true`; clear them otherwise.
    pub(crate) fn reflect(self, st: &mut State, state: bool) {
        if state {
            set(st, self.group, self.bits);
        } else {
            st.event_groups[self.group].bits.remove(self.bits);
        }
    }
}
