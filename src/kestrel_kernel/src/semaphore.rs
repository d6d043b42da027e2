//! Semaphores
use std::fmt;

use crate::{
    cfg::Cfg,
    context::Context,
    error::{PendSemaphoreError, PostSemaphoreError},
    event_group::{EventBits, EventGroup, EventLink},
    klock,
    state::State,
    task::{self, TaskCx},
    timeout::Timeout,
    wait::{self, WaitObject, WaitOutcome, WaitPayload, WaitQueue},
};

/// Unsigned integer type representing the number of permits held by a
/// semaphore.
pub type SemaphoreValue = u32;

/// Specifies how a semaphore treats posts that would exceed its maximum
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemaphoreMode {
    /// The value is clamped to `0..=1`. Posting to a semaphore holding a
    /// permit is a no-op.
    Binary,
    /// Posting to a semaphore at its maximum value fails with
    /// `QueueOverflow`.
    Counting,
}

/// Represents a single semaphore in a system.
///
/// A semaphore can optionally be bound to bits of an event group. The bits
/// are kept set while the semaphore holds a permit and clear otherwise, so
/// that a task can wait for the semaphore and other wake sources at once
/// through [`EventGroup::pend`](crate::EventGroup::pend), then take the
/// permit with [`Semaphore::poll`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Semaphore(pub(crate) usize);

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Semaphore").field(&self.0).finish()
    }
}

impl Semaphore {
    /// Construct a `SemaphoreDefiner` to define a semaphore in a
    /// configuration function.
    pub fn define() -> SemaphoreDefiner {
        SemaphoreDefiner {
            initial: 0,
            maximum: 1,
            mode: SemaphoreMode::Binary,
            link: None,
        }
    }

    /// Release a permit.
    ///
    /// If tasks are waiting on the semaphore, the permit is handed directly
    /// to the first of them and the value stays at zero.
    pub fn post(self, cx: &impl Context) -> Result<(), PostSemaphoreError> {
        let mut st = klock::lock_cpu(cx.kernel());
        post(&mut st, self.0)?;
        task::unlock_cpu_and_check_preemption(cx.kernel(), st, cx.kind());
        Ok(())
    }

    /// Take a permit without blocking. Fails with `Unavailable` if the value
    /// is zero. Either way, the bound event bit is brought up to date.
    pub fn poll(self, cx: &impl Context) -> Result<(), PendSemaphoreError> {
        let mut st = klock::lock_cpu(cx.kernel());
        if poll_core(&mut st, self.0) {
            Ok(())
        } else {
            Err(PendSemaphoreError::Unavailable)
        }
    }

    /// Take a permit, blocking the current task until one is available or
    /// the timeout elapses.
    ///
    /// With a no-wait timeout, this behaves like [`Self::poll`].
    pub fn pend(self, cx: &TaskCx<'_>, timeout: Timeout) -> Result<(), PendSemaphoreError> {
        let mut st = klock::lock_cpu(cx.kernel);

        if poll_core(&mut st, self.0) {
            return Ok(());
        }

        if timeout.is_no_wait() {
            return Err(PendSemaphoreError::Unavailable);
        }

        st.semaphores[self.0].wait_queue.push_back(cx.task);
        let (st, outcome) = wait::wait(
            cx.kernel,
            st,
            cx.task,
            WaitObject::Semaphore(self.0),
            timeout,
        );
        drop(st);

        match outcome {
            WaitOutcome::Complete(_) => Ok(()),
            WaitOutcome::Timeout => Err(PendSemaphoreError::Timeout),
        }
    }

    /// Get the number of permits currently held by the semaphore.
    pub fn get(self, cx: &impl Context) -> SemaphoreValue {
        klock::lock_cpu(cx.kernel()).semaphores[self.0].value
    }
}

/// The definer (static builder) for [`Semaphore`].
#[must_use = "must call `finish()` to complete registration"]
pub struct SemaphoreDefiner {
    pub(crate) initial: SemaphoreValue,
    pub(crate) maximum: SemaphoreValue,
    pub(crate) mode: SemaphoreMode,
    pub(crate) link: Option<EventLink>,
}

impl SemaphoreDefiner {
    /// Specify the initial value. Defaults to `0`.
    pub fn initial(self, initial: SemaphoreValue) -> Self {
        Self { initial, ..self }
    }

    /// Specify the maximum value. Defaults to `1`. Must be `1` for a binary
    /// semaphore.
    pub fn maximum(self, maximum: SemaphoreValue) -> Self {
        Self { maximum, ..self }
    }

    /// Specify the mode. Defaults to [`SemaphoreMode::Binary`].
    pub fn mode(self, mode: SemaphoreMode) -> Self {
        Self { mode, ..self }
    }

    /// Bind the semaphore's availability (value > 0) to `bits` of `group`.
    pub fn event(self, group: EventGroup, bits: EventBits) -> Self {
        Self {
            link: Some(EventLink::new(group, bits)),
            ..self
        }
    }

    /// Complete the definition of a semaphore, returning a reference to the
    /// semaphore.
    pub fn finish(self, cfg: &mut Cfg) -> Semaphore {
        Semaphore(cfg.push_semaphore(self))
    }
}

/// *Semaphore control block* - the state data of a semaphore.
#[derive(Debug)]
pub(crate) struct SemaphoreCb {
    pub(crate) value: SemaphoreValue,
    pub(crate) maximum: SemaphoreValue,
    pub(crate) mode: SemaphoreMode,
    pub(crate) link: Option<EventLink>,
    pub(crate) wait_queue: WaitQueue,
}

impl SemaphoreCb {
    pub(crate) fn new(definer: &SemaphoreDefiner) -> Self {
        Self {
            value: definer.initial,
            maximum: definer.maximum,
            mode: definer.mode,
            link: definer.link,
            wait_queue: WaitQueue::default(),
        }
    }
}

/// Make the bound event bits match the semaphore's value.
pub(crate) fn reflect(st: &mut State, semaphore: usize) {
    let semaphore_cb = &st.semaphores[semaphore];
    if let Some(link) = semaphore_cb.link {
        let available = semaphore_cb.value > 0;
        link.reflect(st, available);
    }
}

fn poll_core(st: &mut State, semaphore: usize) -> bool {
    let semaphore_cb = &mut st.semaphores[semaphore];
    let taken = semaphore_cb.value > 0;
    if taken {
        semaphore_cb.value -= 1;
    }
    reflect(st, semaphore);
    taken
}

fn post(st: &mut State, semaphore: usize) -> Result<(), PostSemaphoreError> {
    let semaphore_cb = &mut st.semaphores[semaphore];

    // Give the permit to the first waiting task if there's one. The value is
    // zero in this case.
    if let Some(task) = semaphore_cb.wait_queue.pop_front() {
        debug_assert_eq!(semaphore_cb.value, 0);
        wait::complete_wait(st, task, WaitPayload::None);
        return Ok(());
    }

    if semaphore_cb.value < semaphore_cb.maximum {
        semaphore_cb.value += 1;
    } else if semaphore_cb.mode == SemaphoreMode::Counting {
        return Err(PostSemaphoreError::QueueOverflow);
    }

    reflect(st, semaphore);
    Ok(())
}
