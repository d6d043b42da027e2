//! Timers
use std::{fmt, sync::Arc};

use crate::{
    cfg::Cfg,
    context::{Context, ContextKind, TimerCx},
    klock,
    state::State,
    timeout::{Ticks, TimeoutKind},
};

/// The callback function of a timer.
pub(crate) type TimerCallback = Arc<dyn Fn(&TimerCx<'_>) + Send + Sync>;

/// Represents a single timer in a system.
///
/// A timer calls its callback function in the timer context when its delay
/// elapses. A periodic timer is then re-armed to expire again `period` ticks
/// after the previous expiration, so that callbacks don't drift. A one-shot
/// timer (no period, or a period of zero) becomes inactive after the first
/// expiration.
///
/// # Timer States
///
/// A timer is either *active* or *inactive*. An active timer has an armed
/// expiration `delay` ticks after it was started (or after its delay was
/// last changed). Stopping a timer disarms it.
///
/// A timer (re)started from a timer callback with a delay of zero expires at
/// the next tick rather than the current one, so the clock keeps moving.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timer(pub(crate) usize);

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Timer").field(&self.0).finish()
    }
}

impl Timer {
    /// Construct a `TimerDefiner` to define a timer in a configuration
    /// function.
    pub fn define() -> TimerDefiner {
        TimerDefiner {
            delay: 0,
            period: None,
            active: false,
            callback: None,
        }
    }

    /// Start the timer. Does nothing if the timer is already active.
    pub fn start(self, cx: &impl Context) {
        let mut st = klock::lock_cpu(cx.kernel());
        if !st.timers[self.0].active {
            st.timers[self.0].active = true;
            let at = expiration(st.now, st.timers[self.0].delay, cx.kind());
            arm(&mut st, self.0, at);
        }
    }

    /// Stop the timer. Does nothing if the timer is already inactive.
    pub fn stop(self, cx: &impl Context) {
        let mut st = klock::lock_cpu(cx.kernel());
        let timer_cb = &mut st.timers[self.0];
        timer_cb.active = false;
        timer_cb.gen += 1;
    }

    /// Set the delay before the next expiration. If the timer is active, the
    /// expiration is rescheduled to `delay` ticks from now.
    pub fn set_delay(self, cx: &impl Context, delay: Ticks) {
        let mut st = klock::lock_cpu(cx.kernel());
        st.timers[self.0].delay = delay;
        if st.timers[self.0].active {
            let at = expiration(st.now, delay, cx.kind());
            arm(&mut st, self.0, at);
        }
    }

    /// Set the period. It takes effect at the next expiration.
    pub fn set_period(self, cx: &impl Context, period: Option<Ticks>) {
        let mut st = klock::lock_cpu(cx.kernel());
        st.timers[self.0].period = period;
    }

    /// Get a flag indicating whether the timer is active.
    pub fn is_active(self, cx: &impl Context) -> bool {
        klock::lock_cpu(cx.kernel()).timers[self.0].active
    }
}

/// The definer (static builder) for [`Timer`].
#[must_use = "must call `finish()` to complete registration"]
pub struct TimerDefiner {
    pub(crate) delay: Ticks,
    pub(crate) period: Option<Ticks>,
    pub(crate) active: bool,
    pub(crate) callback: Option<TimerCallback>,
}

impl TimerDefiner {
    /// \[**Required**\] Specify the callback function.
    pub fn start(self, callback: impl Fn(&TimerCx<'_>) + Send + Sync + 'static) -> Self {
        Self {
            callback: Some(Arc::new(callback)),
            ..self
        }
    }

    /// Specify the delay before the first expiration. Defaults to `0`.
    pub fn delay(self, delay: Ticks) -> Self {
        Self { delay, ..self }
    }

    /// Specify the period. Defaults to `None` (one-shot).
    pub fn period(self, period: Option<Ticks>) -> Self {
        Self { period, ..self }
    }

    /// Specify whether the timer should be started at boot time. Defaults
    /// to `false`.
    pub fn active(self, active: bool) -> Self {
        Self { active, ..self }
    }

    /// Complete the definition of a timer, returning a reference to the
    /// timer.
    pub fn finish(self, cfg: &mut Cfg) -> Timer {
        Timer(cfg.push_timer(self))
    }
}

/// *Timer control block* - the state data of a timer.
pub(crate) struct TimerCb {
    pub(crate) delay: Ticks,
    pub(crate) period: Option<Ticks>,
    pub(crate) active: bool,
    /// Incremented whenever the armed expiration changes. Only the timeout
    /// entry carrying the current generation is live.
    pub(crate) gen: u64,
    pub(crate) callback: TimerCallback,
}

impl fmt::Debug for TimerCb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TimerCb")
            .field("delay", &self.delay)
            .field("period", &self.period)
            .field("active", &self.active)
            .field("gen", &self.gen)
            .finish_non_exhaustive()
    }
}

impl TimerCb {
    pub(crate) fn new(definer: &TimerDefiner, callback: TimerCallback) -> Self {
        Self {
            delay: definer.delay,
            period: definer.period,
            active: definer.active,
            gen: 0,
            callback,
        }
    }
}

/// Get the expiration time of a timer started at `now`. The timer service
/// has already drained the current tick, so a zero delay from there is
/// pushed to the next one.
fn expiration(now: Ticks, delay: Ticks, context: ContextKind) -> Ticks {
    let delay = match context {
        ContextKind::Interrupt => delay.max(1),
        ContextKind::Task(_) => delay,
    };
    now.saturating_add(delay)
}

/// Arm the timer to expire at `at`, replacing the current expiration.
pub(crate) fn arm(st: &mut State, timer: usize, at: Ticks) {
    let timer_cb = &mut st.timers[timer];
    timer_cb.gen += 1;
    let gen = timer_cb.gen;
    st.timeouts.insert(at, TimeoutKind::Timer { timer, gen });
}

/// Process the expiration of a timer that was armed for `at`. Re-arms the
/// timer for the next period or deactivates it, and returns the callback to
/// be called.
pub(crate) fn fire(st: &mut State, timer: usize, at: Ticks) -> TimerCallback {
    let timer_cb = &mut st.timers[timer];
    debug_assert!(timer_cb.active);

    let callback = Arc::clone(&timer_cb.callback);
    let period = timer_cb.period;
    match period {
        Some(period) if period > 0 => arm(st, timer, at.saturating_add(period)),
        _ => timer_cb.active = false,
    }
    callback
}
