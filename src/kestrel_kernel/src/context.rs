//! Execution contexts
//!
//! Kernel services take a context reference as their first parameter. The
//! context's type determines which services are available:
//!
//!  - [`TaskCx`] is passed to a task's entry point. Blocking services such as
//!    [`EventGroup::pend`](crate::EventGroup::pend) accept only this type.
//!
//!  - [`TimerCx`] is passed to a timer callback. Timer callbacks run in an
//!    interrupt-like context that must not block, so only non-blocking
//!    services, which accept any [`Context`], are available.
use std::{fmt, marker::PhantomData};

use crate::{klock, task::TaskCx, timeout::Ticks, timer::Timer, Kernel};

mod private {
    pub trait Sealed {}
    impl Sealed for crate::task::TaskCx<'_> {}
    impl Sealed for super::TimerCx<'_> {}
}

/// Identifies the kind of a context.
#[doc(hidden)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Task(usize),
    Interrupt,
}

/// A context in which non-blocking kernel services can be used.
///
/// This trait is sealed and implemented by [`TaskCx`] and [`TimerCx`].
pub trait Context: private::Sealed {
    #[doc(hidden)]
    fn kernel(&self) -> &Kernel;

    #[doc(hidden)]
    fn kind(&self) -> ContextKind;

    /// Get the current virtual time.
    fn time(&self) -> Ticks {
        klock::lock_cpu(self.kernel()).now
    }
}

impl Context for TaskCx<'_> {
    #[inline]
    fn kernel(&self) -> &Kernel {
        self.kernel
    }

    #[inline]
    fn kind(&self) -> ContextKind {
        ContextKind::Task(self.task)
    }
}

/// The context of a timer callback.
pub struct TimerCx<'a> {
    kernel: &'a Kernel,
    timer: usize,
    _not_send: PhantomData<*const ()>,
}

impl fmt::Debug for TimerCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TimerCx").field("timer", &self.timer).finish()
    }
}

impl<'a> TimerCx<'a> {
    pub(crate) fn new(kernel: &'a Kernel, timer: usize) -> Self {
        Self {
            kernel,
            timer,
            _not_send: PhantomData,
        }
    }

    /// Get the timer whose callback is running.
    pub fn timer(&self) -> Timer {
        Timer(self.timer)
    }
}

impl Context for TimerCx<'_> {
    #[inline]
    fn kernel(&self) -> &Kernel {
        self.kernel
    }

    #[inline]
    fn kind(&self) -> ContextKind {
        ContextKind::Interrupt
    }
}
