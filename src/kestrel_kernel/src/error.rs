//! Error types
use std::fmt;

/// The macro to define [`ResultCode`].
macro_rules! define_result_code {
    (
        $( #[$meta:meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum ResultCode {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl ResultCode {
            /// Get the short name of the result code.
            ///
            /// # Examples
            ///
            /// ```
            /// use kestrel_kernel::ResultCode;
            /// assert_eq!(ResultCode::Unavailable.as_str(), "Unavailable");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }

            fn fmt(self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl fmt::Debug for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                (*self).fmt(f)
            }
        }

        impl fmt::Display for ResultCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                (*self).fmt(f)
            }
        }
    };
}

define_result_code! {
    /// All result codes (including success) that a kernel service can
    /// produce.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i8)]
    pub enum ResultCode {
        /// The operation was successful. No additional information is available.
        Success = 0,
        /// A parameter is invalid in a way that is no covered by any other error
        /// codes.
        BadParam = -17,
        /// A target object is in a state that disallows the operation.
        ///
        /// An event group reports this when a second task attempts to wait on
        /// it while another task is already waiting.
        BadObjectState = -41,
        /// An operation or an object couldn't be enqueued because there are too
        /// many of such things that already have been enqueued.
        QueueOverflow = -43,
        /// A no-wait operation found the resource unavailable (an empty
        /// semaphore or mailbox, or a full mailbox).
        ///
        /// Application code usually performs a no-wait operation only after
        /// being told by an event group that the resource is ready, so this
        /// result typically indicates a lost wakeup.
        Unavailable = -45,
        /// The operation timed out.
        Timeout = -50,
    }
}

impl ResultCode {
    /// Get a flag indicating whether the code represents a failure.
    ///
    /// Failure codes have negative values.
    #[inline]
    pub fn is_err(self) -> bool {
        (self as i8) < 0
    }

    /// Get a flag indicating whether the code represents a success.
    ///
    /// Success codes have non-negative values.
    #[inline]
    pub fn is_ok(self) -> bool {
        !self.is_err()
    }
}

macro_rules! define_error {
    (
        mod $mod_name:ident {}
        $( #[$meta:meta] )*
        $vis:vis enum $name:ident {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        ///
        /// See [`ResultCode`] for all result codes and generic descriptions.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i8)]
        $vis enum $name {
            $(
                $( #[$vmeta] )*
                // Use the same discriminants as `ResultCode`
                $vname = ResultCode::$vname as i8
            ),*
        }

        impl fmt::Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                ResultCode::from(*self).fmt(f)
            }
        }

        impl std::error::Error for $name {}

        impl From<Result<(), $name>> for ResultCode {
            #[inline]
            fn from(x: Result<(), $name>) -> Self {
                match x {
                    Ok(()) => Self::Success,
                    Err(e) => Self::from(e),
                }
            }
        }

        impl From<$name> for ResultCode {
            #[inline]
            fn from(x: $name) -> Self {
                match x {
                    $(
                        $name::$vname => Self::$vname,
                    )*
                }
            }
        }

        #[cfg(test)]
        mod $mod_name {
            use super::*;

            #[test]
            fn to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from($name::$vname),
                    );
                    assert_eq!(
                        ResultCode::$vname as i8,
                        $name::$vname as i8,
                    );
                )*
            }

            #[test]
            fn result_to_result_code() {
                $(
                    assert_eq!(
                        ResultCode::$vname,
                        ResultCode::from(Err($name::$vname)),
                    );
                    assert!(ResultCode::from(Err($name::$vname)).is_err());
                )*
                assert_eq!(
                    ResultCode::Success,
                    ResultCode::from(Result::<(), $name>::Ok(())),
                );
                assert!(ResultCode::from(Result::<(), $name>::Ok(())).is_ok());
            }
        }
    };
}

define_error! {
    mod wait_event_group_error {}
    /// Error type for [`EventGroup::pend`] and [`EventGroup::poll`].
    ///
    /// [`EventGroup::pend`]: crate::EventGroup::pend
    /// [`EventGroup::poll`]: crate::EventGroup::poll
    pub enum WaitEventGroupError {
        /// The wait condition is empty (both masks are empty).
        BadParam,
        /// Another task is already waiting on the event group.
        BadObjectState,
        /// The condition did not become true before the timeout elapsed, or
        /// it was false at the time of a no-wait call.
        Timeout,
    }
}

define_error! {
    mod pend_semaphore_error {}
    /// Error type for [`Semaphore::pend`] and [`Semaphore::poll`].
    ///
    /// [`Semaphore::pend`]: crate::Semaphore::pend
    /// [`Semaphore::poll`]: crate::Semaphore::poll
    pub enum PendSemaphoreError {
        /// A no-wait pend found the count to be zero.
        Unavailable,
        /// The semaphore was not posted before the timeout elapsed.
        Timeout,
    }
}

define_error! {
    mod post_semaphore_error {}
    /// Error type for [`Semaphore::post`].
    ///
    /// [`Semaphore::post`]: crate::Semaphore::post
    pub enum PostSemaphoreError {
        /// The post would make a counting semaphore exceed its maximum value.
        QueueOverflow,
    }
}

define_error! {
    mod pend_mailbox_error {}
    /// Error type for [`Mailbox::pend`] and [`Mailbox::try_pend`].
    ///
    /// [`Mailbox::pend`]: crate::Mailbox::pend
    /// [`Mailbox::try_pend`]: crate::Mailbox::try_pend
    pub enum PendMailboxError {
        /// A no-wait pend found the mailbox empty.
        Unavailable,
        /// No message arrived before the timeout elapsed.
        Timeout,
    }
}

define_error! {
    mod post_mailbox_error {}
    /// Error type for [`Mailbox::post`] and [`Mailbox::try_post`].
    ///
    /// [`Mailbox::post`]: crate::Mailbox::post
    /// [`Mailbox::try_post`]: crate::Mailbox::try_post
    pub enum PostMailboxError {
        /// A no-wait post found the mailbox full.
        Unavailable,
        /// No slot was freed before the timeout elapsed.
        Timeout,
    }
}

/// Error type for [`Cfg::finish`].
///
/// [`Cfg::finish`]: crate::Cfg::finish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CfgError {
    /// No task was defined.
    NoTasks,
    /// A task or a timer was defined without an entry point.
    MissingEntryPoint { object: &'static str },
    /// The number of priority levels is out of range.
    BadPriorityLevels { levels: usize },
    /// A task's priority is not less than the number of priority levels.
    BadTaskPriority { task: String, priority: usize },
    /// A mailbox has zero capacity.
    BadMailboxCapacity,
    /// A mailbox message type has zero size.
    BadMessageSize,
    /// A semaphore's initial value exceeds its maximum value, or a binary
    /// semaphore's maximum value is not one.
    BadSemaphoreValue { initial: u32, maximum: u32 },
    /// An event binding refers to an event group that isn't defined in the
    /// same configuration.
    UnknownEventGroup { group: usize },
    /// An event binding specifies no bits.
    EmptyEventBits,
    /// Two event bindings mirror overlapping bits of the same event group.
    EventBitCollision { group: usize, bits: u32 },
}

impl fmt::Display for CfgError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NoTasks => f.write_str("no task is defined"),
            Self::MissingEntryPoint { object } => {
                write!(f, "a {object} was defined without an entry point")
            }
            Self::BadPriorityLevels { levels } => {
                write!(f, "{levels} priority levels requested (expected 1..=64)")
            }
            Self::BadTaskPriority { task, priority } => {
                write!(f, "task `{task}` has an out-of-range priority {priority}")
            }
            Self::BadMailboxCapacity => f.write_str("a mailbox must hold at least one message"),
            Self::BadMessageSize => f.write_str("a mailbox message must not be zero-sized"),
            Self::BadSemaphoreValue { initial, maximum } => {
                write!(
                    f,
                    "invalid semaphore value range (initial = {initial}, maximum = {maximum})"
                )
            }
            Self::UnknownEventGroup { group } => {
                write!(f, "event group {group} is not defined in this configuration")
            }
            Self::EmptyEventBits => f.write_str("an event binding must specify at least one bit"),
            Self::EventBitCollision { group, bits } => write!(
                f,
                "event group {group} has bits {bits:#x} mirrored by more than one object"
            ),
        }
    }
}

impl std::error::Error for CfgError {}

/// Error type for [`Kernel::boot`].
///
/// [`Kernel::boot`]: crate::Kernel::boot
#[derive(Debug)]
pub enum BootError {
    /// The backing thread of a task could not be spawned.
    SpawnThread(std::io::Error),
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SpawnThread(e) => write!(f, "failed to spawn a task thread: {e}"),
        }
    }
}

impl std::error::Error for BootError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SpawnThread(e) => Some(e),
        }
    }
}
