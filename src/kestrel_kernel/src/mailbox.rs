//! Mailboxes
use std::{fmt, marker::PhantomData, mem::size_of};

use bytemuck::Pod;

use crate::{
    cfg::Cfg,
    context::Context,
    error::{PendMailboxError, PostMailboxError},
    event_group::{EventBits, EventGroup, EventLink},
    klock,
    state::State,
    task::{self, TaskCx},
    timeout::Timeout,
    utils::MessageRing,
    wait::{self, WaitObject, WaitOutcome, WaitPayload, WaitQueue},
};

/// Represents a single mailbox in a system.
///
/// A mailbox is a bounded FIFO queue of messages of type `T`. Messages are
/// copied by value into fixed-size slots on [`post`](Self::post) and out of
/// them on [`pend`](Self::pend), so the sender's copy and the stored copy
/// never alias. Messages are delivered in the order in which they were
/// posted, regardless of the sender.
///
/// The mailbox can be bound to event bits mirroring its state:
///
///  - *reader event*: set iff the mailbox holds at least one message.
///  - *writer event*: set iff the mailbox has at least one free slot.
pub struct Mailbox<T>(pub(crate) usize, PhantomData<fn(T) -> T>);

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Mailbox<T> {}

impl<T> PartialEq for Mailbox<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T> Eq for Mailbox<T> {}

impl<T> fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Mailbox").field(&self.0).finish()
    }
}

impl<T: Pod> Mailbox<T> {
    /// Construct a `MailboxDefiner` to define a mailbox in a configuration
    /// function.
    pub fn define() -> MailboxDefiner<T> {
        MailboxDefiner {
            capacity: 1,
            reader_link: None,
            writer_link: None,
            _phantom: PhantomData,
        }
    }

    /// Send a message, blocking the current task while the mailbox is full.
    ///
    /// If a task is waiting for a message, the message is handed over to it
    /// directly. With a no-wait timeout, this behaves like
    /// [`Self::try_post`].
    pub fn post(self, cx: &TaskCx<'_>, msg: &T, timeout: Timeout) -> Result<(), PostMailboxError> {
        let mut st = klock::lock_cpu(cx.kernel);
        let msg: Box<[u8]> = bytemuck::bytes_of(msg).into();

        let msg = match post_core(&mut st, self.0, msg) {
            Ok(()) => {
                task::unlock_cpu_and_check_preemption(cx.kernel, st, cx.kind());
                return Ok(());
            }
            Err(msg) => msg,
        };

        if timeout.is_no_wait() {
            return Err(PostMailboxError::Unavailable);
        }

        // The message travels with the wait. A reader that frees a slot moves
        // it into the ring.
        st.mailboxes[self.0].writers.push_back(cx.task);
        let (st, outcome) = wait::wait(
            cx.kernel,
            st,
            cx.task,
            WaitObject::MailboxSend(self.0, msg),
            timeout,
        );
        drop(st);

        match outcome {
            WaitOutcome::Complete(_) => Ok(()),
            WaitOutcome::Timeout => Err(PostMailboxError::Timeout),
        }
    }

    /// Send a message without blocking. Fails with `Unavailable` if the
    /// mailbox is full.
    ///
    /// The bound event bits are brought up to date whether or not the call
    /// succeeds.
    pub fn try_post(self, cx: &impl Context, msg: &T) -> Result<(), PostMailboxError> {
        let mut st = klock::lock_cpu(cx.kernel());
        match post_core(&mut st, self.0, bytemuck::bytes_of(msg).into()) {
            Ok(()) => {
                task::unlock_cpu_and_check_preemption(cx.kernel(), st, cx.kind());
                Ok(())
            }
            Err(_) => Err(PostMailboxError::Unavailable),
        }
    }

    /// Receive the oldest message, blocking the current task while the
    /// mailbox is empty.
    ///
    /// With a no-wait timeout, this behaves like [`Self::try_pend`].
    pub fn pend(self, cx: &TaskCx<'_>, timeout: Timeout) -> Result<T, PendMailboxError> {
        let mut st = klock::lock_cpu(cx.kernel);

        if let Some(msg) = pend_core(&mut st, self.0) {
            task::unlock_cpu_and_check_preemption(cx.kernel, st, cx.kind());
            return Ok(bytemuck::pod_read_unaligned(&msg));
        }

        if timeout.is_no_wait() {
            return Err(PendMailboxError::Unavailable);
        }

        st.mailboxes[self.0].readers.push_back(cx.task);
        let (st, outcome) = wait::wait(
            cx.kernel,
            st,
            cx.task,
            WaitObject::MailboxRecv(self.0),
            timeout,
        );
        drop(st);

        match outcome {
            WaitOutcome::Complete(WaitPayload::Message(msg)) => {
                Ok(bytemuck::pod_read_unaligned(&msg))
            }
            WaitOutcome::Timeout => Err(PendMailboxError::Timeout),
            WaitOutcome::Complete(_) => unreachable!(),
        }
    }

    /// Receive the oldest message without blocking. Fails with
    /// `Unavailable` if the mailbox is empty.
    ///
    /// The bound event bits are brought up to date whether or not the call
    /// succeeds.
    pub fn try_pend(self, cx: &impl Context) -> Result<T, PendMailboxError> {
        let mut st = klock::lock_cpu(cx.kernel());
        match pend_core(&mut st, self.0) {
            Some(msg) => {
                task::unlock_cpu_and_check_preemption(cx.kernel(), st, cx.kind());
                Ok(bytemuck::pod_read_unaligned(&msg))
            }
            None => Err(PendMailboxError::Unavailable),
        }
    }

    /// Get the number of messages currently stored in the mailbox.
    pub fn len(self, cx: &impl Context) -> usize {
        klock::lock_cpu(cx.kernel()).mailboxes[self.0].ring.len()
    }

    /// Get a flag indicating whether the mailbox holds no messages.
    pub fn is_empty(self, cx: &impl Context) -> bool {
        self.len(cx) == 0
    }
}

/// The definer (static builder) for [`Mailbox`].
#[must_use = "must call `finish()` to complete registration"]
pub struct MailboxDefiner<T> {
    capacity: usize,
    reader_link: Option<EventLink>,
    writer_link: Option<EventLink>,
    _phantom: PhantomData<fn(T) -> T>,
}

impl<T: Pod> MailboxDefiner<T> {
    /// Specify the number of messages the mailbox can hold. Defaults to `1`.
    pub fn capacity(self, capacity: usize) -> Self {
        Self { capacity, ..self }
    }

    /// Bind "the mailbox is not empty" to `bits` of `group`.
    pub fn reader_event(self, group: EventGroup, bits: EventBits) -> Self {
        Self {
            reader_link: Some(EventLink::new(group, bits)),
            ..self
        }
    }

    /// Bind "the mailbox is not full" to `bits` of `group`.
    pub fn writer_event(self, group: EventGroup, bits: EventBits) -> Self {
        Self {
            writer_link: Some(EventLink::new(group, bits)),
            ..self
        }
    }

    /// Complete the definition of a mailbox, returning a reference to the
    /// mailbox.
    pub fn finish(self, cfg: &mut Cfg) -> Mailbox<T> {
        let id = cfg.push_mailbox(MailboxAttr {
            msg_size: size_of::<T>(),
            capacity: self.capacity,
            reader_link: self.reader_link,
            writer_link: self.writer_link,
        });
        Mailbox(id, PhantomData)
    }
}

/// The type-erased properties of a mailbox.
#[derive(Debug)]
pub(crate) struct MailboxAttr {
    pub(crate) msg_size: usize,
    pub(crate) capacity: usize,
    pub(crate) reader_link: Option<EventLink>,
    pub(crate) writer_link: Option<EventLink>,
}

/// *Mailbox control block* - the state data of a mailbox.
#[derive(Debug)]
pub(crate) struct MailboxCb {
    pub(crate) ring: MessageRing,
    pub(crate) reader_link: Option<EventLink>,
    pub(crate) writer_link: Option<EventLink>,
    /// Tasks waiting for a message. Non-empty only if `ring` is empty.
    pub(crate) readers: WaitQueue,
    /// Tasks waiting for a free slot. Non-empty only if `ring` is full.
    pub(crate) writers: WaitQueue,
}

impl MailboxCb {
    pub(crate) fn new(attr: &MailboxAttr) -> Self {
        Self {
            ring: MessageRing::new(attr.msg_size, attr.capacity),
            reader_link: attr.reader_link,
            writer_link: attr.writer_link,
            readers: WaitQueue::default(),
            writers: WaitQueue::default(),
        }
    }
}

/// Make the bound event bits match the mailbox's fill level.
pub(crate) fn reflect(st: &mut State, mailbox: usize) {
    let mailbox_cb = &st.mailboxes[mailbox];
    let (reader_link, writer_link) = (mailbox_cb.reader_link, mailbox_cb.writer_link);
    let (non_empty, non_full) = (!mailbox_cb.ring.is_empty(), !mailbox_cb.ring.is_full());

    if let Some(link) = reader_link {
        link.reflect(st, non_empty);
    }
    if let Some(link) = writer_link {
        link.reflect(st, non_full);
    }
}

/// Deliver `msg` to a waiting reader or store it in the ring. Gives `msg`
/// back if the ring is full.
fn post_core(st: &mut State, mailbox: usize, msg: Box<[u8]>) -> Result<(), Box<[u8]>> {
    let mailbox_cb = &mut st.mailboxes[mailbox];

    if let Some(reader) = mailbox_cb.readers.pop_front() {
        debug_assert!(mailbox_cb.ring.is_empty());
        wait::complete_wait(st, reader, WaitPayload::Message(msg));
        return Ok(());
    }

    let pushed = mailbox_cb.ring.push(&msg);

    // A failed attempt also resynchronizes the bound bits, which might have
    // been set by a direct post to the event group
    reflect(st, mailbox);
    if pushed {
        Ok(())
    } else {
        Err(msg)
    }
}

/// Take the oldest message from the ring. If a writer is waiting for a free
/// slot, move its message into the slot just freed and wake it up.
fn pend_core(st: &mut State, mailbox: usize) -> Option<Box<[u8]>> {
    let msg = st.mailboxes[mailbox].ring.pop();

    if msg.is_some() {
        if let Some(writer) = st.mailboxes[mailbox].writers.pop_front() {
            match wait::complete_wait(st, writer, WaitPayload::None) {
                WaitObject::MailboxSend(_, writer_msg) => {
                    let pushed = st.mailboxes[mailbox].ring.push(&writer_msg);
                    debug_assert!(pushed);
                }
                _ => unreachable!(),
            }
        }
    }

    reflect(st, mailbox);
    msg
}
