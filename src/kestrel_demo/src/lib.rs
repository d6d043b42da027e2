//! A producer/consumer application built on `kestrel_kernel`.
//!
//! The consumer waits on a single event group for a composite condition:
//!
//! ```text
//!   (TIMER and SEMAPHORE) or MAILBOX
//! ```
//!
//!  - `TIMER` is set directly by a periodic timer.
//!  - `SEMAPHORE` mirrors a binary semaphore posted by another periodic
//!    timer.
//!  - `MAILBOX` mirrors "the mailbox holds a message". The producer task
//!    fills the mailbox.
//!
//! The consumer drains the mailbox through the OR path until the AND group
//! completes, the wait times out, or an unexpected bit pattern shows up.
//! After that it stays in a degraded loop for the rest of the run.
use std::{fmt, sync::Arc};

use kestrel_kernel::{
    BootError, Cfg, CfgError, EventGroup, Mailbox, RunReport, Semaphore, SemaphoreMode, Task,
    Timer,
};

pub mod board;
mod config;
mod consumer;
mod message;
mod producer;

pub use self::{
    board::{Board, Console, Led},
    config::{AppConfig, TimerConfig},
    consumer::Wake,
    message::Message,
};

/// The bits of the composite event.
pub mod bits {
    use kestrel_kernel::EventBits;

    /// Set directly by the event timer.
    pub const TIMER: EventBits = EventBits::ID_00;
    /// Mirrors the availability of the semaphore.
    pub const SEMAPHORE: EventBits = EventBits::ID_01;
    /// Mirrors "the mailbox holds at least one message".
    pub const MAILBOX: EventBits = EventBits::ID_02;

    pub const AND_GROUP: EventBits = TIMER.union(SEMAPHORE);
    pub const OR_GROUP: EventBits = MAILBOX;
}

/// The synchronization objects shared by the tasks and the timers.
#[derive(Debug, Clone, Copy)]
pub struct Objects {
    pub event_group: EventGroup,
    pub semaphore: Semaphore,
    pub mailbox: Mailbox<Message>,
}

/// Every kernel object defined by the application.
#[derive(Debug, Clone, Copy)]
pub struct App {
    pub objects: Objects,
    pub event_timer: Timer,
    pub semaphore_timer: Timer,
    pub producer: Task,
    pub consumer: Task,
}

impl App {
    /// Define the application's kernel objects in `cfg`.
    ///
    /// More objects can be added to `cfg` before it's finished, e.g., to
    /// inject extra activity in a test.
    pub fn configure(cfg: &mut Cfg, config: &AppConfig, board: &Board) -> Self {
        let event_group = EventGroup::define().finish(cfg);
        let semaphore = Semaphore::define()
            .mode(SemaphoreMode::Binary)
            .event(event_group, bits::SEMAPHORE)
            .finish(cfg);
        let mailbox = Mailbox::<Message>::define()
            .capacity(config.mailbox_capacity)
            .reader_event(event_group, bits::MAILBOX)
            .finish(cfg);
        let objects = Objects {
            event_group,
            semaphore,
            mailbox,
        };

        let green_led = Arc::clone(&board.green_led);
        let event_timer = Timer::define()
            .delay(config.event_timer.delay)
            .period(config.event_timer.period)
            .active(true)
            .start(move |cx| {
                event_group.post(cx, bits::TIMER);
                green_led.toggle();
            })
            .finish(cfg);

        let semaphore_timer = Timer::define()
            .delay(config.semaphore_timer.delay)
            .period(config.semaphore_timer.period)
            .active(true)
            .start(move |cx| {
                if let Err(e) = semaphore.post(cx) {
                    log::warn!("failed to post the semaphore: {e}");
                }
            })
            .finish(cfg);

        let (task_config, task_board) = (config.clone(), board.clone());
        let producer = Task::define()
            .name("producer")
            .priority(config.task_priority)
            .stack_size(config.stack_size)
            .start(move |cx| producer::producer_body(cx, &objects, &task_config, &task_board))
            .finish(cfg);

        let (task_config, task_board) = (config.clone(), board.clone());
        let consumer = Task::define()
            .name("consumer")
            .priority(config.task_priority)
            .stack_size(config.stack_size)
            .start(move |cx| consumer::consumer_body(cx, &objects, &task_config, &task_board))
            .finish(cfg);

        Self {
            objects,
            event_timer,
            semaphore_timer,
            producer,
            consumer,
        }
    }
}

/// Error type for [`run`].
#[derive(Debug)]
pub enum RunError {
    Cfg(CfgError),
    Boot(BootError),
}

impl From<CfgError> for RunError {
    fn from(x: CfgError) -> Self {
        Self::Cfg(x)
    }
}

impl From<BootError> for RunError {
    fn from(x: BootError) -> Self {
        Self::Boot(x)
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Cfg(e) => write!(f, "invalid configuration: {e}"),
            Self::Boot(e) => write!(f, "failed to boot: {e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Cfg(e) => Some(e),
            Self::Boot(e) => Some(e),
        }
    }
}

/// Build the application and run it for `config.run_ticks` ticks.
pub fn run(config: &AppConfig, board: Board) -> Result<RunReport, RunError> {
    let mut cfg = Cfg::new();
    App::configure(&mut cfg, config, &board);
    let report = cfg.finish()?.boot(config.run_ticks)?;
    log::info!("halted at tick {} ({:?})", report.now, report.reason);
    Ok(report)
}
