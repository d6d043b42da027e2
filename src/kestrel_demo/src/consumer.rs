//! The consumer task
//!
//! ```text
//!                  ┌───────────────────────┐
//!                  │                       │ OrGroup
//!                  ▼                       │
//!           ┌─────────────┐  OrGroup  ┌────┴──────────┐
//!      ────►│WaitComposite├──────────►│ take a message│
//!           └──────┬──────┘           └───────────────┘
//!                  │ AndGroup, TimedOut, Unknown
//!                  ▼
//!           ┌─────────────┐
//!           │DegradedLoop │ (forever)
//!           └─────────────┘
//! ```
use kestrel_kernel::{Context, EventBits, TaskCx, Timeout, WaitCondition, WaitEventGroupError};

use crate::{bits, AppConfig, Board, Objects};

/// How a wait for the composite event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Every bit of [`bits::AND_GROUP`] was set.
    AndGroup(EventBits),
    /// A bit of [`bits::OR_GROUP`] was set, and the AND group was not
    /// complete.
    OrGroup(EventBits),
    /// The wait timed out.
    TimedOut,
    /// The wait returned a bit pattern satisfying neither group.
    Unknown(EventBits),
}

impl Wake {
    /// Classify the bits returned by a composite event wait.
    ///
    /// The AND group takes precedence when both groups are satisfied.
    pub fn classify(observed: EventBits) -> Self {
        if observed.contains(bits::AND_GROUP) {
            Self::AndGroup(observed)
        } else if observed.intersects(bits::OR_GROUP) {
            Self::OrGroup(observed)
        } else {
            Self::Unknown(observed)
        }
    }
}

/// The entry point of the consumer task.
pub(crate) fn consumer_body(
    cx: &TaskCx<'_>,
    objects: &Objects,
    config: &AppConfig,
    board: &Board,
) -> ! {
    let cond = WaitCondition::new(bits::AND_GROUP, bits::OR_GROUP);

    loop {
        let wake = match objects
            .event_group
            .pend(cx, cond, Timeout::Ticks(config.timeout))
        {
            Ok(observed) => Wake::classify(observed),
            Err(WaitEventGroupError::Timeout) => Wake::TimedOut,
            Err(e) => {
                log::error!("the composite event wait failed: {e}");
                Wake::Unknown(EventBits::empty())
            }
        };
        log::debug!("consumer woke up at tick {}: {wake:?}", cx.time());

        match wake {
            Wake::OrGroup(_) => match objects.mailbox.try_pend(cx) {
                Ok(msg) => board.console.write_line(&format!(
                    "read id = {} val = '{}'",
                    msg.id,
                    msg.val_char()
                )),
                Err(_) => board
                    .console
                    .write_line("mailbox not available, lost wakeup. Test failed!"),
            },
            Wake::AndGroup(_) => {
                match objects.semaphore.poll(cx) {
                    Ok(()) => board
                        .console
                        .write_line("explicit post of the timer bit and implicit post of the semaphore bit"),
                    Err(_) => board
                        .console
                        .write_line("semaphore not available, lost wakeup. Test failed!"),
                }
                break;
            }
            Wake::TimedOut => {
                board.console.write_line("timed out waiting for the composite event");
                break;
            }
            Wake::Unknown(observed) => {
                board
                    .console
                    .write_line(&format!("unknown event {:#04x}", observed.bits()));
                break;
            }
        }
    }

    degraded_loop(cx, objects, config, board)
}

/// Keep waiting for the composite event with a long timeout, toggling the
/// red LED on every return. Messages are no longer taken from the mailbox.
///
/// The wait consumes the bits it observes. A mirrored bit cleared this way
/// stays clear until its object changes state again.
fn degraded_loop(cx: &TaskCx<'_>, objects: &Objects, config: &AppConfig, board: &Board) -> ! {
    log::info!("consumer entered the degraded loop at tick {}", cx.time());
    let cond = WaitCondition::new(bits::AND_GROUP, bits::OR_GROUP).consume();
    let timeout = Timeout::Ticks(config.degraded_timeout());

    loop {
        let result = objects.event_group.pend(cx, cond, timeout);
        log::trace!("degraded loop woke up at tick {}: {result:?}", cx.time());
        match result {
            Ok(_) | Err(WaitEventGroupError::Timeout) => {}
            Err(e) => {
                // A failing wait returns immediately. Don't spin on it.
                log::error!("the composite event wait failed: {e}");
                cx.sleep(config.degraded_timeout());
            }
        }
        board.red_led.toggle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_group_wins_ties() {
        assert_eq!(
            Wake::classify(bits::TIMER | bits::SEMAPHORE | bits::MAILBOX),
            Wake::AndGroup(bits::TIMER | bits::SEMAPHORE | bits::MAILBOX)
        );
    }

    #[test]
    fn partial_and_group_with_mailbox() {
        assert_eq!(
            Wake::classify(bits::TIMER | bits::MAILBOX),
            Wake::OrGroup(bits::TIMER | bits::MAILBOX)
        );
    }

    #[test]
    fn neither_group() {
        assert_eq!(Wake::classify(bits::TIMER), Wake::Unknown(bits::TIMER));
        assert_eq!(
            Wake::classify(EventBits::empty()),
            Wake::Unknown(EventBits::empty())
        );
    }
}
