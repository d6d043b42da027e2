//! The producer task
use kestrel_kernel::{TaskCx, Timeout};

use crate::{AppConfig, Board, Message, Objects};

/// Post `config.num_messages` messages and exit. Each post waits at most
/// `config.timeout` ticks for a free slot. A message that can't be posted
/// in time is dropped.
pub(crate) fn producer_body(
    cx: &TaskCx<'_>,
    objects: &Objects,
    config: &AppConfig,
    board: &Board,
) {
    for id in 0..config.num_messages {
        let msg = Message::nth(id);
        board.console.write_line(&format!(
            "writing message id = {} val = '{}' ...",
            msg.id,
            msg.val_char()
        ));

        if let Err(e) = objects.mailbox.post(cx, &msg, Timeout::Ticks(config.timeout)) {
            log::warn!("dropped message {}: {e}", msg.id);
        }
    }

    board.console.write_line("writer done.");
}
