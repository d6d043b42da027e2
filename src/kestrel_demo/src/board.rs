//! Board collaborators
//!
//! The application talks to the outside world only through a console and
//! two LEDs. [`Board::host`] maps them to the `log` facade. The recording
//! implementations capture the output so that tests can inspect it.
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use spin::Mutex as SpinMutex;

/// A sink for text lines.
pub trait Console: Send + Sync {
    fn write_line(&self, line: &str);
}

/// An LED that can be toggled.
pub trait Led: Send + Sync {
    fn toggle(&self);
}

/// The peripherals used by the application.
#[derive(Clone)]
pub struct Board {
    pub console: Arc<dyn Console>,
    /// Toggled by the consumer in the degraded loop.
    pub red_led: Arc<dyn Led>,
    /// Toggled by the event timer.
    pub green_led: Arc<dyn Led>,
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Board").finish_non_exhaustive()
    }
}

impl Board {
    /// Construct a board whose peripherals write to the log. Both LEDs
    /// start off.
    pub fn host() -> Self {
        log::debug!("initializing the host board");
        Self {
            console: Arc::new(LogConsole),
            red_led: Arc::new(LogLed::new("red")),
            green_led: Arc::new(LogLed::new("green")),
        }
    }

    /// Construct a board whose peripherals record their activity, returning
    /// the board and the recorders.
    pub fn recording() -> (Self, Recorders) {
        let recorders = Recorders {
            console: Arc::new(RecordingConsole::default()),
            red_led: Arc::new(RecordingLed::default()),
            green_led: Arc::new(RecordingLed::default()),
        };
        let board = Self {
            console: recorders.console.clone(),
            red_led: recorders.red_led.clone(),
            green_led: recorders.green_led.clone(),
        };
        (board, recorders)
    }
}

struct LogConsole;

impl Console for LogConsole {
    fn write_line(&self, line: &str) {
        log::info!("{line}");
    }
}

struct LogLed {
    name: &'static str,
    on: AtomicBool,
}

impl LogLed {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            on: AtomicBool::new(false),
        }
    }
}

impl Led for LogLed {
    fn toggle(&self) {
        let on = !self.on.fetch_xor(true, Ordering::Relaxed);
        log::debug!("{} LED {}", self.name, if on { "on" } else { "off" });
    }
}

/// The recorders backing a board created by [`Board::recording`].
#[derive(Debug, Clone)]
pub struct Recorders {
    pub console: Arc<RecordingConsole>,
    pub red_led: Arc<RecordingLed>,
    pub green_led: Arc<RecordingLed>,
}

/// A console that stores every line written to it.
#[derive(Debug, Default)]
pub struct RecordingConsole {
    lines: SpinMutex<Vec<String>>,
}

impl RecordingConsole {
    /// Get a copy of the lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl Console for RecordingConsole {
    fn write_line(&self, line: &str) {
        log::info!("{line}");
        self.lines.lock().push(line.to_owned());
    }
}

/// An LED that counts its toggles.
#[derive(Debug, Default)]
pub struct RecordingLed {
    toggles: AtomicUsize,
}

impl RecordingLed {
    pub fn toggle_count(&self) -> usize {
        self.toggles.load(Ordering::Relaxed)
    }
}

impl Led for RecordingLed {
    fn toggle(&self) {
        self.toggles.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorders_see_board_activity() {
        let (board, recorders) = Board::recording();
        board.console.write_line("hello");
        board.green_led.toggle();
        board.green_led.toggle();
        assert_eq!(recorders.console.lines(), ["hello"]);
        assert_eq!(recorders.green_led.toggle_count(), 2);
        assert_eq!(recorders.red_led.toggle_count(), 0);
    }
}
