//! Utilities shared by the kernel tests
#![allow(dead_code)]
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Tracks the progress of a test scenario. Each step of a scenario asserts
/// the counter value left by the previous step, so that a step executed out
/// of order fails the test.
#[derive(Debug, Default)]
pub struct SeqTracker {
    counter: AtomicUsize,
}

impl SeqTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }

    /// Assert that the counter is equal to `old` and then replace it with
    /// `new`.
    #[track_caller]
    pub fn expect_and_replace(&self, old: usize, new: usize) {
        let got = self.counter.load(Ordering::Relaxed);
        log::debug!("{} (expected: {}) → {}", got, old, new);
        assert_eq!(got, old, "expected {}, got {}", old, got);
        self.counter.store(new, Ordering::Relaxed);
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
