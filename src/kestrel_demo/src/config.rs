//! The reference configuration of the demo
use kestrel_kernel::Ticks;

/// The expiration schedule of a periodic timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// The delay before the first expiration.
    pub delay: Ticks,
    /// The interval between subsequent expirations. `None` or `Some(0)`
    /// makes the timer one-shot.
    pub period: Option<Ticks>,
}

/// Tunable parameters of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// How long the consumer waits for the composite event in its primary
    /// loop, and how long the producer waits for a free mailbox slot.
    pub timeout: Ticks,
    /// The consumer's wait timeout in the degraded loop is `timeout` times
    /// this factor.
    pub degraded_timeout_factor: Ticks,
    pub mailbox_capacity: usize,
    /// The number of messages sent by the producer.
    pub num_messages: u8,
    /// The timer that sets the explicit event bit and toggles the green LED.
    pub event_timer: TimerConfig,
    /// The timer that posts the semaphore.
    pub semaphore_timer: TimerConfig,
    /// The priority shared by the producer and the consumer. They take turns
    /// in definition order, the producer first.
    pub task_priority: usize,
    pub stack_size: usize,
    /// The run ends when the clock reaches this point.
    pub run_ticks: Ticks,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timeout: 12,
            degraded_timeout_factor: 200,
            mailbox_capacity: 2,
            num_messages: 3,
            event_timer: TimerConfig {
                delay: 5,
                period: Some(1000),
            },
            semaphore_timer: TimerConfig {
                delay: 10,
                period: Some(1000),
            },
            task_priority: 1,
            stack_size: 512,
            run_ticks: 5000,
        }
    }
}

impl AppConfig {
    /// The consumer's wait timeout in the degraded loop.
    pub fn degraded_timeout(&self) -> Ticks {
        self.timeout.saturating_mul(self.degraded_timeout_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_values() {
        let config = AppConfig::default();
        assert_eq!(config.timeout, 12);
        assert_eq!(config.degraded_timeout(), 2400);
        assert_eq!(config.stack_size, 512);
        // The semaphore must be posted before the consumer's first wait
        // times out
        assert!(config.semaphore_timer.delay < config.timeout);
    }
}
