//! End-to-end runs of the demo application in virtual time
use kestrel_demo::{bits, board::Recorders, App, AppConfig, Board, Message};
use kestrel_kernel::{
    Cfg, EventBits, HaltReason, PostMailboxError, RunReport, Task, TaskState, Timeout,
    WaitCondition,
};
use assert_matches::assert_matches;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const WRITES_AND_READS: [&str; 7] = [
    "writing message id = 0 val = 'a' ...",
    "writing message id = 1 val = 'b' ...",
    "writing message id = 2 val = 'c' ...",
    "read id = 0 val = 'a'",
    "read id = 1 val = 'b'",
    "read id = 2 val = 'c'",
    "writer done.",
];

const AND_GROUP_LINE: &str =
    "explicit post of the timer bit and implicit post of the semaphore bit";

/// The reference configuration. The consumer receives the three messages
/// through the OR path, then observes the AND group at tick 10, before its
/// 12-tick timeout.
#[test]
fn reference_run() {
    init_logger();
    let config = AppConfig::default();
    let (board, recorders) = Board::recording();

    let report = kestrel_demo::run(&config, board).unwrap();

    let mut expected = WRITES_AND_READS.to_vec();
    expected.push(AND_GROUP_LINE);
    assert_eq!(recorders.console.lines(), expected);

    assert_eq!(report.reason, HaltReason::TimeLimit);
    assert_eq!(report.now, config.run_ticks);
    assert_eq!(report.tasks[0].name, "producer");
    assert_eq!(report.tasks[0].state, TaskState::Terminated);
    assert_eq!(report.tasks[1].name, "consumer");
    assert_eq!(report.tasks[1].state, TaskState::Blocked);

    // The event timer fires at 5, 1005, ..., 4005
    assert_eq!(recorders.green_led.toggle_count(), 5);
    // The degraded loop wakes up whenever the semaphore timer completes the
    // AND group again: 1010, 2010, 3010 and 4010
    assert_eq!(recorders.red_led.toggle_count(), 4);
}

/// The semaphore timer fires too late, so the consumer's wait times out
/// after the messages are drained.
#[test]
fn timeout_path() {
    init_logger();
    let mut config = AppConfig::default();
    config.semaphore_timer.delay = 20;
    config.run_ticks = 100;
    let (board, recorders) = Board::recording();

    let report = kestrel_demo::run(&config, board).unwrap();

    let mut expected = WRITES_AND_READS.to_vec();
    expected.push("timed out waiting for the composite event");
    assert_eq!(recorders.console.lines(), expected);
    assert_eq!(report.reason, HaltReason::TimeLimit);

    // Woken up once at tick 20, when the AND group completes
    assert_eq!(recorders.red_led.toggle_count(), 1);
}

/// Messages posted after the consumer has entered the degraded loop are
/// never taken out of the mailbox.
#[test]
fn late_messages_are_not_drained() {
    init_logger();
    let config = AppConfig::default();
    let (board, recorders) = Board::recording();

    let mut cfg = Cfg::new();
    let app = App::configure(&mut cfg, &config, &board);
    let mailbox = app.objects.mailbox;
    Task::define()
        .name("late_producer")
        .priority(config.task_priority + 1)
        .start(move |cx| {
            cx.sleep(50);
            mailbox.try_post(cx, &Message::nth(10)).unwrap();
            mailbox.try_post(cx, &Message::nth(11)).unwrap();
            assert_matches!(
                mailbox.try_post(cx, &Message::nth(12)),
                Err(PostMailboxError::Unavailable)
            );

            cx.sleep(2000);
            assert_eq!(mailbox.len(cx), 2);
            cx.shutdown();
        })
        .finish(&mut cfg);

    let report = cfg.finish().unwrap().boot(config.run_ticks).unwrap();
    assert_eq!(report.reason, HaltReason::Requested);
    assert_eq!(report.now, 2050);

    let mut expected = WRITES_AND_READS.to_vec();
    expected.push(AND_GROUP_LINE);
    assert_eq!(recorders.console.lines(), expected);

    // Two wakeups for the late messages, two for the AND group at 1010 and
    // 2010
    assert_eq!(recorders.red_led.toggle_count(), 4);
}

/// A wait that fails outright is treated as an unknown event. Another task
/// occupying the event group makes the consumer's wait fail once the
/// mailbox is drained.
#[test]
fn wait_failure_takes_unknown_path() {
    init_logger();
    let config = AppConfig::default();
    let (board, recorders) = Board::recording();

    let mut cfg = Cfg::new();
    let app = App::configure(&mut cfg, &config, &board);
    let event_group = app.objects.event_group;
    let squatter = Task::define()
        .name("squatter")
        .priority(0)
        .start(move |cx| {
            let _ = event_group.pend(cx, WaitCondition::any(EventBits::ID_05), Timeout::Forever);
        })
        .finish(&mut cfg);

    let report = cfg.finish().unwrap().boot(config.run_ticks).unwrap();
    assert_eq!(report.reason, HaltReason::TimeLimit);
    assert_eq!(report.task(squatter).state, TaskState::Blocked);
    assert_eq!(report.task(app.producer).state, TaskState::Terminated);

    assert_eq!(
        recorders.console.lines(),
        [
            "writing message id = 0 val = 'a' ...",
            "writing message id = 1 val = 'b' ...",
            "writing message id = 2 val = 'c' ...",
            "read id = 0 val = 'a'",
            "read id = 1 val = 'b'",
            "read id = 2 val = 'c'",
            "unknown event 0x00",
            "writer done.",
        ]
    );
}

/// Define the application with an extra task that posts `stray` directly
/// to the event group at tick 3, when the mailbox is already drained.
fn run_with_stray_bits(
    config: &AppConfig,
    stray: EventBits,
) -> (RunReport, Recorders) {
    let (board, recorders) = Board::recording();

    let mut cfg = Cfg::new();
    let app = App::configure(&mut cfg, config, &board);
    let event_group = app.objects.event_group;
    Task::define()
        .name("stray_poster")
        .priority(0)
        .start(move |cx| {
            cx.sleep(3);
            event_group.post(cx, stray);
        })
        .finish(&mut cfg);

    let report = cfg.finish().unwrap().boot(config.run_ticks).unwrap();
    assert_eq!(report.task(app.consumer).state, TaskState::Blocked);
    (report, recorders)
}

/// The mailbox bit is set while the mailbox is empty. The consumer reports
/// the lost wakeup and keeps going until the AND group completes at tick 10.
#[test]
fn mailbox_bit_without_message() {
    init_logger();
    let config = AppConfig::default();
    let (report, recorders) = run_with_stray_bits(&config, bits::MAILBOX);

    let mut expected = WRITES_AND_READS.to_vec();
    expected.push("mailbox not available, lost wakeup. Test failed!");
    expected.push(AND_GROUP_LINE);
    assert_eq!(recorders.console.lines(), expected);
    assert_eq!(report.reason, HaltReason::TimeLimit);
    assert_eq!(recorders.red_led.toggle_count(), 4);
}

/// The AND group is completed without a semaphore permit. The consumer
/// reports the lost wakeup and enters the degraded loop at tick 3, which
/// then also wakes up at 10, when the semaphore timer first fires.
#[test]
fn and_group_without_permit() {
    init_logger();
    let config = AppConfig::default();
    let (report, recorders) = run_with_stray_bits(&config, bits::TIMER | bits::SEMAPHORE);

    let mut expected = WRITES_AND_READS.to_vec();
    expected.push("semaphore not available, lost wakeup. Test failed!");
    assert_eq!(recorders.console.lines(), expected);
    assert_eq!(report.reason, HaltReason::TimeLimit);

    // 10, 1010, 2010, 3010 and 4010
    assert_eq!(recorders.red_led.toggle_count(), 5);
    assert_eq!(recorders.green_led.toggle_count(), 5);
}

#[test]
fn bad_configuration() {
    init_logger();
    let config = AppConfig {
        mailbox_capacity: 0,
        ..AppConfig::default()
    };
    let (board, _) = Board::recording();
    assert_matches!(
        kestrel_demo::run(&config, board),
        Err(kestrel_demo::RunError::Cfg(
            kestrel_kernel::CfgError::BadMailboxCapacity
        ))
    );
}
