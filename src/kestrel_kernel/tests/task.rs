//! Scheduling scenarios
use std::sync::Arc;

use kestrel_kernel::{Cfg, Context, HaltReason, Semaphore, Task, TaskState, Timeout};
use spin::Mutex;

mod common;
use common::{init_logger, SeqTracker};

type Trace = Arc<Mutex<Vec<&'static str>>>;

#[test]
fn dispatch_order() {
    init_logger();
    let trace = Trace::default();
    let mut cfg = Cfg::new();

    let running = Arc::new(Mutex::new(Vec::new()));
    let mut tasks = Vec::new();
    for (name, priority) in [("a", 3), ("b", 1), ("c", 2), ("d", 1)] {
        let t = Arc::clone(&trace);
        let r = Arc::clone(&running);
        let task = Task::define()
            .name(name)
            .priority(priority)
            .start(move |cx| {
                t.lock().push(name);
                r.lock().push(cx.task());
            })
            .finish(&mut cfg);
        tasks.push(task);
    }

    let report = cfg.finish().unwrap().boot(100).unwrap();
    assert_eq!(*trace.lock(), ["b", "d", "c", "a"]);
    assert_eq!(*running.lock(), [tasks[1], tasks[3], tasks[2], tasks[0]]);
    assert_eq!(report.tasks[0].name, "a");
    assert_eq!(report.tasks[0].priority, 3);
}

#[test]
fn yield_round_robin() {
    init_logger();
    let trace = Trace::default();
    let mut cfg = Cfg::new();

    for name in ["a", "b"] {
        let t = Arc::clone(&trace);
        Task::define()
            .priority(1)
            .start(move |cx| {
                for _ in 0..3 {
                    t.lock().push(name);
                    cx.yield_now();
                }
            })
            .finish(&mut cfg);
    }

    // A lower-priority task never gets the CPU while they are taking turns
    let t = Arc::clone(&trace);
    Task::define()
        .priority(2)
        .start(move |_| t.lock().push("low"))
        .finish(&mut cfg);

    cfg.finish().unwrap().boot(100).unwrap();
    assert_eq!(*trace.lock(), ["a", "b", "a", "b", "a", "b", "low"]);
}

/// A higher-priority task leaving the Blocked state preempts the running
/// task.
///
/// 1. (`seq`: 0 → 1, 0) `task0` goes to sleep.
/// 2. (`seq`: 1 → 2, 0) `task1` starts waiting for the semaphore with a
///    timeout.
/// 3. (`seq`: 2 → 3, 5) `task0` wakes up and posts the semaphore, which makes
///    `task1` Ready. `task0` keeps running.
/// 4. (`seq`: 3 → 4, 5) `task0` exits.
/// 5. (`seq`: 4 → 5, 5) `task1` wakes up.
#[test]
fn sleep_and_wakeup() {
    init_logger();
    let seq = SeqTracker::new();
    let mut cfg = Cfg::new();
    let sem = Semaphore::define().finish(&mut cfg);

    let s = seq.clone();
    Task::define()
        .priority(0)
        .start(move |cx| {
            s.expect_and_replace(0, 1);
            cx.sleep(5);
            assert_eq!(cx.time(), 5);
            s.expect_and_replace(2, 3);
            sem.post(cx).unwrap();
            s.expect_and_replace(3, 4);
        })
        .finish(&mut cfg);

    let s = seq.clone();
    Task::define()
        .priority(1)
        .start(move |cx| {
            s.expect_and_replace(1, 2);
            sem.pend(cx, Timeout::Ticks(100)).unwrap();
            assert_eq!(cx.time(), 5);
            s.expect_and_replace(4, 5);
        })
        .finish(&mut cfg);

    let report = cfg.finish().unwrap().boot(1000).unwrap();
    assert_eq!(seq.get(), 5);
    assert_eq!(report.now, 5);
}

#[test]
fn sleep_zero_yields() {
    init_logger();
    let trace = Trace::default();
    let mut cfg = Cfg::new();

    let t = Arc::clone(&trace);
    Task::define()
        .start(move |cx| {
            t.lock().push("a0");
            cx.sleep(0);
            assert_eq!(cx.time(), 0);
            t.lock().push("a1");
        })
        .finish(&mut cfg);
    let t = Arc::clone(&trace);
    Task::define()
        .start(move |_| t.lock().push("b"))
        .finish(&mut cfg);

    cfg.finish().unwrap().boot(100).unwrap();
    assert_eq!(*trace.lock(), ["a0", "b", "a1"]);
}

#[test]
fn shutdown() {
    init_logger();
    let mut cfg = Cfg::new();
    let sem = Semaphore::define().finish(&mut cfg);

    let waiter = Task::define()
        .priority(0)
        .start(move |cx| {
            sem.pend(cx, Timeout::Forever).unwrap();
            unreachable!();
        })
        .finish(&mut cfg);
    let stopper = Task::define()
        .priority(1)
        .start(|cx| cx.shutdown())
        .finish(&mut cfg);
    let never_run = Task::define()
        .name("never_run")
        .priority(2)
        .start(|_| unreachable!())
        .finish(&mut cfg);

    let report = cfg.finish().unwrap().boot(100).unwrap();
    assert_eq!(report.reason, HaltReason::Requested);
    assert_eq!(report.now, 0);
    assert_eq!(report.task(waiter).state, TaskState::Blocked);
    assert_eq!(report.task(stopper).state, TaskState::Running);
    assert_eq!(report.task(never_run).state, TaskState::Ready);
    assert_eq!(report.task(never_run).name, "never_run");
}

#[test]
fn idle_with_blocked_task() {
    init_logger();
    let mut cfg = Cfg::new();
    let sem = Semaphore::define().finish(&mut cfg);
    let task = Task::define()
        .start(move |cx| {
            let _ = sem.pend(cx, Timeout::Forever);
        })
        .finish(&mut cfg);

    let report = cfg.finish().unwrap().boot(100).unwrap();
    assert_eq!(report.reason, HaltReason::Idle);
    assert_eq!(report.task(task).state, TaskState::Blocked);
    assert_eq!(report.task(task).name, "task0");
}

#[test]
fn time_limit_with_sleeping_task() {
    init_logger();
    let mut cfg = Cfg::new();
    let task = Task::define().start(|cx| cx.sleep(100)).finish(&mut cfg);

    let report = cfg.finish().unwrap().boot(50).unwrap();
    assert_eq!(report.reason, HaltReason::TimeLimit);
    assert_eq!(report.now, 50);
    assert_eq!(report.task(task).state, TaskState::Blocked);
}

#[test]
#[should_panic(expected = "task failure")]
fn panicking_task() {
    init_logger();
    let mut cfg = Cfg::new();
    Task::define()
        .priority(0)
        .start(|cx| {
            cx.sleep(2);
            panic!("task failure");
        })
        .finish(&mut cfg);
    Task::define()
        .priority(1)
        .start(|cx| cx.sleep(50))
        .finish(&mut cfg);

    let _ = cfg.finish().unwrap().boot(100);
}

#[test]
fn small_stack_request() {
    init_logger();
    let mut cfg = Cfg::new();
    Task::define()
        .stack_size(512)
        .start(|cx| {
            // The host thread gets a usable stack regardless
            let buf = [0u8; 16 * 1024];
            assert_eq!(buf.iter().map(|&x| x as u32).sum::<u32>(), 0);
            cx.yield_now();
        })
        .finish(&mut cfg);

    cfg.finish().unwrap().boot(100).unwrap();
}
