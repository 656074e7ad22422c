mod common;

use common::{Log, init_tracing};
use eventide::{EventLoop, LoopBuilder, QueueId, Step};

use std::cell::Cell;
use std::rc::Rc;

#[test]
fn test_ticks_drain_before_reactions() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();
    let log = Log::default();

    handle.schedule_tick(log.recorder("A")).unwrap();
    handle.schedule_reaction(log.recorder("B")).unwrap();
    handle.schedule_tick(log.recorder("C")).unwrap();

    event_loop.run().unwrap();

    assert_eq!(log.entries(), ["A", "C", "B"]);
}

#[test]
fn test_tick_enqueued_by_reaction_preempts_next_reaction() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();
    let log = Log::default();

    let inner = handle.clone();
    let first = log.clone();
    handle
        .schedule_reaction(move || {
            first.push("R1");
            inner.schedule_tick(first.recorder("T")).unwrap();
        })
        .unwrap();
    handle.schedule_reaction(log.recorder("R2")).unwrap();

    event_loop.run().unwrap();

    assert_eq!(log.entries(), ["R1", "T", "R2"]);
}

#[test]
fn test_drain_runs_after_every_callback() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();
    let log = Log::default();

    for name in ["first", "second"] {
        let inner = handle.clone();
        let log = log.clone();

        handle
            .schedule_check(move || {
                log.push(name);
                inner.schedule_reaction(log.recorder(&format!("{name} reaction"))).unwrap();
            })
            .unwrap();
    }

    event_loop.run().unwrap();

    assert_eq!(
        log.entries(),
        ["first", "first reaction", "second", "second reaction"]
    );
}

#[test]
fn test_recursive_ticks_starve_timers() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();
    let log = Log::default();

    handle.set_timeout(log.recorder("timer"), 0).unwrap();

    let count = Rc::new(Cell::new(0));
    let steps = log.clone();
    let counter = count.clone();
    let repeat = handle
        .repeat(QueueId::Tick, move || {
            counter.set(counter.get() + 1);

            if counter.get() < 1_000 {
                Step::Continue
            } else {
                steps.push("ticks done");
                Step::Break
            }
        })
        .unwrap();

    event_loop.run().unwrap();

    assert_eq!(log.entries(), ["ticks done", "timer"]);
    assert_eq!(repeat.iterations(), 1_000);
    assert!(repeat.is_finished());
}

#[test]
fn test_repeat_on_check_lets_phases_advance() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();
    let log = Log::default();

    let inner = handle.clone();
    let steps = log.clone();
    let mut iteration = 0;
    handle
        .repeat(QueueId::from(eventide::Phase::Check), move || {
            steps.push(format!("check{iteration}"));
            inner
                .set_timeout(steps.recorder(&format!("timer{iteration}")), 0)
                .unwrap();

            iteration += 1;
            if iteration < 3 { Step::Continue } else { Step::Break }
        })
        .unwrap();

    event_loop.run().unwrap();

    assert_eq!(
        log.entries(),
        ["check0", "timer0", "check1", "timer1", "check2", "timer2"]
    );
}

#[test]
fn test_cancelled_repeat_stops() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let repeat = handle
        .repeat(QueueId::from(eventide::Phase::Check), || Step::Continue)
        .unwrap();

    let control = repeat.clone();
    handle
        .set_timeout(move || control.cancel(), 5)
        .unwrap();

    event_loop.run().unwrap();

    assert!(repeat.is_finished());
    assert!(repeat.iterations() > 0);
}

#[test]
fn test_microtask_budget_keeps_ordering() {
    init_tracing();
    let event_loop = LoopBuilder::new().microtask_budget(2).build();
    let handle = event_loop.handle();
    let log = Log::default();

    for name in ["A", "B", "C", "D"] {
        handle.schedule_reaction(log.recorder(name)).unwrap();
    }
    handle.schedule_tick(log.recorder("T")).unwrap();

    event_loop.run().unwrap();

    assert_eq!(log.entries(), ["T", "A", "B", "C", "D"]);
    assert_eq!(event_loop.stats().executed(QueueId::Reaction), 4);
    assert_eq!(event_loop.stats().executed(QueueId::Tick), 1);
}
