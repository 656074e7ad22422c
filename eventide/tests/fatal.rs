mod common;

use common::{Log, init_tracing};
use eventide::error::{CallbackError, LoopError};
use eventide::{EventLoop, LoopBuilder, Phase, QueueId, Recovery};

use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_uncaught_error_fails_fast_by_default() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();
    let log = Log::default();

    handle
        .schedule_check(|| Err::<(), _>(anyhow::anyhow!("check failed")))
        .unwrap();
    handle.schedule_check(log.recorder("next check")).unwrap();
    handle.schedule_close(log.recorder("close")).unwrap();

    let err = event_loop.run().unwrap_err();

    let LoopError::Uncaught(uncaught) = err else {
        panic!("expected an uncaught error, got {err:?}");
    };
    assert_eq!(uncaught.phase, Some(Phase::Check));
    assert_eq!(uncaught.queue, QueueId::Phase(Phase::Check));
    assert!(matches!(uncaught.error, CallbackError::Failed(_)));

    assert!(log.entries().is_empty());
    assert!(event_loop.is_torn_down());
    assert!(handle.schedule_tick(|| ()).is_err());
}

#[test]
fn test_resume_handler_keeps_the_loop_running() {
    init_tracing();
    let event_loop = LoopBuilder::new()
        .uncaught_handler(|_| Recovery::Resume)
        .build();
    let handle = event_loop.handle();
    let log = Log::default();

    handle
        .schedule_check(|| Err::<(), _>(anyhow::anyhow!("ignored")))
        .unwrap();
    handle.schedule_check(log.recorder("next check")).unwrap();
    handle.set_timeout(log.recorder("timer"), 5).unwrap();

    event_loop.run().unwrap();

    assert_eq!(log.entries(), ["next check", "timer"]);
    assert_eq!(event_loop.stats().uncaught, 1);
    assert!(!event_loop.is_torn_down());
}

#[test]
fn test_diagnostic_hooks_run_before_the_handler() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();
    let log = Log::default();

    let first = log.clone();
    event_loop.on_uncaught(move |err| first.push(format!("hook 1: {:?}", err.queue)));
    let second = log.clone();
    event_loop.on_uncaught(move |_| second.push("hook 2"));

    let handler = log.clone();
    event_loop.set_uncaught_handler(move |_| {
        handler.push("handler");
        Recovery::Resume
    });

    handle
        .schedule_tick(|| Err::<(), _>(anyhow::anyhow!("tick failed")))
        .unwrap();

    event_loop.run().unwrap();

    assert_eq!(log.entries(), ["hook 1: Tick", "hook 2", "handler"]);
}

#[test]
fn test_panicking_callback_is_reported() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let seen = Rc::new(RefCell::new(None));
    let record = seen.clone();
    event_loop.on_uncaught(move |err| {
        if let CallbackError::Panicked(message) = &err.error {
            *record.borrow_mut() = Some(message.clone());
        }
    });

    handle
        .set_timeout(|| -> () { panic!("timer exploded") }, 0)
        .unwrap();

    let err = event_loop.run().unwrap_err();

    assert!(matches!(err, LoopError::Uncaught(ref e) if e.phase == Some(Phase::Timers)));
    assert_eq!(seen.borrow().as_deref(), Some("timer exploded"));
}

#[test]
fn test_main_script_microtask_error_has_no_phase() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    handle
        .schedule_reaction(|| Err::<(), _>(anyhow::anyhow!("too early")))
        .unwrap();

    let err = event_loop.run().unwrap_err();

    let LoopError::Uncaught(uncaught) = err else {
        panic!("expected an uncaught error, got {err:?}");
    };
    assert_eq!(uncaught.phase, None);
    assert_eq!(uncaught.queue, QueueId::Reaction);
}

#[test]
fn test_running_inside_a_callback_is_refused() {
    init_tracing();
    let event_loop = Rc::new(EventLoop::new());
    let handle = event_loop.handle();

    let result = Rc::new(RefCell::new(None));
    let record = result.clone();
    let inner = Rc::downgrade(&event_loop);
    handle
        .schedule_check(move || {
            if let Some(event_loop) = inner.upgrade() {
                *record.borrow_mut() = Some(event_loop.run());
            }
        })
        .unwrap();

    event_loop.run().unwrap();

    assert!(matches!(
        result.borrow().as_ref(),
        Some(Err(LoopError::Reentrant))
    ));
}
