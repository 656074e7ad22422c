mod common;

use common::{Log, init_tracing};
use eventide::{EventLoop, Promise};

#[test]
fn test_then_runs_after_pending_ticks() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();
    let log = Log::default();

    let promise = Promise::resolved(&handle, 1);
    let record = log.clone();
    promise
        .then(move |value: i32| record.push(format!("then {value}")))
        .unwrap();
    handle.schedule_tick(log.recorder("tick")).unwrap();

    assert!(log.entries().is_empty());
    event_loop.run().unwrap();

    assert_eq!(log.entries(), ["tick", "then 1"]);
}

#[test]
fn test_resolve_from_a_timer_wakes_every_reaction() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();
    let log = Log::default();

    let (promise, resolver) = Promise::<String>::new(&handle);
    for name in ["first", "second"] {
        let record = log.clone();
        promise
            .then(move |value| record.push(format!("{name}: {value}")))
            .unwrap();
    }

    handle
        .set_timeout(
            move || {
                assert!(resolver.resolve("ready".to_string()));
            },
            5,
        )
        .unwrap();
    handle.schedule_check(log.recorder("check")).unwrap();

    event_loop.run().unwrap();

    assert_eq!(log.entries(), ["check", "first: ready", "second: ready"]);
    assert_eq!(promise.peek().as_deref(), Some("ready"));
}

#[test]
fn test_first_resolution_wins() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let (promise, resolver) = Promise::new(&handle);
    assert!(!promise.is_settled());
    assert_eq!(promise.peek(), None);

    assert!(resolver.resolve(1u8));
    assert!(!resolver.resolve(2u8));

    assert!(resolver.is_settled());
    assert_eq!(promise.peek(), Some(1u8));
}

#[test]
fn test_then_on_a_torn_down_loop_fails() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let (promise, _resolver) = Promise::<u8>::new(&handle);
    event_loop.shutdown();

    assert!(promise.then(|_| ()).is_err());
}
