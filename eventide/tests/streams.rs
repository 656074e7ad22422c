mod common;

use common::{Log, init_tracing};
use eventide::config::StreamOptions;
use eventide::error::ConnectError;
use eventide::stream::{
    Consumed, Emitter, NodeKind, NodeStatus, Pipeline, Sink, Source, Transform, connect, run_pipeline,
};
use eventide::{EventLoop, LoopBuilder, Phase, QueueId, Step};

use bytes::Bytes;
use proptest::prelude::*;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn objects(high: usize) -> StreamOptions {
    StreamOptions::object().high_water_mark(high)
}

#[test]
fn test_sink_reports_backpressure_and_drains() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();
    let log = Log::default();

    let record = log.clone();
    let sink = Sink::new(&handle, objects(2), move |n: u32| record.push(format!("write {n}"))).unwrap();

    assert!(sink.produce(1).unwrap());
    assert!(!sink.produce(2).unwrap());
    assert!(!sink.produce(3).unwrap());
    assert_eq!(sink.buffered_len(), 3);

    let drained_at = Rc::new(Cell::new(usize::MAX));
    let record = log.clone();
    let seen = drained_at.clone();
    let probe = sink.clone();
    sink.on_drain(move || {
        record.push("drain");
        seen.set(probe.buffered_len());
    });

    event_loop.run().unwrap();

    assert_eq!(log.entries(), ["write 1", "write 2", "write 3", "drain"]);
    assert_eq!(drained_at.get(), 0);
}

#[test]
fn test_drain_waits_for_the_low_water_mark() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let sink = Sink::<u32>::manual(&handle, objects(4).low_water_mark(2)).unwrap();
    for n in 0..4 {
        sink.produce(n).unwrap();
    }

    let drained = Rc::new(Cell::new(false));
    let flag = drained.clone();
    sink.on_drain(move || flag.set(true));

    sink.consume().unwrap();
    event_loop.run().unwrap();
    assert!(!drained.get());

    sink.consume().unwrap();
    event_loop.run().unwrap();
    assert!(drained.get());
    assert_eq!(sink.buffered_len(), 2);
}

#[test]
fn test_complete_is_idempotent() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let source = Source::<u32>::new(&handle, objects(4)).unwrap();
    let finished = Rc::new(Cell::new(0));
    let counter = finished.clone();
    source.on_finish(move |result| {
        assert!(result.is_ok());
        counter.set(counter.get() + 1);
    });

    source.complete();
    source.complete();
    event_loop.run().unwrap();

    assert_eq!(source.status(), NodeStatus::Completed);
    assert_eq!(finished.get(), 1);
    assert!(source.produce(1).is_err());
    assert_eq!(source.consume().unwrap(), Consumed::End);
}

#[test]
fn test_flush_runs_once_before_the_sink_finishes() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let flushes = Rc::new(Cell::new(0));
    let counter = flushes.clone();

    let source = Source::from_iter(&handle, objects(2), [1u32, 2, 3]).unwrap();
    let transform = Transform::map(&handle, objects(2), |n: u32| n).unwrap().with_flush(
        move |out: &Emitter<'_, u32>| {
            counter.set(counter.get() + 1);
            out.push(99)
        },
    );
    let (sink, collected) = Sink::collect(&handle, objects(2)).unwrap();

    let at_finish = Rc::new(RefCell::new(Vec::new()));
    let snapshot = at_finish.clone();
    let seen = collected.clone();
    sink.on_finish(move |_| *snapshot.borrow_mut() = seen.borrow().clone());

    let done = Pipeline::new(&source)
        .pipe(&transform)
        .unwrap()
        .to(&sink)
        .unwrap()
        .run();

    event_loop.run().unwrap();

    assert_eq!(flushes.get(), 1);
    assert_eq!(*collected.borrow(), [1, 2, 3, 99]);
    assert_eq!(*at_finish.borrow(), [1, 2, 3, 99]);
    assert!(matches!(done.peek(), Some(Ok(()))));
}

#[test]
fn test_lines_pipeline_resolves() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let source = Source::new(&handle, StreamOptions::object()).unwrap();
    let lines = Transform::lines(&handle, StreamOptions::object()).unwrap();
    let (sink, collected) = Sink::collect(&handle, StreamOptions::object()).unwrap();

    let pipeline = Pipeline::new(&source)
        .pipe(&lines)
        .unwrap()
        .to(&sink)
        .unwrap();
    assert_eq!(pipeline.nodes(), [source.id(), lines.id(), sink.id()]);
    assert_eq!(
        [source.kind(), lines.kind(), sink.kind()],
        [NodeKind::Source, NodeKind::Transform, NodeKind::Sink]
    );

    let done = run_pipeline(pipeline);
    let outcome = Rc::new(RefCell::new(None));
    let record = outcome.clone();
    done.then(move |result| *record.borrow_mut() = Some(result))
        .unwrap();

    source.produce("alpha\nbe".to_string()).unwrap();
    source.produce("ta\r\ngam".to_string()).unwrap();
    source.complete();

    event_loop.run().unwrap();

    assert_eq!(*collected.borrow(), ["alpha", "beta", "gam"]);
    assert!(matches!(outcome.borrow().as_ref(), Some(Ok(()))));
    assert_eq!(sink.status(), NodeStatus::Completed);
}

#[test]
fn test_failure_tears_down_the_whole_pipeline() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let source = Source::from_iter(&handle, objects(2), 1u32..=5).unwrap();
    let parser = Transform::new(
        &handle,
        objects(2),
        |n: u32, out: &Emitter<'_, u32>| -> anyhow::Result<()> {
            anyhow::ensure!(n != 3, "cannot parse chunk {n}");
            out.push(n * 10)?;
            Ok(())
        },
    )
    .unwrap()
    .named("parser");
    let (sink, collected) = Sink::collect(&handle, objects(2)).unwrap();

    let done = Pipeline::new(&source)
        .pipe(&parser)
        .unwrap()
        .to(&sink)
        .unwrap()
        .run();

    event_loop.run().unwrap();

    let Some(Err(failure)) = done.peek() else {
        panic!("pipeline should have failed");
    };
    assert_eq!(failure.node, parser.id());
    assert_eq!(failure.name, "parser");
    assert!(failure.to_string().contains("cannot parse chunk 3"));

    assert_eq!(source.status(), NodeStatus::Failed);
    assert_eq!(parser.status(), NodeStatus::Failed);
    assert_eq!(sink.status(), NodeStatus::Failed);
    assert_eq!(sink.error().map(|e| e.origin()), Some(parser.id()));
    assert!(!collected.borrow().contains(&30));
}

#[test]
fn test_a_node_has_one_subscriber_at_a_time() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let source = Source::<u32>::new(&handle, objects(4)).unwrap();
    let first = Sink::<u32>::manual(&handle, objects(4)).unwrap();
    let second = Sink::<u32>::manual(&handle, objects(4)).unwrap();

    let subscription = connect(&source, &first).unwrap();
    assert!(subscription.is_active());
    assert_eq!(subscription.upstream(), source.id());
    assert_eq!(subscription.downstream(), first.id());

    assert!(matches!(
        connect(&source, &second),
        Err(ConnectError::AlreadySubscribed(id)) if id == source.id()
    ));

    subscription.cancel();
    assert!(!subscription.is_active());
    connect(&source, &second).unwrap();

    source.produce(7).unwrap();
    event_loop.run().unwrap();

    assert_eq!(second.consume().unwrap(), Consumed::Chunk(7));
    assert_eq!(first.buffered_len(), 0);
}

#[test]
fn test_connect_refuses_a_finished_downstream() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let source = Source::<u32>::new(&handle, objects(4)).unwrap();
    let sink = Sink::<u32>::manual(&handle, objects(4)).unwrap();
    sink.complete();

    assert!(matches!(
        connect(&source, &sink),
        Err(ConnectError::NotOpen { status: NodeStatus::Completed, .. })
    ));
}

#[test]
fn test_generator_pauses_at_the_high_water_mark() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let source = Source::from_iter(&handle, objects(3), 0..10u32).unwrap();
    let mut received = Vec::new();

    loop {
        match source.consume().unwrap_or(Consumed::End) {
            Consumed::Chunk(n) => received.push(n),
            Consumed::End => {
                if source.status() == NodeStatus::Completed {
                    break;
                }

                event_loop.run().unwrap();
                assert!(source.buffered_len() <= 3);
            }
        }
    }

    assert_eq!(received, (0..10u32).collect::<Vec<_>>());
}

#[test]
fn test_byte_mode_measures_chunk_length() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let source = Source::new(&handle, StreamOptions::bytes().high_water_mark(8)).unwrap();
    assert_eq!(source.high_water_mark(), 8);
    assert_eq!(source.low_water_mark(), 0);

    assert!(source.produce(Bytes::from_static(b"abcd")).unwrap());
    assert!(!source.produce(Bytes::from_static(b"efgh")).unwrap());
    assert_eq!(source.buffered_len(), 8);

    assert_eq!(
        source.consume().unwrap(),
        Consumed::Chunk(Bytes::from_static(b"abcd"))
    );
    assert_eq!(source.buffered_len(), 4);
}

#[test]
fn test_writer_error_fails_the_sink() {
    init_tracing();
    let event_loop = EventLoop::new();
    let handle = event_loop.handle();

    let sink = Sink::new(&handle, objects(4), |n: u32| {
        anyhow::ensure!(n < 2, "disk full");
        Ok(())
    })
    .unwrap();

    for n in 0..3 {
        sink.produce(n).unwrap();
    }
    event_loop.run().unwrap();

    assert_eq!(sink.status(), NodeStatus::Failed);
    assert!(sink.error().unwrap().to_string().contains("disk full"));
    assert_eq!(sink.buffered_len(), 0);
}

/// Drains a manual sink `batch` chunks per Check phase and returns the
/// largest total buffered across the pipeline, sampled between every
/// Poll-phase callback, along with the chunks the sink handed out.
fn peak_buffered(marks: [usize; 3], chunks: u32, batch: usize) -> (usize, Vec<u32>) {
    let event_loop = LoopBuilder::new().poll_batch_limit(16).build();
    let handle = event_loop.handle();

    let source = Source::from_iter(&handle, objects(marks[0]), 0..chunks).unwrap();
    let double = Transform::map(&handle, objects(marks[1]), |n: u32| n * 2).unwrap();
    let sink = Sink::<u32>::manual(&handle, objects(marks[2])).unwrap();

    let _done = Pipeline::new(&source)
        .pipe(&double)
        .unwrap()
        .to(&sink)
        .unwrap()
        .run();

    let peak = Rc::new(Cell::new(0));
    let received = Rc::new(RefCell::new(Vec::new()));

    let total = {
        let (source, double, sink) = (source.clone(), double.clone(), sink.clone());
        move || source.buffered_len() + double.buffered_len() + sink.buffered_len()
    };

    // Pumps run as Poll callbacks; this step lands between them.
    let (high, sample, watched) = (peak.clone(), total.clone(), sink.clone());
    handle
        .repeat(QueueId::Phase(Phase::Poll), move || {
            high.set(high.get().max(sample()));

            if watched.status().is_finished() {
                Step::Break
            } else {
                Step::Continue
            }
        })
        .unwrap();

    let (high, out) = (peak.clone(), received.clone());
    handle
        .repeat(QueueId::Phase(Phase::Check), move || {
            high.set(high.get().max(total()));

            for _ in 0..batch {
                match sink.consume() {
                    Ok(Consumed::Chunk(n)) => out.borrow_mut().push(n),
                    Ok(Consumed::End) | Err(_) if sink.status().is_finished() => {
                        return Step::Break;
                    }
                    Ok(Consumed::End) | Err(_) => break,
                }
            }

            Step::Continue
        })
        .unwrap();

    event_loop.run().unwrap();

    let received = received.borrow().clone();
    (peak.get(), received)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_pipeline_memory_is_bounded(
        source_mark in 1usize..8,
        transform_mark in 1usize..8,
        sink_mark in 1usize..8,
        chunks in 0u32..64,
        batch in 1usize..4,
    ) {
        let marks = [source_mark, transform_mark, sink_mark];
        let (peak, received) = peak_buffered(marks, chunks, batch);

        prop_assert!(peak <= marks.iter().sum::<usize>(), "peak {} over {:?}", peak, marks);
        prop_assert_eq!(received, (0..chunks).map(|n| n * 2).collect::<Vec<_>>());
    }
}
