use super::{Consumed, IntoReadable, IntoWritable, NodeId, NodeStatus, Readable, Stage, Writable};
use crate::error::{ConnectError, NodeError, PipelineFailure, StreamConsumeError};
use crate::runtime::{Handle, Promise};

use tracing::{debug, trace};

use std::cell::Cell;
use std::rc::Rc;

/// A live link between two nodes.
///
/// Dropping the subscription does not stop the flow; call
/// [`cancel`](Self::cancel) for that.
pub struct Subscription {
    upstream: Rc<dyn Stage>,
    downstream: NodeId,
    active: Rc<Cell<bool>>,
}

impl Subscription {
    pub fn upstream(&self) -> NodeId {
        self.upstream.id()
    }

    pub fn downstream(&self) -> NodeId {
        self.downstream
    }

    /// Returns `true` until the upstream ended, a node failed, or the
    /// subscription was cancelled.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Stops moving chunks and frees the upstream node for another subscriber.
    pub fn cancel(&self) {
        if self.active.replace(false) {
            debug!(upstream = %self.upstream.id(), downstream = %self.downstream, "subscription cancelled");
            self.upstream.unsubscribe();
        }
    }
}

/// Connects `upstream`'s output to `downstream`'s input.
///
/// Chunks move in Poll-phase callbacks. The pump stops on backpressure,
/// pausing `upstream` until `downstream` drains, and completes
/// `downstream` once `upstream` ends. A node has at most one downstream
/// subscriber.
pub fn connect<T, U, D>(upstream: &U, downstream: &D) -> Result<Subscription, ConnectError>
where
    T: 'static,
    U: IntoReadable<T> + ?Sized,
    D: IntoWritable<T> + ?Sized,
{
    link(
        upstream.readable(),
        upstream.stage(),
        downstream.writable(),
        downstream.stage(),
    )
}

fn link<T: 'static>(
    upstream: Rc<dyn Readable<T>>,
    upstream_stage: Rc<dyn Stage>,
    downstream: Rc<dyn Writable<T>>,
    downstream_stage: Rc<dyn Stage>,
) -> Result<Subscription, ConnectError> {
    let status = downstream.status();
    if status != NodeStatus::Open {
        return Err(ConnectError::NotOpen {
            node: downstream.id(),
            status,
        });
    }

    upstream.subscribe()?;

    upstream_stage.link_downstream(Rc::downgrade(&downstream_stage));
    downstream_stage.link_upstream(Rc::downgrade(&upstream_stage));

    debug!(upstream = %upstream.id(), downstream = %downstream.id(), "stream nodes connected");

    let active = Rc::new(Cell::new(true));
    let pump = Rc::new(Pump {
        handle: upstream_stage.handle(),
        upstream,
        downstream,
        active: active.clone(),
        scheduled: Cell::new(false),
    });
    pump.schedule();

    Ok(Subscription {
        downstream: downstream_stage.id(),
        upstream: upstream_stage,
        active,
    })
}

/// Moves chunks across one subscription.
struct Pump<T> {
    upstream: Rc<dyn Readable<T>>,
    downstream: Rc<dyn Writable<T>>,
    handle: Handle,
    active: Rc<Cell<bool>>,
    scheduled: Cell<bool>,
}

impl<T: 'static> Pump<T> {
    fn schedule(self: &Rc<Self>) {
        if !self.active.get() || self.scheduled.replace(true) {
            return;
        }

        let pump = self.clone();

        if self.handle.schedule_poll(move || pump.run()).is_err() {
            self.active.set(false);
        }
    }

    fn run(self: &Rc<Self>) {
        self.scheduled.set(false);

        while self.active.get() {
            // Resuming reschedules the pump.
            if !self.upstream.is_flowing() {
                return;
            }

            if self.downstream.status() != NodeStatus::Open {
                self.active.set(false);
                return;
            }

            match self.upstream.consume() {
                Ok(Consumed::Chunk(chunk)) => match self.downstream.produce(chunk) {
                    Ok(true) => {}
                    Ok(false) => {
                        trace!(upstream = %self.upstream.id(), downstream = %self.downstream.id(), "backpressure");
                        self.pause();
                        return;
                    }
                    Err(_) => {
                        self.active.set(false);
                        return;
                    }
                },
                Ok(Consumed::End) => {
                    self.active.set(false);
                    self.downstream.complete();
                    return;
                }
                Err(StreamConsumeError::NotReady { .. }) => {
                    let pump = self.clone();
                    self.upstream.on_readable(Box::new(move || pump.schedule()));
                    return;
                }
                Err(StreamConsumeError::Failed { .. }) => {
                    self.active.set(false);
                    return;
                }
            }
        }
    }

    /// Stops pulling until the downstream node drains.
    fn pause(self: &Rc<Self>) {
        self.upstream.pause();

        let pump = self.clone();
        self.upstream.on_resume(Box::new(move || pump.schedule()));

        let upstream = self.upstream.clone();
        self.downstream.on_drain(Box::new(move || upstream.resume()));
    }
}

/// A pipeline under construction: a source followed by transforms.
///
/// # Examples
///
/// ```rust,ignore
/// let done = Pipeline::new(&source)
///     .pipe(&Transform::lines(&handle, StreamOptions::object())?)?
///     .to(&sink)?
///     .run();
///
/// done.then(|result| println!("{result:?}"))?;
/// ```
pub struct Pipeline<T> {
    handle: Handle,
    stages: Vec<Rc<dyn Stage>>,
    tail: Rc<dyn Readable<T>>,
    tail_stage: Rc<dyn Stage>,
}

impl<T: 'static> Pipeline<T> {
    pub fn new<S>(source: &S) -> Self
    where
        S: IntoReadable<T> + ?Sized,
    {
        let stage = source.stage();

        Self {
            handle: stage.handle(),
            stages: vec![stage.clone()],
            tail: source.readable(),
            tail_stage: stage,
        }
    }

    /// Appends a node that reads `T` and emits `O`.
    pub fn pipe<O, X>(mut self, next: &X) -> Result<Pipeline<O>, ConnectError>
    where
        O: 'static,
        X: IntoWritable<T> + IntoReadable<O> + ?Sized,
    {
        let stage = next.stage();

        link(self.tail, self.tail_stage, next.writable(), stage.clone())?;
        self.stages.push(stage.clone());

        Ok(Pipeline {
            handle: self.handle,
            stages: self.stages,
            tail: next.readable(),
            tail_stage: stage,
        })
    }

    /// Terminates the pipeline with `sink`.
    pub fn to<S>(mut self, sink: &S) -> Result<RunnablePipeline, ConnectError>
    where
        S: IntoWritable<T> + ?Sized,
    {
        let stage = sink.stage();

        link(self.tail, self.tail_stage, sink.writable(), stage.clone())?;
        self.stages.push(stage);

        Ok(RunnablePipeline {
            handle: self.handle,
            stages: self.stages,
        })
    }
}

/// A fully connected pipeline.
pub struct RunnablePipeline {
    handle: Handle,
    stages: Vec<Rc<dyn Stage>>,
}

impl RunnablePipeline {
    /// Node ids from source to sink.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.stages.iter().map(|stage| stage.id()).collect()
    }

    /// Returns a promise settled when the sink completes, or with the
    /// first failure of any node.
    ///
    /// Every node is released before the promise settles.
    pub fn run(self) -> Promise<Result<(), PipelineFailure>> {
        let (promise, resolver) = Promise::new(&self.handle);
        let stages: Rc<[Rc<dyn Stage>]> = self.stages.into();
        let sink = stages.len().saturating_sub(1);

        debug!(nodes = stages.len(), "pipeline running");

        for (index, stage) in stages.iter().enumerate() {
            trace!(node = %stage.id(), kind = %stage.kind(), position = index, "pipeline stage");

            let resolver = resolver.clone();
            let all = stages.clone();

            stage.on_finish(Box::new(move |result: Result<(), NodeError>| {
                let outcome = match result {
                    Ok(()) if index == sink => Ok(()),
                    Ok(()) => return,
                    Err(error) => Err(PipelineFailure::from(error)),
                };

                if resolver.is_settled() {
                    return;
                }

                match &outcome {
                    Ok(()) => debug!("pipeline completed"),
                    Err(failure) => debug!(%failure, "pipeline failed"),
                }

                for stage in all.iter() {
                    stage.release();
                }

                resolver.resolve(outcome);
            }));
        }

        promise
    }
}

/// Runs a connected pipeline; see [`RunnablePipeline::run`].
pub fn run_pipeline(pipeline: RunnablePipeline) -> Promise<Result<(), PipelineFailure>> {
    pipeline.run()
}
