use super::flow::Flow;
use super::{Chunk, Consumed, FinishListener, NodeId, NodeKind, NodeStatus, Readable, Stage, Waker, Writable};
use crate::config::{Marks, StreamOptions};
use crate::error::{ConfigError, ConnectError, NodeError, StreamConsumeError, StreamProduceError};
use crate::runtime::Handle;

use tracing::{debug, trace};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

/// Emits the residual output of a transform once its input completed.
pub(crate) type FlushHook<T> = Box<dyn FnOnce(&NodeCore<T>) -> anyhow::Result<()>>;

struct NodeState<T> {
    buffer: VecDeque<T>,
    buffered: usize,
    status: NodeStatus,
    error: Option<NodeError>,

    /// Set when `produce` returned `false`; cleared when the drain signal fires.
    need_drain: bool,
    drain: Vec<Waker>,
    readable: Vec<Waker>,
    flow: Flow,
    finish: Vec<FinishListener>,
    flush: Option<FlushHook<T>>,

    upstream: Option<Weak<dyn Stage>>,
    downstream: Option<Weak<dyn Stage>>,
    subscribed: bool,
}

/// Buffer and state machine shared by every node kind.
///
/// The state is only borrowed for bookkeeping: wake callbacks, listeners
/// and user hooks are always invoked after the borrow ends.
pub(crate) struct NodeCore<T> {
    id: NodeId,
    name: RefCell<Rc<str>>,
    kind: NodeKind,
    marks: Marks,
    handle: Handle,
    state: RefCell<NodeState<T>>,
}

impl<T: Chunk> NodeCore<T> {
    pub(crate) fn new(handle: &Handle, kind: NodeKind, options: StreamOptions) -> Result<Self, ConfigError> {
        let marks = options.resolve(&handle.config())?;
        let id = NodeId::next();
        let name: Rc<str> = Rc::from(format!("{kind}{id}"));

        debug!(node = %id, %name, %kind, high = marks.high, low = marks.low, "stream node created");

        Ok(Self {
            id,
            name: RefCell::new(name),
            kind,
            marks,
            handle: handle.clone(),
            state: RefCell::new(NodeState {
                buffer: VecDeque::new(),
                buffered: 0,
                status: NodeStatus::Open,
                error: None,
                need_drain: false,
                drain: Vec::new(),
                readable: Vec::new(),
                flow: Flow::default(),
                finish: Vec::new(),
                flush: None,
                upstream: None,
                downstream: None,
                subscribed: false,
            }),
        })
    }

    pub(crate) fn rename(&self, name: &str) {
        *self.name.borrow_mut() = Rc::from(name);
    }

    pub(crate) fn set_flush(&self, flush: FlushHook<T>) {
        self.state.borrow_mut().flush = Some(flush);
    }

    pub(crate) fn high_water_mark(&self) -> usize {
        self.marks.high
    }

    pub(crate) fn low_water_mark(&self) -> usize {
        self.marks.low
    }

    fn measure(&self, chunk: &T) -> usize {
        if self.marks.object_mode {
            1
        } else {
            chunk.byte_len()
        }
    }

    /// Appends a chunk while the node is `Open` or `Completing`.
    ///
    /// Transforms use this for their own output, including during flush.
    pub(crate) fn push(&self, chunk: T) -> Result<(), StreamProduceError> {
        let wakers = {
            let mut state = self.state.borrow_mut();

            if state.status.is_finished() {
                return Err(StreamProduceError {
                    node: self.id,
                    status: state.status,
                });
            }

            state.buffered += self.measure(&chunk);
            state.buffer.push_back(chunk);
            trace!(node = %self.id, buffered = state.buffered, "chunk buffered");

            std::mem::take(&mut state.readable)
        };

        self.wake(wakers);
        Ok(())
    }

    /// Reports whether the buffer is below the high-water mark, arming the
    /// drain signal when it is not.
    pub(crate) fn pressure(&self) -> bool {
        let mut state = self.state.borrow_mut();

        if state.status == NodeStatus::Failed {
            return false;
        }

        let accepting = state.buffered < self.marks.high;
        if !accepting {
            state.need_drain = true;
        }

        accepting
    }

    pub(crate) fn check_open(&self) -> Result<(), StreamProduceError> {
        let status = self.state.borrow().status;

        match status {
            NodeStatus::Open => Ok(()),
            status => Err(StreamProduceError {
                node: self.id,
                status,
            }),
        }
    }

    /// Offers a chunk from outside the node.
    pub(crate) fn produce(&self, chunk: T) -> Result<bool, StreamProduceError> {
        self.check_open()?;
        self.push(chunk)?;
        Ok(self.pressure())
    }

    pub(crate) fn consume(&self) -> Result<Consumed<T>, StreamConsumeError> {
        let mut drained = Vec::new();
        let mut finished = Vec::new();

        let result = {
            let mut state = self.state.borrow_mut();

            if let Some(error) = &state.error {
                return Err(StreamConsumeError::Failed {
                    node: self.id,
                    error: error.clone(),
                });
            }

            match state.buffer.pop_front() {
                Some(chunk) => {
                    state.buffered = state.buffered.saturating_sub(self.measure(&chunk));

                    if state.need_drain && state.buffered <= self.marks.low {
                        state.need_drain = false;
                        drained = std::mem::take(&mut state.drain);
                        trace!(node = %self.id, buffered = state.buffered, "drain signal");
                    }

                    Ok(Consumed::Chunk(chunk))
                }
                None => match state.status {
                    NodeStatus::Completing => {
                        state.status = NodeStatus::Completed;
                        finished = self.finish_locked(&mut state);
                        Ok(Consumed::End)
                    }
                    NodeStatus::Completed => Ok(Consumed::End),
                    _ => Err(StreamConsumeError::NotReady { node: self.id }),
                },
            }
        };

        self.wake(drained);
        self.notify(finished, Ok(()));
        result
    }

    /// Marks the end of input; idempotent.
    ///
    /// A pending flush hook runs first, exactly once.
    pub(crate) fn complete(&self) {
        let flush = {
            let mut state = self.state.borrow_mut();

            if state.status != NodeStatus::Open {
                return;
            }

            state.status = NodeStatus::Completing;
            state.flush.take()
        };

        if let Some(flush) = flush {
            trace!(node = %self.id, "flushing");

            if let Err(cause) = flush(self) {
                self.fail(cause);
                return;
            }
        }

        let (readable, finished) = {
            let mut state = self.state.borrow_mut();

            if state.status != NodeStatus::Completing {
                return;
            }

            let finished = if state.buffer.is_empty() {
                state.status = NodeStatus::Completed;
                self.finish_locked(&mut state)
            } else {
                Vec::new()
            };

            debug!(node = %self.id, status = %state.status, "stream node completing");
            (std::mem::take(&mut state.readable), finished)
        };

        self.wake(readable);
        self.notify(finished, Ok(()));
    }

    pub(crate) fn fail(&self, cause: anyhow::Error) {
        self.fail_with(NodeError::new(self.id, Stage::name(self), cause));
    }

    /// Collects what a finished node no longer needs.
    fn finish_locked(&self, state: &mut NodeState<T>) -> Vec<FinishListener> {
        debug!(node = %self.id, name = %self.name.borrow(), "stream node completed");

        state.drain.clear();
        state.flow.clear();
        std::mem::take(&mut state.finish)
    }

    /// Schedules wake callbacks as priority ticks.
    fn wake(&self, wakers: Vec<Waker>) {
        for waker in wakers {
            if self.handle.schedule_tick(waker).is_err() {
                trace!(node = %self.id, "wake dropped by a torn-down loop");
            }
        }
    }

    fn notify(&self, listeners: Vec<FinishListener>, result: Result<(), NodeError>) {
        for listener in listeners {
            let result = result.clone();

            if self
                .handle
                .schedule_tick(move || listener(result))
                .is_err()
            {
                trace!(node = %self.id, "finish listener dropped by a torn-down loop");
            }
        }
    }
}

impl<T: Chunk> Stage for NodeCore<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> Rc<str> {
        self.name.borrow().clone()
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn status(&self) -> NodeStatus {
        self.state.borrow().status
    }

    fn error(&self) -> Option<NodeError> {
        self.state.borrow().error.clone()
    }

    fn buffered_len(&self) -> usize {
        self.state.borrow().buffered
    }

    fn fail_with(&self, error: NodeError) {
        let (released, neighbours, listeners) = {
            let mut state = self.state.borrow_mut();

            if state.status.is_finished() {
                return;
            }

            state.status = NodeStatus::Failed;
            state.error = Some(error.clone());
            state.buffered = 0;
            state.need_drain = false;
            state.flow.clear();

            let released = (
                std::mem::take(&mut state.buffer),
                std::mem::take(&mut state.drain),
                std::mem::take(&mut state.readable),
                state.flush.take(),
            );

            let neighbours = [state.upstream.take(), state.downstream.take()];
            (released, neighbours, std::mem::take(&mut state.finish))
        };

        debug!(node = %self.id, name = %self.name.borrow(), origin = %error.origin(), %error, "stream node failed");
        drop(released);

        for neighbour in neighbours.into_iter().flatten() {
            if let Some(neighbour) = neighbour.upgrade() {
                neighbour.fail_with(error.clone());
            }
        }

        self.notify(listeners, Err(error));
    }

    fn on_finish(&self, listener: FinishListener) {
        let result = {
            let mut state = self.state.borrow_mut();

            match state.status {
                NodeStatus::Completed => Ok(()),
                NodeStatus::Failed => state.error.clone().map_or(Ok(()), Err),
                NodeStatus::Open | NodeStatus::Completing => {
                    state.finish.push(listener);
                    return;
                }
            }
        };

        self.notify(vec![listener], result);
    }

    fn release(&self) {
        let released = {
            let mut state = self.state.borrow_mut();

            state.buffered = 0;
            state.need_drain = false;
            state.flow.clear();
            state.upstream = None;
            state.downstream = None;
            state.subscribed = false;

            (
                std::mem::take(&mut state.buffer),
                std::mem::take(&mut state.drain),
                std::mem::take(&mut state.readable),
                std::mem::take(&mut state.finish),
                state.flush.take(),
            )
        };

        trace!(node = %self.id, "stream node released");
        drop(released);
    }

    fn handle(&self) -> Handle {
        self.handle.clone()
    }

    fn link_upstream(&self, upstream: Weak<dyn Stage>) {
        self.state.borrow_mut().upstream = Some(upstream);
    }

    fn link_downstream(&self, downstream: Weak<dyn Stage>) {
        self.state.borrow_mut().downstream = Some(downstream);
    }

    fn unsubscribe(&self) {
        let mut state = self.state.borrow_mut();
        state.subscribed = false;
        state.downstream = None;
    }
}

impl<T: Chunk> Readable<T> for NodeCore<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn status(&self) -> NodeStatus {
        Stage::status(self)
    }

    fn consume(&self) -> Result<Consumed<T>, StreamConsumeError> {
        NodeCore::consume(self)
    }

    fn on_readable(&self, waker: Waker) {
        let ready = {
            let mut state = self.state.borrow_mut();

            if state.buffer.is_empty() && state.status == NodeStatus::Open {
                state.readable.push(waker);
                return;
            }

            waker
        };

        self.wake(vec![ready]);
    }

    fn pause(&self) {
        trace!(node = %self.id, "paused");
        self.state.borrow_mut().flow.pause();
    }

    fn resume(&self) {
        let wakers = self.state.borrow_mut().flow.resume();
        trace!(node = %self.id, waiting = wakers.len(), "resumed");
        self.wake(wakers);
    }

    fn is_flowing(&self) -> bool {
        self.state.borrow().flow.is_ready()
    }

    fn on_resume(&self, waker: Waker) {
        let ready = self.state.borrow_mut().flow.on_resume(waker);

        if let Some(waker) = ready {
            self.wake(vec![waker]);
        }
    }

    fn subscribe(&self) -> Result<(), ConnectError> {
        let mut state = self.state.borrow_mut();

        if state.status.is_finished() {
            return Err(ConnectError::NotOpen {
                node: self.id,
                status: state.status,
            });
        }

        if state.subscribed {
            return Err(ConnectError::AlreadySubscribed(self.id));
        }

        state.subscribed = true;
        Ok(())
    }
}

impl<T: Chunk> Writable<T> for NodeCore<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn status(&self) -> NodeStatus {
        Stage::status(self)
    }

    fn produce(&self, chunk: T) -> Result<bool, StreamProduceError> {
        NodeCore::produce(self, chunk)
    }

    fn on_drain(&self, waker: Waker) {
        let mut state = self.state.borrow_mut();

        if !state.status.is_finished() {
            state.drain.push(waker);
        }
    }

    fn complete(&self) {
        NodeCore::complete(self)
    }

    fn fail(&self, error: anyhow::Error) {
        NodeCore::fail(self, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::EventLoop;

    use std::cell::Cell;

    fn node(event_loop: &EventLoop, high: usize) -> NodeCore<u32> {
        NodeCore::new(
            &event_loop.handle(),
            NodeKind::Source,
            StreamOptions::object().high_water_mark(high),
        )
        .unwrap()
    }

    #[test]
    fn produce_reports_backpressure_at_the_high_water_mark() {
        let event_loop = EventLoop::new();
        let node = node(&event_loop, 2);

        assert!(node.produce(1).unwrap());
        assert!(!node.produce(2).unwrap());
        assert_eq!(node.buffered_len(), 2);
    }

    #[test]
    fn drain_fires_once_the_buffer_reaches_the_low_water_mark() {
        let event_loop = EventLoop::new();
        let node = node(&event_loop, 2);
        let drained = Rc::new(Cell::new(0));

        node.produce(1).unwrap();
        node.produce(2).unwrap();

        let counter = drained.clone();
        node.on_drain(Box::new(move || counter.set(counter.get() + 1)));

        node.consume().unwrap();
        event_loop.run().unwrap();
        assert_eq!(drained.get(), 0);

        node.consume().unwrap();
        event_loop.run().unwrap();
        assert_eq!(drained.get(), 1);
    }

    #[test]
    fn complete_on_empty_node_finishes_immediately() {
        let event_loop = EventLoop::new();
        let node = node(&event_loop, 4);

        node.complete();
        assert_eq!(Stage::status(&node), NodeStatus::Completed);
        assert_eq!(node.consume().unwrap(), Consumed::End);
        assert!(node.produce(1).is_err());
    }

    #[test]
    fn buffered_chunks_are_consumed_before_end() {
        let event_loop = EventLoop::new();
        let node = node(&event_loop, 4);

        node.produce(7).unwrap();
        node.complete();
        assert_eq!(Stage::status(&node), NodeStatus::Completing);

        assert_eq!(node.consume().unwrap(), Consumed::Chunk(7));
        assert_eq!(node.consume().unwrap(), Consumed::End);
        assert_eq!(Stage::status(&node), NodeStatus::Completed);
    }

    #[test]
    fn failure_releases_the_buffer() {
        let event_loop = EventLoop::new();
        let node = node(&event_loop, 4);

        node.produce(1).unwrap();
        node.fail(anyhow::anyhow!("broken"));

        assert_eq!(node.buffered_len(), 0);
        assert!(matches!(node.consume(), Err(StreamConsumeError::Failed { .. })));
        assert!(node.produce(2).is_err());
    }
}
