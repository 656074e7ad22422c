//! Backpressure-aware streaming.
//!
//! A pipeline is a chain of nodes: one [`Source`], any number of
//! [`Transform`]s and one [`Sink`]. Every node buffers chunks up to its
//! high-water mark. [`connect`] moves chunks between two nodes in
//! Poll-phase callbacks and stops as soon as the downstream node reports
//! backpressure, resuming when its drain signal fires. With one-to-one
//! transforms the chunks buffered across a pipeline never exceed the sum
//! of the nodes' high-water marks.
//!
//! A failure anywhere fails every connected node: it travels upstream and
//! downstream synchronously, and each node releases its buffer and wake
//! callbacks.

/// Inherent accessors shared by the node wrappers.
macro_rules! node_accessors {
    ($($core:ident).+) => {
        pub fn id(&self) -> $crate::stream::NodeId {
            $crate::stream::Stage::id(&*self.$($core).+)
        }

        pub fn name(&self) -> std::rc::Rc<str> {
            $crate::stream::Stage::name(&*self.$($core).+)
        }

        /// Renames the node; the name shows up in logs and failures.
        pub fn named(self, name: &str) -> Self {
            self.$($core).+.rename(name);
            self
        }

        pub fn kind(&self) -> $crate::stream::NodeKind {
            $crate::stream::Stage::kind(&*self.$($core).+)
        }

        pub fn status(&self) -> $crate::stream::NodeStatus {
            $crate::stream::Stage::status(&*self.$($core).+)
        }

        /// The failure the node ended with, if any.
        pub fn error(&self) -> Option<$crate::error::NodeError> {
            $crate::stream::Stage::error(&*self.$($core).+)
        }

        /// Measured size of the buffer.
        pub fn buffered_len(&self) -> usize {
            $crate::stream::Stage::buffered_len(&*self.$($core).+)
        }

        pub fn high_water_mark(&self) -> usize {
            self.$($core).+.high_water_mark()
        }

        pub fn low_water_mark(&self) -> usize {
            self.$($core).+.low_water_mark()
        }

        /// Calls `listener` (as a priority tick) once the node completed or failed.
        pub fn on_finish<F>(&self, listener: F)
        where
            F: FnOnce(Result<(), $crate::error::NodeError>) + 'static,
        {
            $crate::stream::Stage::on_finish(&*self.$($core).+, Box::new(listener))
        }
    };
}

mod chunk;
mod flow;
mod node;
mod pipeline;
mod sink;
mod source;
mod transform;

pub use chunk::Chunk;
pub use flow::{Flow, FlowState};
pub use pipeline::{Pipeline, RunnablePipeline, Subscription, connect, run_pipeline};
pub use sink::Sink;
pub use source::Source;
pub use transform::{Emitter, Transform};

use crate::error::{NodeError, StreamConsumeError, StreamProduceError};

use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// A wake callback registered with a node.
pub type Waker = Box<dyn FnOnce()>;

/// Called once with the way a node finished.
pub type FinishListener = Box<dyn FnOnce(Result<(), NodeError>)>;

/// Process-unique identifier of a stream node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Source,
    Transform,
    Sink,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Source => "source",
            NodeKind::Transform => "transform",
            NodeKind::Sink => "sink",
        })
    }
}

/// Lifecycle of a stream node.
///
/// `Open -> Completing -> Completed` once no more chunks will be produced
/// and the buffer has been consumed; any state but `Completed` can move to
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    Open,
    Completing,
    Completed,
    Failed,
}

impl NodeStatus {
    /// `Completed` and `Failed` are final.
    pub fn is_finished(self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Failed)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeStatus::Open => "open",
            NodeStatus::Completing => "completing",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
        })
    }
}

/// Result of a successful [`Readable::consume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumed<T> {
    Chunk(T),
    /// The node completed and its buffer is exhausted.
    End,
}

/// Type-erased view of a node, used for lifecycle and failure propagation.
pub trait Stage {
    fn id(&self) -> NodeId;

    fn name(&self) -> Rc<str>;

    fn kind(&self) -> NodeKind;

    fn status(&self) -> NodeStatus;

    /// The failure this node ended with, if any.
    fn error(&self) -> Option<NodeError>;

    /// Measured size of the buffer (chunks in object mode, bytes otherwise).
    fn buffered_len(&self) -> usize;

    /// Fails the node with an error that may have started elsewhere.
    fn fail_with(&self, error: NodeError);

    /// Registers a listener for completion or failure.
    fn on_finish(&self, listener: FinishListener);

    /// Drops buffered chunks, wake callbacks, listeners and links.
    fn release(&self);

    /// Loop the node schedules its callbacks on.
    fn handle(&self) -> crate::runtime::Handle;

    #[doc(hidden)]
    fn link_upstream(&self, upstream: Weak<dyn Stage>);

    #[doc(hidden)]
    fn link_downstream(&self, downstream: Weak<dyn Stage>);

    #[doc(hidden)]
    fn unsubscribe(&self);
}

/// The output side of a node.
pub trait Readable<T> {
    fn id(&self) -> NodeId;

    fn status(&self) -> NodeStatus;

    /// Takes the next chunk, or `End` once the node has completed.
    fn consume(&self) -> Result<Consumed<T>, StreamConsumeError>;

    /// Calls `waker` (as a priority tick) once data or end-of-stream is
    /// available.
    fn on_readable(&self, waker: Waker);

    fn pause(&self);

    fn resume(&self);

    fn is_flowing(&self) -> bool;

    /// Calls `waker` (as a priority tick) the next time the node resumes.
    fn on_resume(&self, waker: Waker);

    #[doc(hidden)]
    fn subscribe(&self) -> Result<(), crate::error::ConnectError>;
}

/// The input side of a node.
pub trait Writable<T> {
    fn id(&self) -> NodeId;

    fn status(&self) -> NodeStatus;

    /// Offers a chunk; `false` asks the producer to pause.
    fn produce(&self, chunk: T) -> Result<bool, StreamProduceError>;

    /// Calls `waker` once after backpressure has cleared.
    fn on_drain(&self, waker: Waker);

    /// No more chunks will be produced.
    fn complete(&self);

    fn fail(&self, error: anyhow::Error);
}

/// Anything that is a pipeline node.
pub trait AsStage {
    fn stage(&self) -> Rc<dyn Stage>;
}

/// A node whose output can be connected downstream.
pub trait IntoReadable<T>: AsStage {
    fn readable(&self) -> Rc<dyn Readable<T>>;
}

/// A node whose input can be connected upstream.
pub trait IntoWritable<T>: AsStage {
    fn writable(&self) -> Rc<dyn Writable<T>>;
}
