//! Error types for the event loop and the streaming pipeline.
//!
//! Every failure mode has its own small type so that callers can match
//! on exactly what went wrong:
//!
//! - [`SchedulingError`]: enqueue on a torn-down loop,
//! - [`TimerError`]: invalid timer delay,
//! - [`StreamProduceError`] / [`StreamConsumeError`]: misuse of a stream node,
//! - [`PipelineFailure`]: a pipeline rejected because one node failed,
//! - [`UncaughtError`]: a callback returned an error or panicked,
//! - [`LoopError`]: everything [`EventLoop::run`](crate::EventLoop::run) can return.

use crate::runtime::{Phase, QueueId};
use crate::stream::{NodeId, NodeStatus};

use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use thiserror::Error;

/// Returned when work is submitted to an event loop that no longer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulingError {
    /// The loop was stopped, failed fast, or has been dropped.
    #[error("event loop has been torn down")]
    TornDown,
}

/// Returned when a timer cannot be armed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimerError {
    #[error("timer delay must not be negative (got {millis} ms)")]
    Negative { millis: f64 },

    #[error("timer delay must be a finite number of milliseconds")]
    NonFinite,

    #[error("timer delay of {0:?} overflows the monotonic clock")]
    Overflow(Duration),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
}

/// The reason a single callback did not complete normally.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The callback returned an error.
    #[error("callback returned an error: {0:#}")]
    Failed(anyhow::Error),

    /// The callback panicked; the payload message is kept when it is a string.
    #[error("callback panicked: {0}")]
    Panicked(String),
}

/// An error raised by a callback that nothing inside the callback handled.
///
/// Reported to every diagnostic hook and then to the override handler, if
/// one is installed. Without a handler the loop fails fast.
#[derive(Debug, Error)]
#[error("uncaught error in {queue} ({}): {error}", phase_label(.phase))]
pub struct UncaughtError {
    /// Phase the loop was in; `None` while draining the main script's microtasks.
    pub phase: Option<Phase>,

    /// Queue the failing callback was taken from.
    pub queue: QueueId,

    #[source]
    pub error: CallbackError,
}

fn phase_label(phase: &Option<Phase>) -> String {
    match phase {
        Some(phase) => format!("{phase} phase"),
        None => "before the first phase".to_string(),
    }
}

/// Invalid [`LoopConfig`](crate::config::LoopConfig) or
/// [`StreamOptions`](crate::config::StreamOptions).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("low water mark ({low}) must not exceed high water mark ({high})")]
    Marks { low: usize, high: usize },
}

/// Everything [`EventLoop::run`](crate::EventLoop::run) can fail with.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Uncaught(#[from] UncaughtError),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error("event loop is already running")]
    Reentrant,
}

/// A failure cause shared between the nodes of a pipeline.
///
/// Cloning is cheap: every node that the failure propagates to holds the
/// same underlying error, together with the node it originated from.
#[derive(Clone)]
pub struct NodeError {
    origin: NodeId,
    name: Rc<str>,
    cause: Rc<anyhow::Error>,
}

impl NodeError {
    pub(crate) fn new(origin: NodeId, name: Rc<str>, cause: anyhow::Error) -> Self {
        Self {
            origin,
            name,
            cause: Rc::new(cause),
        }
    }

    /// Node the failure started at.
    pub fn origin(&self) -> NodeId {
        self.origin
    }

    /// Name of the node the failure started at.
    pub fn origin_name(&self) -> &str {
        &self.name
    }

    /// The underlying cause.
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}

impl fmt::Debug for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeError")
            .field("origin", &self.origin)
            .field("name", &self.name)
            .field("cause", &self.cause)
            .finish()
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.cause)
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.source()
    }
}

/// `produce` was called on a node that no longer accepts chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot produce into stream node {node}: node is {status}")]
pub struct StreamProduceError {
    pub node: NodeId,
    pub status: NodeStatus,
}

/// `consume` could not return a chunk or end-of-stream.
#[derive(Debug, Clone, Error)]
pub enum StreamConsumeError {
    /// Nothing is buffered and the node has not completed; wait for
    /// [`on_readable`](crate::stream::Readable::on_readable).
    #[error("stream node {node} has no buffered data yet")]
    NotReady { node: NodeId },

    #[error("stream node {node} has failed: {error}")]
    Failed { node: NodeId, error: NodeError },
}

/// Connecting two nodes was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("stream node {0} already has a downstream subscriber")]
    AlreadySubscribed(NodeId),

    #[error("stream node {node} cannot be connected: node is {status}")]
    NotOpen { node: NodeId, status: NodeStatus },
}

/// A pipeline rejected because one of its nodes failed.
#[derive(Debug, Clone, Error)]
#[error("pipeline failed at node {node} ({name}): {error}")]
pub struct PipelineFailure {
    /// Node the failure originated at.
    pub node: NodeId,

    /// Name of that node.
    pub name: String,

    #[source]
    pub error: NodeError,
}

impl From<NodeError> for PipelineFailure {
    fn from(error: NodeError) -> Self {
        Self {
            node: error.origin(),
            name: error.origin_name().to_string(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncaught_error_names_queue_and_phase() {
        let err = UncaughtError {
            phase: Some(Phase::Check),
            queue: QueueId::Phase(Phase::Check),
            error: CallbackError::Panicked("boom".into()),
        };

        let text = err.to_string();
        assert!(text.contains("check"), "{text}");
        assert!(text.contains("boom"), "{text}");
    }

    #[test]
    fn pipeline_failure_keeps_origin() {
        let origin = NodeId::next();
        let error = NodeError::new(origin, Rc::from("parser"), anyhow::anyhow!("bad input"));
        let failure = PipelineFailure::from(error);

        assert_eq!(failure.node, origin);
        assert_eq!(failure.name, "parser");
        assert!(failure.to_string().contains("bad input"));
    }
}
