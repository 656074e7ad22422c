use serde::{Deserialize, Serialize};

use std::fmt;

/// A named stage of the macrotask loop.
///
/// Phases are visited in the fixed cyclic order of [`Phase::ALL`]; one full
/// cycle is one tick of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Expired one-shot and interval timers.
    Timers,
    /// Callbacks deferred to the next loop iteration.
    PendingCallbacks,
    /// I/O completions and stream pumping.
    Poll,
    /// Immediates scheduled with [`Handle::schedule_check`](crate::Handle::schedule_check).
    Check,
    /// Close handlers.
    Close,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Timers,
        Phase::PendingCallbacks,
        Phase::Poll,
        Phase::Check,
        Phase::Close,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            Phase::Timers => 0,
            Phase::PendingCallbacks => 1,
            Phase::Poll => 2,
            Phase::Check => 3,
            Phase::Close => 4,
        }
    }

    /// The phase visited after this one.
    pub fn next(self) -> Phase {
        Phase::ALL[(self.index() + 1) % Phase::ALL.len()]
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Timers => "timers",
            Phase::PendingCallbacks => "pending callbacks",
            Phase::Poll => "poll",
            Phase::Check => "check",
            Phase::Close => "close",
        };

        f.write_str(name)
    }
}

/// Names one of the loop's queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueId {
    /// The queue backing a macrotask phase.
    Phase(Phase),
    /// The priority-tick microtask queue.
    Tick,
    /// The standard microtask (reaction) queue.
    Reaction,
}

impl From<Phase> for QueueId {
    fn from(phase: Phase) -> Self {
        QueueId::Phase(phase)
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueId::Phase(phase) => write!(f, "{phase} queue"),
            QueueId::Tick => f.write_str("priority-tick queue"),
            QueueId::Reaction => f.write_str("microtask queue"),
        }
    }
}
