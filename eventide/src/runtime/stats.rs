use super::phase::{Phase, QueueId};

use serde::Serialize;

/// Counters describing what a loop has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    /// Completed loop iterations (full Timers..Close cycles).
    pub loop_ticks: u64,

    /// Callbacks executed per phase, indexed like [`Phase::ALL`].
    pub phases: [u64; 5],

    /// Priority ticks executed.
    pub ticks: u64,

    /// Standard microtasks executed.
    pub reactions: u64,

    /// Callbacks that returned an error or panicked.
    pub uncaught: u64,
}

impl LoopStats {
    pub(crate) fn record(&mut self, queue: QueueId) {
        match queue {
            QueueId::Phase(phase) => self.phases[phase.index()] += 1,
            QueueId::Tick => self.ticks += 1,
            QueueId::Reaction => self.reactions += 1,
        }
    }

    /// Number of callbacks executed from `queue`.
    pub fn executed(&self, queue: QueueId) -> u64 {
        match queue {
            QueueId::Phase(phase) => self.phases[phase.index()],
            QueueId::Tick => self.ticks,
            QueueId::Reaction => self.reactions,
        }
    }

    /// Number of callbacks executed from every queue together.
    pub fn total_executed(&self) -> u64 {
        self.phases.iter().sum::<u64>() + self.ticks + self.reactions
    }

    /// Number of callbacks executed in `phase`.
    pub fn in_phase(&self, phase: Phase) -> u64 {
        self.phases[phase.index()]
    }
}
