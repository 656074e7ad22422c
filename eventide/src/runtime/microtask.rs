use super::phase::QueueId;
use crate::queue::{CallbackQueue, Entry};

/// The two prioritized microtask queues.
///
/// [`next`](Self::next) always prefers the priority-tick queue, so a tick
/// enqueued while standard microtasks are draining runs before the next
/// standard microtask.
#[derive(Default)]
pub(crate) struct MicrotaskQueues {
    tick: CallbackQueue,
    reaction: CallbackQueue,
}

impl MicrotaskQueues {
    pub(crate) fn push_tick(&mut self, entry: Entry) {
        self.tick.push(entry);
    }

    pub(crate) fn push_reaction(&mut self, entry: Entry) {
        self.reaction.push(entry);
    }

    /// Removes the next microtask to run together with the queue it came from.
    pub(crate) fn next(&mut self) -> Option<(QueueId, Entry)> {
        if let Some(entry) = self.tick.pop() {
            return Some((QueueId::Tick, entry));
        }

        self.reaction.pop().map(|entry| (QueueId::Reaction, entry))
    }

    /// Returns `true` when both queues are simultaneously empty.
    pub(crate) fn is_empty(&self) -> bool {
        self.tick.is_empty() && self.reaction.is_empty()
    }

    pub(crate) fn take_all(&mut self) -> Vec<Entry> {
        let mut all: Vec<Entry> = self.tick.take_all().into();
        all.extend(self.reaction.take_all());
        all
    }
}
