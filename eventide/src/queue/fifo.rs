use super::callback::Entry;

use std::collections::VecDeque;

/// An ordered FIFO queue of callbacks.
///
/// Cancelled entries stay in place until they reach the front; they are
/// skipped on dequeue and never count as pending work.
#[derive(Default)]
pub(crate) struct CallbackQueue {
    entries: VecDeque<Entry>,
}

impl CallbackQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Appends an entry to the tail.
    pub(crate) fn push(&mut self, entry: Entry) {
        self.entries.push_back(entry);
    }

    /// Removes the first live entry.
    pub(crate) fn pop(&mut self) -> Option<Entry> {
        while let Some(entry) = self.entries.pop_front() {
            if !entry.is_cancelled() {
                return Some(entry);
            }
        }

        None
    }

    /// Removes and returns every entry queued at the moment of the call.
    ///
    /// Entries pushed while the returned batch is processed are not part
    /// of it.
    pub(crate) fn dequeue_all_ready(&mut self) -> VecDeque<Entry> {
        let mut batch = std::mem::take(&mut self.entries);
        batch.retain(|entry| !entry.is_cancelled());
        batch
    }

    /// Returns `true` if no live entry is queued.
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.iter().all(Entry::is_cancelled)
    }

    /// Number of live entries.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_cancelled()).count()
    }

    /// Removes every entry without running it.
    pub(crate) fn take_all(&mut self) -> VecDeque<Entry> {
        std::mem::take(&mut self.entries)
    }
}
