use crate::error::TimerError;
use crate::queue::{Callback, CallbackId, EntryState};

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Conversion into a timer delay.
///
/// Integers and floats are milliseconds. Negative or non-finite values
/// are rejected with a [`TimerError`].
pub trait IntoDelay {
    fn into_delay(self) -> Result<Duration, TimerError>;
}

impl IntoDelay for Duration {
    fn into_delay(self) -> Result<Duration, TimerError> {
        Ok(self)
    }
}

impl IntoDelay for u32 {
    fn into_delay(self) -> Result<Duration, TimerError> {
        Ok(Duration::from_millis(self.into()))
    }
}

impl IntoDelay for u64 {
    fn into_delay(self) -> Result<Duration, TimerError> {
        Ok(Duration::from_millis(self))
    }
}

impl IntoDelay for i32 {
    fn into_delay(self) -> Result<Duration, TimerError> {
        i64::from(self).into_delay()
    }
}

impl IntoDelay for i64 {
    fn into_delay(self) -> Result<Duration, TimerError> {
        u64::try_from(self)
            .map(Duration::from_millis)
            .map_err(|_| TimerError::Negative {
                millis: self as f64,
            })
    }
}

impl IntoDelay for f64 {
    fn into_delay(self) -> Result<Duration, TimerError> {
        if !self.is_finite() {
            return Err(TimerError::NonFinite);
        }

        if self < 0.0 {
            return Err(TimerError::Negative { millis: self });
        }

        Duration::try_from_secs_f64(self / 1000.0).map_err(|_| TimerError::NonFinite)
    }
}

/// An entry in the timer queue.
///
/// `TimerEntry` represents a callback scheduled at a specific deadline.
/// Entries are stored in a binary heap ordered by deadline, with ties
/// broken by insertion order.
pub(crate) struct TimerEntry {
    /// Identifier shared with the [`TimerHandle`].
    pub(crate) id: CallbackId,

    /// The time at which the timer becomes eligible.
    pub(crate) deadline: Instant,

    /// Insertion sequence; earlier registrations fire first on equal deadlines.
    pub(crate) seq: u64,

    /// Re-arm period of interval timers.
    pub(crate) period: Option<Duration>,

    pub(crate) callback: Callback,

    /// Lifecycle shared with the [`TimerHandle`].
    pub(crate) state: Rc<Cell<EntryState>>,
}

impl TimerEntry {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.get() == EntryState::Cancelled
    }
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline, then insertion order.
    ///
    /// The comparison is **reversed** so that a `BinaryHeap<TimerEntry>`
    /// behaves as a min-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of armed timers.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arms a new timer and returns its handle.
    pub(crate) fn insert(
        &mut self,
        deadline: Instant,
        period: Option<Duration>,
        callback: Callback,
    ) -> TimerHandle {
        let id = CallbackId::next();
        let state = Rc::new(Cell::new(EntryState::Pending));

        self.push(TimerEntry {
            id,
            deadline,
            seq: 0,
            period,
            callback,
            state: state.clone(),
        });

        TimerHandle {
            id,
            state,
            repeating: period.is_some(),
        }
    }

    /// Re-inserts an entry, giving it a fresh insertion sequence.
    pub(crate) fn push(&mut self, mut entry: TimerEntry) {
        entry.seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(entry);
    }

    /// Removes every live entry whose deadline is at or before `now`, in
    /// firing order.
    pub(crate) fn take_due(&mut self, now: Instant) -> Vec<TimerEntry> {
        let mut due = Vec::new();

        while let Some(timer) = self.heap.peek() {
            if timer.deadline > now {
                break;
            }

            if let Some(timer) = self.heap.pop() {
                if !timer.is_cancelled() {
                    due.push(timer);
                }
            }
        }

        due
    }

    /// Deadline of the earliest live timer.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        self.purge_cancelled_head();
        self.heap.peek().map(|t| t.deadline)
    }

    /// Returns `true` if a live timer is armed.
    pub(crate) fn has_live(&mut self) -> bool {
        self.heap.retain(|t| !t.is_cancelled());
        !self.heap.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.heap.iter().filter(|t| !t.is_cancelled()).count()
    }

    /// Removes every timer without running it.
    pub(crate) fn take_all(&mut self) -> Vec<TimerEntry> {
        std::mem::take(&mut self.heap).into_vec()
    }

    fn purge_cancelled_head(&mut self) {
        while self.heap.peek().is_some_and(TimerEntry::is_cancelled) {
            self.heap.pop();
        }
    }
}

/// Handle to an armed timer.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: CallbackId,
    state: Rc<Cell<EntryState>>,
    repeating: bool,
}

impl TimerHandle {
    pub fn id(&self) -> CallbackId {
        self.id
    }

    pub fn is_repeating(&self) -> bool {
        self.repeating
    }

    /// Cancels the timer.
    ///
    /// A pending timer never fires. An interval cancelled from inside its
    /// own callback is not re-armed. Cancelling a one-shot timer that
    /// already fired is a no-op and returns `false`.
    pub fn cancel(&self) -> bool {
        match self.state.get() {
            EntryState::Pending => {
                self.state.set(EntryState::Cancelled);
                true
            }
            EntryState::Running if self.repeating => {
                self.state.set(EntryState::Cancelled);
                true
            }
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.get() == EntryState::Cancelled
    }

    /// Returns `true` once a one-shot timer has fired.
    pub fn has_fired(&self) -> bool {
        self.state.get() == EntryState::Done
    }
}
