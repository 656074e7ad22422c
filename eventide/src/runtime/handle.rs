use super::core::Shared;
use super::phase::{Phase, QueueId};
use crate::config::LoopConfig;
use crate::error::{SchedulingError, TimerError};
use crate::queue::{Callback, CallbackHandle, Entry, IntoOutcome};
use crate::reactor::{IntoDelay, IoCompletion, TimerHandle};

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

/// A cheap, cloneable reference to an [`EventLoop`](super::EventLoop).
///
/// Handles do not keep the loop alive. Once the loop is torn down or
/// dropped, every scheduling method returns [`SchedulingError::TornDown`].
#[derive(Clone)]
pub struct Handle {
    shared: Weak<Shared>,
}

impl Handle {
    pub(crate) fn new(shared: Weak<Shared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> Result<Rc<Shared>, SchedulingError> {
        self.shared.upgrade().ok_or(SchedulingError::TornDown)
    }

    /// Appends `callback` to the tail of `queue`.
    ///
    /// `QueueId::Phase(Phase::Timers)` arms a zero-delay timer.
    pub fn enqueue<F, R>(&self, queue: QueueId, callback: F) -> Result<CallbackHandle, SchedulingError>
    where
        F: FnOnce() -> R + 'static,
        R: IntoOutcome,
    {
        let shared = self.shared()?;
        let (entry, handle) = Entry::new(Callback::once(callback));

        shared.push(queue, entry)?;
        Ok(handle)
    }

    /// Schedules a priority tick, run before any standard microtask.
    pub fn schedule_tick<F, R>(&self, callback: F) -> Result<CallbackHandle, SchedulingError>
    where
        F: FnOnce() -> R + 'static,
        R: IntoOutcome,
    {
        self.enqueue(QueueId::Tick, callback)
    }

    /// Schedules a standard microtask (a promise reaction).
    pub fn schedule_reaction<F, R>(&self, callback: F) -> Result<CallbackHandle, SchedulingError>
    where
        F: FnOnce() -> R + 'static,
        R: IntoOutcome,
    {
        self.enqueue(QueueId::Reaction, callback)
    }

    /// Schedules an immediate in the Check phase.
    pub fn schedule_check<F, R>(&self, callback: F) -> Result<CallbackHandle, SchedulingError>
    where
        F: FnOnce() -> R + 'static,
        R: IntoOutcome,
    {
        self.enqueue(QueueId::Phase(Phase::Check), callback)
    }

    /// Defers a callback to the PendingCallbacks phase of the next visit.
    pub fn schedule_pending<F, R>(&self, callback: F) -> Result<CallbackHandle, SchedulingError>
    where
        F: FnOnce() -> R + 'static,
        R: IntoOutcome,
    {
        self.enqueue(QueueId::Phase(Phase::PendingCallbacks), callback)
    }

    /// Schedules a close handler.
    pub fn schedule_close<F, R>(&self, callback: F) -> Result<CallbackHandle, SchedulingError>
    where
        F: FnOnce() -> R + 'static,
        R: IntoOutcome,
    {
        self.enqueue(QueueId::Phase(Phase::Close), callback)
    }

    pub(crate) fn schedule_poll<F, R>(&self, callback: F) -> Result<CallbackHandle, SchedulingError>
    where
        F: FnOnce() -> R + 'static,
        R: IntoOutcome,
    {
        self.enqueue(QueueId::Phase(Phase::Poll), callback)
    }

    /// Arms a timer.
    ///
    /// The callback first becomes eligible after `delay`. A repeating timer
    /// is re-armed with the same period right after each run; periods below
    /// [`LoopConfig::min_interval`] are raised to it.
    ///
    /// # Errors
    ///
    /// Negative, non-finite or overflowing delays are rejected, as is a
    /// torn-down loop.
    pub fn schedule<F, R, D>(&self, callback: F, delay: D, repeating: bool) -> Result<TimerHandle, TimerError>
    where
        F: FnMut() -> R + 'static,
        R: IntoOutcome,
        D: IntoDelay,
    {
        let delay = delay.into_delay()?;
        let shared = self.shared()?;

        let (delay, period) = if repeating {
            let period = delay.max(shared.config.min_interval());
            (period, Some(period))
        } else {
            (delay, None)
        };

        let deadline = Instant::now()
            .checked_add(delay)
            .ok_or(TimerError::Overflow(delay))?;

        let mut state = shared.state();
        if state.torn_down {
            return Err(SchedulingError::TornDown.into());
        }

        Ok(state
            .timers
            .insert(deadline, period, Callback::repeating(callback)))
    }

    /// Runs `callback` once after `delay`.
    pub fn set_timeout<F, R, D>(&self, callback: F, delay: D) -> Result<TimerHandle, TimerError>
    where
        F: FnOnce() -> R + 'static,
        R: IntoOutcome,
        D: IntoDelay,
    {
        let mut callback = Some(callback);

        self.schedule(
            move || callback.take().map(|f| f().into_outcome()).unwrap_or(Ok(())),
            delay,
            false,
        )
    }

    /// Runs `callback` every `period` until the returned handle is cancelled.
    pub fn set_interval<F, R, D>(&self, callback: F, period: D) -> Result<TimerHandle, TimerError>
    where
        F: FnMut() -> R + 'static,
        R: IntoOutcome,
        D: IntoDelay,
    {
        self.schedule(callback, period, true)
    }

    /// Registers an external operation with the I/O completion bridge.
    ///
    /// The loop stays alive, and may block in the Poll phase, until the
    /// returned [`IoCompletion`] is notified or dropped.
    pub fn register_io(&self, label: &str) -> Result<IoCompletion, SchedulingError> {
        let shared = self.shared()?;
        let mut state = shared.state();

        if state.torn_down {
            return Err(SchedulingError::TornDown);
        }

        Ok(state.bridge.register(label, None))
    }

    /// Registers an operation whose `Send` result is handed to a loop-local
    /// continuation in the Poll phase.
    ///
    /// Complete the registration with [`IoCompletion::complete`]; a payload
    /// of another type is reported as an uncaught error.
    pub fn register_io_with<T, F, R>(&self, label: &str, continuation: F) -> Result<IoCompletion, SchedulingError>
    where
        T: Send + 'static,
        F: FnOnce(T) -> R + 'static,
        R: IntoOutcome,
    {
        let shared = self.shared()?;
        let mut state = shared.state();

        if state.torn_down {
            return Err(SchedulingError::TornDown);
        }

        let expected = std::any::type_name::<T>();
        let continuation = Box::new(move |payload: Box<dyn Any + Send>| {
            let value = payload
                .downcast::<T>()
                .map_err(|_| anyhow::anyhow!("I/O completion payload is not a {expected}"))?;

            continuation(*value).into_outcome()
        });

        Ok(state.bridge.register(label, Some(continuation)))
    }

    /// Tears the loop down.
    ///
    /// The callback currently running finishes; everything still queued is
    /// dropped and later enqueues fail.
    pub fn stop(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.teardown();
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared
            .upgrade()
            .is_none_or(|shared| shared.is_torn_down())
    }

    /// Phase the loop is currently executing.
    pub fn phase(&self) -> Option<Phase> {
        self.shared.upgrade().and_then(|shared| shared.phase())
    }

    /// Configuration of the loop, or the default once it is gone.
    pub fn config(&self) -> LoopConfig {
        self.shared
            .upgrade()
            .map(|shared| shared.config.clone())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}
