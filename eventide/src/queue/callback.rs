use crate::error::CallbackError;

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Converts the return value of a callback into its outcome.
///
/// Callbacks may return `()` or any `Result<(), E>` whose error converts
/// into [`anyhow::Error`]; an `Err` is reported as an uncaught error.
pub trait IntoOutcome {
    fn into_outcome(self) -> anyhow::Result<()>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> IntoOutcome for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_outcome(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

/// Process-unique identifier of a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Lifecycle of a scheduled entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    /// Queued, not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Executed; one-shot entries stay here.
    Done,
    /// Cancelled before it started (or, for intervals, before the next run).
    Cancelled,
}

/// A unit of work with a single `execute` capability.
///
/// One-shot and repeating callbacks are stored the same way so that every
/// queue holds homogeneous entries regardless of the registration surface.
pub(crate) struct Callback {
    run: Box<dyn FnMut() -> anyhow::Result<()>>,
}

impl Callback {
    /// Wraps a callback that runs at most once.
    pub(crate) fn once<F, R>(f: F) -> Self
    where
        F: FnOnce() -> R + 'static,
        R: IntoOutcome,
    {
        let mut f = Some(f);

        Self {
            run: Box::new(move || match f.take() {
                Some(f) => f().into_outcome(),
                None => Ok(()),
            }),
        }
    }

    /// Wraps a callback that may run many times (intervals).
    pub(crate) fn repeating<F, R>(mut f: F) -> Self
    where
        F: FnMut() -> R + 'static,
        R: IntoOutcome,
    {
        Self {
            run: Box::new(move || f().into_outcome()),
        }
    }

    /// Runs the callback, turning a returned error or a panic into a
    /// [`CallbackError`].
    pub(crate) fn execute(&mut self) -> Result<(), CallbackError> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.run)())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(CallbackError::Failed(err)),
            Err(payload) => Err(CallbackError::Panicked(panic_message(payload))),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A queued callback together with its shared lifecycle cell.
pub(crate) struct Entry {
    pub(crate) id: CallbackId,
    pub(crate) callback: Callback,
    pub(crate) state: Rc<Cell<EntryState>>,
}

impl Entry {
    pub(crate) fn new(callback: Callback) -> (Self, CallbackHandle) {
        let id = CallbackId::next();
        let state = Rc::new(Cell::new(EntryState::Pending));

        let handle = CallbackHandle {
            id,
            state: state.clone(),
        };

        (
            Self {
                id,
                callback,
                state,
            },
            handle,
        )
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.get() == EntryState::Cancelled
    }

    /// Marks the entry as running; returns `false` if it was cancelled.
    pub(crate) fn begin(&self) -> bool {
        if self.state.get() != EntryState::Pending {
            return false;
        }

        self.state.set(EntryState::Running);
        true
    }

    pub(crate) fn finish(&self) {
        if self.state.get() == EntryState::Running {
            self.state.set(EntryState::Done);
        }
    }
}

/// Handle to a callback scheduled on one of the loop's queues.
///
/// The handle can cancel the callback as long as it has not started.
#[derive(Debug, Clone)]
pub struct CallbackHandle {
    id: CallbackId,
    state: Rc<Cell<EntryState>>,
}

impl CallbackHandle {
    pub fn id(&self) -> CallbackId {
        self.id
    }

    /// Cancels the callback.
    ///
    /// Returns `true` if the callback will no longer run. Cancelling a
    /// callback that already started or finished is a no-op.
    pub fn cancel(&self) -> bool {
        if self.state.get() == EntryState::Pending {
            self.state.set(EntryState::Cancelled);
            return true;
        }

        false
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.get() == EntryState::Cancelled
    }

    /// Returns `true` once the callback has run.
    pub fn is_done(&self) -> bool {
        self.state.get() == EntryState::Done
    }
}
