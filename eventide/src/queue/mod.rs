//! Task queue primitives.
//!
//! Ordered FIFO queues holding deferred callbacks. Every phase of the
//! event loop and both microtask queues are backed by a
//! [`CallbackQueue`]; the entries they hold are homogeneous regardless of
//! which registration surface created them.

mod callback;
mod fifo;

pub(crate) use callback::{Callback, Entry, EntryState};
pub(crate) use fifo::CallbackQueue;

pub use callback::{CallbackHandle, CallbackId, IntoOutcome};
