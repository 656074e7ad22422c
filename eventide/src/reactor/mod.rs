//! Timers and external completions.
//!
//! This module holds everything the loop waits on:
//! - the timer min-heap backing the Timers phase,
//! - the I/O completion bridge through which collaborators enqueue
//!   Poll-phase callbacks, possibly from other threads,
//! - the worker pool used to offload CPU-bound work.
//!
//! The core scheduler only consumes the bridge's `notify` contract; the
//! operations themselves are performed elsewhere.

mod bridge;
mod timer;
mod worker;

pub(crate) use bridge::{Bridge, Cleared};
pub(crate) use timer::{TimerEntry, TimerQueue};

pub use bridge::IoCompletion;
pub use timer::{IntoDelay, TimerHandle};
pub use worker::WorkerPool;
