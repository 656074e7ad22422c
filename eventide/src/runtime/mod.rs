//! The event loop.
//!
//! This module contains the phase scheduler and everything callbacks use
//! to talk to it.
//!
//! It is responsible for:
//! - cycling through the phases in [`Phase::ALL`] order,
//! - draining priority ticks and reactions after every callback,
//! - blocking in the Poll phase while I/O is outstanding,
//! - turning callback errors into uncaught errors and applying recovery.
//!
//! Code outside the loop schedules work through a [`Handle`].

mod core;
mod handle;
mod microtask;
mod phase;
mod stats;

pub(crate) mod builder;
pub(crate) mod fatal;
pub(crate) mod promise;
pub(crate) mod repeat;

pub use self::core::EventLoop;
pub use builder::LoopBuilder;
pub use fatal::{DiagnosticHook, Recovery, UncaughtHandler};
pub use handle::Handle;
pub use phase::{Phase, QueueId};
pub use promise::{Promise, Resolver};
pub use repeat::{RepeatHandle, Step};
pub use stats::LoopStats;
