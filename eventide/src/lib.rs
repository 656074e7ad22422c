//! # Eventide
//!
//! **Eventide** is a single-threaded cooperative event loop with a phased
//! macrotask cycle, a priority microtask drain and a backpressure-aware
//! streaming pipeline.
//!
//! The loop visits its phases in a fixed order: Timers, PendingCallbacks,
//! Poll, Check and Close. After every single callback it drains the
//! microtask queues: priority ticks first, then reactions, until both are
//! empty. It blocks only in the Poll phase, and only while a timer or an
//! I/O registration can still wake it.
//!
//! - **Timers** with FIFO tie-breaking, intervals and cancellation
//! - **Microtasks**: priority ticks and promise reactions
//! - An **I/O completion bridge** for collaborators on other threads
//! - A **worker pool** for CPU-bound work
//! - **Streams**: sources, transforms and sinks with high/low water marks
//! - **Macros**: `#[eventide::main]` and `#[eventide::test]`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use eventide::EventLoop;
//!
//! fn main() -> Result<(), eventide::error::LoopError> {
//!     let event_loop = EventLoop::new();
//!     let handle = event_loop.handle();
//!
//!     handle.schedule_tick(|| println!("A"))?;
//!     handle.schedule_reaction(|| println!("B"))?;
//!     handle.schedule_tick(|| println!("C"))?;
//!
//!     // Prints A, C, B.
//!     event_loop.run()
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: loop and stream configuration, TOML loading
//! - [`error`]: every error type
//! - [`stream`]: sources, transforms, sinks and pipelines

mod queue;
mod reactor;
mod runtime;
mod utils;

pub mod config;
pub mod error;
pub mod stream;

pub use queue::{CallbackHandle, CallbackId, IntoOutcome};
pub use reactor::{IntoDelay, IoCompletion, TimerHandle, WorkerPool};
pub use runtime::{
    DiagnosticHook, EventLoop, Handle, LoopBuilder, LoopStats, Phase, Promise, QueueId, Recovery,
    RepeatHandle, Resolver, Step, UncaughtHandler,
};

pub use eventide_macros::*;
