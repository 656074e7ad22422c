use super::EventLoop;
use super::fatal::{Hooks, Recovery};
use crate::config::LoopConfig;
use crate::error::{ConfigError, UncaughtError};

use std::path::Path;
use std::time::Duration;

/// Builder for configuring and creating an event loop.
///
/// `LoopBuilder` collects the loop's tuning and its uncaught-error
/// handling before the loop exists, so that nothing can run under a
/// half-configured loop.
///
/// # Examples
///
/// ```rust,ignore
/// let event_loop = LoopBuilder::new()
///     .poll_batch_limit(64)
///     .uncaught_handler(|_| Recovery::Resume)
///     .build();
/// ```
pub struct LoopBuilder {
    /// Loop tuning.
    config: LoopConfig,

    /// Diagnostic hooks and the override handler.
    hooks: Hooks,
}

impl LoopBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: LoopConfig::default(),
            hooks: Hooks::default(),
        }
    }

    /// Starts from an existing configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field of `config`.
    pub fn from_config(config: LoopConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            config,
            hooks: Hooks::default(),
        })
    }

    /// Starts from a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_config(LoopConfig::load(path)?)
    }

    /// Sets how many Poll-phase callbacks run per visit.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn poll_batch_limit(mut self, n: usize) -> Self {
        assert!(n > 0, "poll_batch_limit must be > 0");

        self.config.poll_batch_limit = n;
        self
    }

    /// Logs a starvation warning once a single drain runs more than `n`
    /// microtasks.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn microtask_budget(mut self, n: usize) -> Self {
        assert!(n > 0, "microtask_budget must be > 0");

        self.config.microtask_budget = Some(n);
        self
    }

    /// Sets the shortest interval period; shorter periods are raised to it.
    pub fn min_interval(mut self, period: Duration) -> Self {
        self.config.min_interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Registers a hook observing every uncaught error.
    pub fn on_uncaught<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&UncaughtError) + 'static,
    {
        self.hooks.add_diagnostic(Box::new(hook));
        self
    }

    /// Installs the handler deciding whether the loop survives an
    /// uncaught error. Without one the loop fails fast.
    pub fn uncaught_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&UncaughtError) -> Recovery + 'static,
    {
        self.hooks.set_handler(Box::new(handler));
        self
    }

    /// Builds the loop with the configured options.
    pub fn build(self) -> EventLoop {
        EventLoop::with_parts(self.config, self.hooks)
    }
}

impl Default for LoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
