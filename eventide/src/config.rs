//! Loop and stream configuration.
//!
//! Both [`LoopConfig`] and [`StreamOptions`] can be built in code or read
//! from TOML. Every field has a default, so a configuration file only
//! needs the keys it changes:
//!
//! ```toml
//! poll_batch_limit = 256
//! microtask_budget = 100000
//! min_interval_ms = 1
//! object_high_water_mark = 16
//! byte_high_water_mark = 16384
//! ```

use crate::error::ConfigError;

use serde::{Deserialize, Serialize};

use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default number of Poll-phase callbacks executed per visit.
pub const DEFAULT_POLL_BATCH_LIMIT: usize = 1024;

/// Default high-water mark of object-mode streams, in chunks.
pub const DEFAULT_OBJECT_HIGH_WATER_MARK: usize = 16;

/// Default high-water mark of byte streams, in bytes.
pub const DEFAULT_BYTE_HIGH_WATER_MARK: usize = 16 * 1024;

/// Default minimum period of interval timers, in milliseconds.
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 1;

/// Event loop tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Maximum callbacks executed per Poll-phase visit before moving on.
    pub poll_batch_limit: usize,

    /// Microtasks executed in one drain before a starvation warning is logged.
    ///
    /// The budget never changes ordering; it only makes starvation visible.
    pub microtask_budget: Option<usize>,

    /// Interval periods shorter than this are raised to it.
    pub min_interval_ms: u64,

    /// Default high-water mark for object-mode streams.
    pub object_high_water_mark: usize,

    /// Default high-water mark for byte streams.
    pub byte_high_water_mark: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_batch_limit: DEFAULT_POLL_BATCH_LIMIT,
            microtask_budget: None,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            object_high_water_mark: DEFAULT_OBJECT_HIGH_WATER_MARK,
            byte_high_water_mark: DEFAULT_BYTE_HIGH_WATER_MARK,
        }
    }
}

impl LoopConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: LoopConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let input = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&input)
    }

    /// Checks that every limit is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_batch_limit == 0 {
            return Err(ConfigError::Zero {
                field: "poll_batch_limit",
            });
        }

        if self.microtask_budget == Some(0) {
            return Err(ConfigError::Zero {
                field: "microtask_budget",
            });
        }

        if self.object_high_water_mark == 0 {
            return Err(ConfigError::Zero {
                field: "object_high_water_mark",
            });
        }

        if self.byte_high_water_mark == 0 {
            return Err(ConfigError::Zero {
                field: "byte_high_water_mark",
            });
        }

        Ok(())
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// Options recognized by the stream node factories.
///
/// Keys use the conventional camel-case spelling when deserialized
/// (`highWaterMark`, `lowWaterMark`, `objectMode`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamOptions {
    /// Buffered size at which `produce` starts returning `false`.
    ///
    /// Falls back to the loop's object or byte default.
    pub high_water_mark: Option<usize>,

    /// Buffered size at or below which the drain signal fires. Defaults to 0.
    pub low_water_mark: Option<usize>,

    /// Count every chunk as 1 instead of by its byte length.
    pub object_mode: bool,
}

impl StreamOptions {
    /// Object-mode options with the default high-water mark.
    pub fn object() -> Self {
        Self {
            object_mode: true,
            ..Self::default()
        }
    }

    /// Byte-mode options with the default high-water mark.
    pub fn bytes() -> Self {
        Self::default()
    }

    pub fn high_water_mark(mut self, mark: usize) -> Self {
        self.high_water_mark = Some(mark);
        self
    }

    pub fn low_water_mark(mut self, mark: usize) -> Self {
        self.low_water_mark = Some(mark);
        self
    }

    /// Resolves defaults against `config` and validates the marks.
    pub(crate) fn resolve(&self, config: &LoopConfig) -> Result<Marks, ConfigError> {
        let default_high = if self.object_mode {
            config.object_high_water_mark
        } else {
            config.byte_high_water_mark
        };

        let high = self.high_water_mark.unwrap_or(default_high);
        if high == 0 {
            return Err(ConfigError::Zero {
                field: "highWaterMark",
            });
        }

        let low = self.low_water_mark.unwrap_or(0);
        if low > high {
            return Err(ConfigError::Marks { low, high });
        }

        Ok(Marks {
            high,
            low,
            object_mode: self.object_mode,
        })
    }
}

/// Resolved watermarks of one stream node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Marks {
    pub(crate) high: usize,
    pub(crate) low: usize,
    pub(crate) object_mode: bool,
}
