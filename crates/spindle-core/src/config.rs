//! Queue configuration.
//!
//! Durations are written as whole seconds in config files:
//!
//! ```toml
//! watchdog_interval = 60
//! stall_threshold = 300
//!
//! [main]
//! max_concurrent = 5
//! timeout = 600
//!
//! [ai]
//! max_concurrent = 1
//! timeout = 1800
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::Lane;

pub const MAIN_CONCURRENCY_ENV: &str = "SPINDLE_MAIN_CONCURRENCY";
pub const AI_CONCURRENCY_ENV: &str = "SPINDLE_AI_CONCURRENCY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },
}

/// Limits of a single lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneConfig {
    /// Pool size: how many tasks of this lane may run at once.
    pub max_concurrent: usize,

    /// Runtime after which the watchdog reports the task as timed out.
    #[serde(serialize_with = "duration_secs::serialize")]
    pub timeout: Duration,
}

impl LaneConfig {
    pub fn new(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            max_concurrent,
            timeout,
        }
    }

    pub fn main_default() -> Self {
        Self::new(5, Duration::from_secs(10 * 60))
    }

    pub fn ai_default() -> Self {
        Self::new(1, Duration::from_secs(30 * 60))
    }

    fn overridden(mut self, raw: Option<RawLaneConfig>) -> Self {
        if let Some(raw) = raw {
            if let Some(n) = raw.max_concurrent {
                self.max_concurrent = n;
            }
            if let Some(secs) = raw.timeout {
                self.timeout = Duration::from_secs(secs);
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawQueueConfig")]
pub struct QueueConfig {
    #[serde(serialize_with = "duration_secs::serialize")]
    pub watchdog_interval: Duration,

    /// No progress for this long (while still under the timeout) is logged
    /// as a stall.
    #[serde(serialize_with = "duration_secs::serialize")]
    pub stall_threshold: Duration,

    pub main: LaneConfig,

    pub ai: LaneConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            main: LaneConfig::main_default(),
            ai: LaneConfig::ai_default(),
            watchdog_interval: Duration::from_secs(60),
            stall_threshold: Duration::from_secs(5 * 60),
        }
    }
}

/// On-disk shape: every key optional, missing keys fall back to the
/// defaults of the lane they belong to.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawQueueConfig {
    main: Option<RawLaneConfig>,
    ai: Option<RawLaneConfig>,
    watchdog_interval: Option<u64>,
    stall_threshold: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLaneConfig {
    max_concurrent: Option<usize>,
    timeout: Option<u64>,
}

impl From<RawQueueConfig> for QueueConfig {
    fn from(raw: RawQueueConfig) -> Self {
        let defaults = QueueConfig::default();
        Self {
            main: defaults.main.overridden(raw.main),
            ai: defaults.ai.overridden(raw.ai),
            watchdog_interval: raw
                .watchdog_interval
                .map(Duration::from_secs)
                .unwrap_or(defaults.watchdog_interval),
            stall_threshold: raw
                .stall_threshold
                .map(Duration::from_secs)
                .unwrap_or(defaults.stall_threshold),
        }
    }
}

impl QueueConfig {
    pub fn lane(&self, lane: Lane) -> &LaneConfig {
        match lane {
            Lane::Main => &self.main,
            Lane::Ai => &self.ai,
        }
    }

    pub fn lane_mut(&mut self, lane: Lane) -> &mut LaneConfig {
        match lane {
            Lane::Main => &mut self.main,
            Lane::Ai => &mut self.ai,
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply `SPINDLE_*_CONCURRENCY` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Same as [`apply_env`](Self::apply_env) with an injectable lookup.
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for (key, lane) in [(MAIN_CONCURRENCY_ENV, Lane::Main), (AI_CONCURRENCY_ENV, Lane::Ai)] {
            if let Some(value) = lookup(key) {
                let parsed = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidEnv {
                        key: key.to_string(),
                        value: value.clone(),
                    })?;
                self.lane_mut(lane).max_concurrent = parsed;
            }
        }
        Ok(self)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}
