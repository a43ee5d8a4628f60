//! Library settings using Figment
//!
//! Tunes the deadlines and log level of this library. Hardware configuration
//! (sequence tables, position-compare parameters) is NOT loaded from here;
//! it is passed to `prepare()` as validated value objects.
//!
//! Settings are loaded from:
//! 1. Built-in defaults (the [`crate::limits`] constants)
//! 2. A TOML file
//! 3. Environment variables prefixed with `FLYSCAN_`, nested with `__`
//!
//! # Example
//!
//! ```toml
//! log_level = "debug"
//!
//! [timeouts]
//! default_timeout = "10s"
//! arm_timeout = "1s"
//! stop_timeout = "1s"
//! poll_interval = "100ms"
//! ```
//!
//! ```bash
//! FLYSCAN_TIMEOUTS__ARM_TIMEOUT=2s
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{FlyscanError, FlyscanResult};
use crate::limits::{ARM_TIMEOUT, DEFAULT_TIMEOUT, POLL_INTERVAL, STOP_TIMEOUT};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "FLYSCAN_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlyscanSettings {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Lifecycle deadlines
    pub timeouts: TimeoutSettings,
}

impl Default for FlyscanSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

/// Deadlines used by parameters and trigger strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Deadline for `set()` when the caller gives none
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Deadline for a block to report active after kickoff
    #[serde(with = "humantime_serde")]
    pub arm_timeout: Duration,
    /// Deadline for a block to report inactive after stop
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,
    /// Sampling period for parameters without push updates
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            arm_timeout: ARM_TIMEOUT,
            stop_timeout: STOP_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl FlyscanSettings {
    /// Load settings from `config/flyscan.toml` and the environment
    pub fn load() -> FlyscanResult<Self> {
        Self::load_from("config/flyscan.toml")
    }

    /// Load settings from a specific file path
    ///
    /// A missing file is not an error; defaults and environment overrides
    /// still apply. The result is validated before it is returned.
    pub fn load_from<P: AsRef<Path>>(path: P) -> FlyscanResult<Self> {
        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings after loading
    pub fn validate(&self) -> FlyscanResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(FlyscanError::Config(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let t = &self.timeouts;
        for (name, value) in [
            ("default_timeout", t.default_timeout),
            ("arm_timeout", t.arm_timeout),
            ("stop_timeout", t.stop_timeout),
            ("poll_interval", t.poll_interval),
        ] {
            if value.is_zero() {
                return Err(FlyscanError::Config(format!(
                    "timeouts.{name} must be greater than zero"
                )));
            }
        }

        if t.poll_interval > t.arm_timeout {
            return Err(FlyscanError::Config(format!(
                "timeouts.poll_interval ({:?}) exceeds timeouts.arm_timeout ({:?})",
                t.poll_interval, t.arm_timeout
            )));
        }

        Ok(())
    }
}
