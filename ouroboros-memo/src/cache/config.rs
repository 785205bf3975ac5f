//! Configuration for memoized wrappers and for the memoizer service

use crate::error::{MemoError, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Canonical form of "no options supplied"
pub const DEFAULT_OPTIONS_MARKER: &str = "<default>";

/// Per-wrapper configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoOptions {
    /// Compare arguments by identity (true) or by serialized form (false)
    pub strict_arg_match: bool,

    /// Lifetime of cached results; `None` keeps them until cleared.
    /// Must be a positive whole number of milliseconds.
    pub ttl: Option<Duration>,
}

impl Default for MemoOptions {
    fn default() -> Self {
        Self {
            strict_arg_match: true,
            ttl: None,
        }
    }
}

/// Serialized shape used for wrapper identity
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalOptions {
    strict_arg_match: bool,
    ttl: Option<u128>,
}

impl MemoOptions {
    /// Create a new builder for wrapper options
    pub fn builder() -> MemoOptionsBuilder {
        MemoOptionsBuilder::default()
    }

    /// Loose argument matching, no TTL
    pub fn loose() -> Self {
        Self {
            strict_arg_match: false,
            ttl: None,
        }
    }

    /// Strict matching with a TTL in milliseconds
    pub fn with_ttl_ms(ttl_ms: u64) -> Self {
        Self {
            ttl: Some(Duration::from_millis(ttl_ms)),
            ..Default::default()
        }
    }

    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        if let Some(ttl) = self.ttl {
            if ttl.is_zero() || ttl.subsec_nanos() % 1_000_000 != 0 {
                return Err(MemoError::InvalidArgument(format!(
                    "ttl must be a positive whole number of milliseconds, got {:?}",
                    ttl
                )));
            }
        }
        Ok(())
    }

    /// Canonical string identifying a configuration.
    ///
    /// `None` maps to [`DEFAULT_OPTIONS_MARKER`], so a wrapper created without
    /// options is distinct from one created with explicit default options.
    pub fn canonical(options: Option<&MemoOptions>) -> Result<String> {
        match options {
            None => Ok(DEFAULT_OPTIONS_MARKER.to_string()),
            Some(options) => serde_json::to_string(&CanonicalOptions {
                strict_arg_match: options.strict_arg_match,
                ttl: options.ttl.map(|ttl| ttl.as_millis()),
            })
            .map_err(|e| MemoError::ConfigError(e.to_string())),
        }
    }

    /// Parse a dynamic options object with `strictArgMatch` and `ttl` fields.
    ///
    /// Missing, `null` or `undefined` fields take their defaults.
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            MemoError::InvalidArgument(format!(
                "options must be an object, got {}",
                value.type_name()
            ))
        })?;

        let strict_arg_match = match object.field("strictArgMatch") {
            None | Some(Value::Undefined) | Some(Value::Null) => true,
            Some(Value::Bool(b)) => b,
            Some(other) => {
                return Err(MemoError::InvalidArgument(format!(
                    "strictArgMatch must be a bool, got {}",
                    other.type_name()
                )))
            }
        };

        let ttl = match object.field("ttl") {
            None | Some(Value::Undefined) | Some(Value::Null) => None,
            Some(ttl) => Some(Duration::from_millis(parse_ttl_ms(&ttl)?)),
        };

        let options = Self {
            strict_arg_match,
            ttl,
        };
        options.validate()?;
        Ok(options)
    }
}

fn parse_ttl_ms(ttl: &Value) -> Result<u64> {
    let invalid = || {
        MemoError::InvalidArgument(format!(
            "ttl must be a positive whole number of milliseconds, got {:?}",
            ttl
        ))
    };

    match ttl {
        Value::Int(ms) if *ms > 0 => Ok(*ms as u64),
        Value::Float(ms)
            if ms.is_finite() && *ms > 0.0 && ms.fract() == 0.0 && *ms <= u64::MAX as f64 =>
        {
            Ok(*ms as u64)
        }
        _ => Err(invalid()),
    }
}

/// Builder for wrapper options
#[derive(Debug, Default)]
pub struct MemoOptionsBuilder {
    strict_arg_match: Option<bool>,
    ttl: Option<Duration>,
}

impl MemoOptionsBuilder {
    /// Compare arguments by identity (true) or serialized form (false)
    pub fn strict_arg_match(mut self, strict: bool) -> Self {
        self.strict_arg_match = Some(strict);
        self
    }

    /// Set the time-to-live of cached results
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the time-to-live in milliseconds
    pub fn ttl_ms(self, ttl_ms: u64) -> Self {
        self.ttl(Duration::from_millis(ttl_ms))
    }

    /// Build the options
    pub fn build(self) -> MemoOptions {
        let defaults = MemoOptions::default();

        MemoOptions {
            strict_arg_match: self.strict_arg_match.unwrap_or(defaults.strict_arg_match),
            ttl: self.ttl.or(defaults.ttl),
        }
    }
}

/// Environment variable toggling the background sweeper
pub const ENV_AUTO_CLEANUP: &str = "OUROBOROS_MEMO_AUTO_CLEANUP";

/// Environment variable setting the sweep interval in milliseconds
pub const ENV_CLEANUP_INTERVAL_MS: &str = "OUROBOROS_MEMO_CLEANUP_INTERVAL_MS";

/// Environment variable toggling hit/miss accounting
pub const ENV_METRICS: &str = "OUROBOROS_MEMO_METRICS";

/// Configuration for a [`Memoizer`](crate::Memoizer)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoizerConfig {
    /// Run a background task purging expired entries and dead stores.
    /// Lazy expiry on read is always active.
    pub enable_auto_cleanup: bool,

    /// Interval between background sweeps
    pub cleanup_interval: Duration,

    /// Record hit/miss statistics per wrapper
    pub enable_metrics: bool,
}

impl Default for MemoizerConfig {
    fn default() -> Self {
        Self {
            enable_auto_cleanup: false,
            // Sweep every minute
            cleanup_interval: Duration::from_secs(60),
            enable_metrics: true,
        }
    }
}

impl MemoizerConfig {
    /// Create a new builder for memoizer configuration
    pub fn builder() -> MemoizerConfigBuilder {
        MemoizerConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.enable_auto_cleanup && self.cleanup_interval.is_zero() {
            return Err(MemoError::ConfigError(
                "cleanup_interval must be greater than 0 when auto cleanup is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from the environment, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            enable_auto_cleanup: env_bool(ENV_AUTO_CLEANUP)?
                .unwrap_or(defaults.enable_auto_cleanup),
            cleanup_interval: env_u64(ENV_CLEANUP_INTERVAL_MS)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.cleanup_interval),
            enable_metrics: env_bool(ENV_METRICS)?.unwrap_or(defaults.enable_metrics),
        };
        config.validate()?;
        Ok(config)
    }
}

fn env_bool(name: &str) -> Result<Option<bool>> {
    match std::env::var(name) {
        Ok(raw) => parse_bool(&raw).map(Some).ok_or_else(|| {
            MemoError::ConfigError(format!("{} must be a boolean, got {:?}", name, raw))
        }),
        Err(_) => Ok(None),
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| {
                MemoError::ConfigError(format!("{} must be an integer, got {:?}", name, raw))
            }),
        Err(_) => Ok(None),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Builder for memoizer configuration
#[derive(Debug, Default)]
pub struct MemoizerConfigBuilder {
    enable_auto_cleanup: Option<bool>,
    cleanup_interval: Option<Duration>,
    enable_metrics: Option<bool>,
}

impl MemoizerConfigBuilder {
    /// Enable or disable the background sweeper
    pub fn enable_auto_cleanup(mut self, enable: bool) -> Self {
        self.enable_auto_cleanup = Some(enable);
        self
    }

    /// Set the sweep interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Enable or disable metrics collection
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = Some(enable);
        self
    }

    /// Build the memoizer configuration
    pub fn build(self) -> MemoizerConfig {
        let defaults = MemoizerConfig::default();

        MemoizerConfig {
            enable_auto_cleanup: self
                .enable_auto_cleanup
                .unwrap_or(defaults.enable_auto_cleanup),
            cleanup_interval: self.cleanup_interval.unwrap_or(defaults.cleanup_interval),
            enable_metrics: self.enable_metrics.unwrap_or(defaults.enable_metrics),
        }
    }
}
