//! Configuration for the autoscaler service.
//!
//! The control plane and workload API URLs are deployment-specific and
//! required; the scaling tunables fall back to defaults. Loading goes
//! through an injectable key lookup so the error paths are testable
//! without touching the process environment.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config key {key} is missing")]
    Missing { key: &'static str },

    #[error("config key {key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the control plane (snapshot source).
    pub control_plane_url: String,

    /// Base URL of the workload API (scale subresource).
    pub api_url: String,

    /// Interval between snapshot sync passes.
    pub sync_interval: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Scaling behaviour handed to each scale invocation.
    pub scaling: ScalingConfig,
}

/// Immutable scaling behaviour, read once per invocation.
#[derive(Debug, Clone)]
pub struct ScalingConfig {
    /// Whether workloads may reach zero replicas at all.
    pub enable_scale_to_zero: bool,

    /// How long a unit must be Active with zero demand before it may start
    /// the transition toward zero.
    pub stable_window: Duration,

    /// How long a unit must be Inactive (or its routing in Proxy mode)
    /// before zero replicas is safe.
    pub scale_to_zero_grace_period: Duration,

    /// Deadline for an activation to make progress before it is abandoned.
    pub progress_deadline: Duration,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            enable_scale_to_zero: true,
            stable_window: Duration::from_secs(60),
            scale_to_zero_grace_period: Duration::from_secs(30),
            progress_deadline: Duration::from_secs(600),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let control_plane_url = require(&lookup, "STRATO_CONTROL_PLANE_URL")?;
        let api_url = require(&lookup, "STRATO_API_URL")?;

        let sync_interval =
            Duration::from_secs(parse_secs(&lookup, "STRATO_SYNC_INTERVAL_SECS", 5)?);

        let log_level = lookup("STRATO_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let scaling = ScalingConfig {
            enable_scale_to_zero: parse_bool(&lookup, "STRATO_ENABLE_SCALE_TO_ZERO", true)?,
            stable_window: Duration::from_secs(parse_secs(
                &lookup,
                "STRATO_STABLE_WINDOW_SECS",
                60,
            )?),
            scale_to_zero_grace_period: Duration::from_secs(parse_secs(
                &lookup,
                "STRATO_SCALE_TO_ZERO_GRACE_SECS",
                30,
            )?),
            progress_deadline: Duration::from_secs(parse_secs(
                &lookup,
                "STRATO_PROGRESS_DEADLINE_SECS",
                600,
            )?),
        };

        Ok(Self {
            control_plane_url,
            api_url,
            sync_interval,
            log_level,
            scaling,
        })
    }
}

fn require<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).ok_or(ConfigError::Missing { key })
}

fn parse_secs<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn parse_bool<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value: raw }),
        },
    }
}
