//! Issuer and submission configuration.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. an optional `comprobante.{toml,yaml,json}` file in the working directory
//! 2. environment variables prefixed `COMPROBANTE`, nested with `__`,
//!    e.g. `COMPROBANTE__ISSUER__RUC` or `COMPROBANTE__SUBMISSION__MAX_RETRIES`
//!
//! Durations are milliseconds. A loaded issuer must pass
//! [`validate_issuer`](crate::core::validate_issuer).

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::{ComprobanteError, Issuer, validate_issuer};
use crate::sri::{PollPolicy, RetryPolicy, SubmissionDesk};

/// Base name of the optional configuration file.
pub const CONFIG_FILE: &str = "comprobante";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "COMPROBANTE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub issuer: Issuer,
    #[serde(default)]
    pub submission: SubmissionSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionSettings {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        let poll = PollPolicy::default();
        Self {
            max_retries: retry.max_retries,
            initial_backoff_ms: retry.initial_backoff.as_millis() as u64,
            max_backoff_ms: retry.max_backoff.as_millis() as u64,
            backoff_multiplier: retry.multiplier,
            poll_interval_ms: poll.interval.as_millis() as u64,
            poll_timeout_ms: poll.timeout.as_millis() as u64,
        }
    }
}

impl SubmissionSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.backoff_multiplier,
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_millis(self.poll_timeout_ms),
        }
    }
}

fn config_error(e: config::ConfigError) -> ComprobanteError {
    ComprobanteError::Config(e.to_string())
}

impl Settings {
    /// Load from the default file (if present) and the environment.
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(env_source())
            .build()
            .map_err(config_error)?;
        Self::from_config(config)
    }

    /// Load from an explicit file, still honoring environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()
            .map_err(config_error)?;
        Self::from_config(config)
    }

    /// Parse TOML text without consulting the environment.
    pub fn from_toml(source: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .map_err(config_error)?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self> {
        let settings: Settings = config.try_deserialize().map_err(config_error)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Boundary checks on the issuer and the submission timings.
    pub fn validate(&self) -> Result<()> {
        let findings = validate_issuer(&self.issuer);
        if !findings.is_empty() {
            let joined = findings
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ComprobanteError::Config(format!("invalid issuer: {joined}")));
        }
        let s = &self.submission;
        if !(s.backoff_multiplier.is_finite() && s.backoff_multiplier >= 1.0) {
            return Err(ComprobanteError::Config(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                s.backoff_multiplier
            )));
        }
        if s.poll_interval_ms == 0 {
            return Err(ComprobanteError::Config(
                "poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    /// A submission desk using the configured retry and poll policies.
    pub fn desk(&self) -> SubmissionDesk {
        SubmissionDesk::with_policies(self.submission.retry_policy(), self.submission.poll_policy())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX).separator("__")
}
