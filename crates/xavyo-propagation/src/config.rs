//! Propagation engine configuration.

use std::env;
use std::str::FromStr;

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration value is invalid.
    #[error("Configuration invalid for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

const FETCH_AFTER_STATE_VAR: &str = "XAVYO_PROPAGATION_FETCH_AFTER_STATE";
const MAX_REASON_LENGTH_VAR: &str = "XAVYO_PROPAGATION_MAX_REASON_LENGTH";
const PASSWORD_RETRIES_VAR: &str = "XAVYO_PROPAGATION_PASSWORD_RETRIES";

/// Propagation engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationConfig {
    /// Read the remote object again once the connector call returned.
    pub fetch_after_state: bool,
    /// Upper bound, in characters, of the short failure reason.
    pub max_reason_length: usize,
    /// Bound on the forbidden prefix/suffix fix-up loop of password generation.
    pub password_retries: u32,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            fetch_after_state: true,
            max_reason_length: 1000,
            password_retries: 64,
        }
    }
}

impl PropagationConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `XAVYO_PROPAGATION_FETCH_AFTER_STATE`: `true` (default) or `false`
    /// - `XAVYO_PROPAGATION_MAX_REASON_LENGTH`: default 1000
    /// - `XAVYO_PROPAGATION_PASSWORD_RETRIES`: default 64
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            fetch_after_state: parse_var(FETCH_AFTER_STATE_VAR)?
                .unwrap_or(defaults.fetch_after_state),
            max_reason_length: parse_var(MAX_REASON_LENGTH_VAR)?
                .unwrap_or(defaults.max_reason_length),
            password_retries: parse_var(PASSWORD_RETRIES_VAR)?
                .unwrap_or(defaults.password_retries),
        })
    }

    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> PropagationConfigBuilder {
        PropagationConfigBuilder::default()
    }
}

fn parse_var<T>(var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                var: var.to_string(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

/// Builder for `PropagationConfig`.
#[derive(Debug, Default)]
pub struct PropagationConfigBuilder {
    fetch_after_state: Option<bool>,
    max_reason_length: Option<usize>,
    password_retries: Option<u32>,
}

impl PropagationConfigBuilder {
    /// Enable or disable the after-state read.
    #[must_use]
    pub fn fetch_after_state(mut self, enabled: bool) -> Self {
        self.fetch_after_state = Some(enabled);
        self
    }

    /// Set the short failure reason bound.
    #[must_use]
    pub fn max_reason_length(mut self, length: usize) -> Self {
        self.max_reason_length = Some(length);
        self
    }

    /// Set the password fix-up retry bound.
    #[must_use]
    pub fn password_retries(mut self, retries: u32) -> Self {
        self.password_retries = Some(retries);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<PropagationConfig, ConfigError> {
        let defaults = PropagationConfig::default();
        let max_reason_length = self.max_reason_length.unwrap_or(defaults.max_reason_length);
        if max_reason_length == 0 {
            return Err(ConfigError::Invalid {
                var: "max_reason_length".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(PropagationConfig {
            fetch_after_state: self.fetch_after_state.unwrap_or(defaults.fetch_after_state),
            max_reason_length,
            password_retries: self.password_retries.unwrap_or(defaults.password_retries),
        })
    }
}
