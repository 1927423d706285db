//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::ack::RetryPolicy;
use crate::error::{LatchError, Result};
use crate::identity;
use crate::store::WriteRetry;
use std::io;
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(LatchError::Validation)` - Parse error or validation failure
    /// * `Err(LatchError::Io)` - The file exists but could not be read
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LatchError::Io(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::metadata(path) {
            Ok(_) => Self::load(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(LatchError::Io(format!(
                "failed to stat config file '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    /// Parse config from a YAML string.
    ///
    /// An empty document yields the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| {
                LatchError::Validation(format!("failed to parse config YAML: {}", e))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            LatchError::Serialization(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - every count and interval must be greater than 0
    /// - `ack_retry_max_seconds` must be at least `ack_retry_base_seconds`
    /// - every entry of `agents` must be a valid agent identity
    /// - `notify_command`, when set, must split into at least one word
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("lock_stale_seconds", self.lock_stale_seconds),
            ("reason_max_len", self.reason_max_len as u64),
            ("ack_retry_base_seconds", self.ack_retry_base_seconds),
            ("ack_retry_max_seconds", self.ack_retry_max_seconds),
            ("sweep_interval_seconds", self.sweep_interval_seconds),
            ("store_write_attempts", u64::from(self.store_write_attempts)),
            ("store_retry_base_ms", self.store_retry_base_ms),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(format!("{} must be greater than 0", field)));
            }
        }

        // Zero resends is meaningful: escalate on the first overdue sweep.
        if self.ack_retry_max_seconds < self.ack_retry_base_seconds {
            return Err(invalid(format!(
                "ack_retry_max_seconds ({}) must not be less than ack_retry_base_seconds ({})",
                self.ack_retry_max_seconds, self.ack_retry_base_seconds
            )));
        }

        for agent in &self.agents {
            if !identity::is_valid(agent) {
                return Err(invalid(format!(
                    "agents entry '{}' is not a valid agent identity",
                    agent
                )));
            }
        }

        if let Some(command) = &self.notify_command {
            let words = shell_words::split(command).map_err(|e| {
                invalid(format!("notify_command '{}' cannot be parsed: {}", command, e))
            })?;
            if words.is_empty() {
                return Err(invalid("notify_command must not be empty".to_string()));
            }
        }

        Ok(())
    }

    pub fn lock_stale_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_stale_seconds)
    }

    /// Resend schedule for unconfirmed messages.
    pub fn ack_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.ack_max_retries,
            base: Duration::from_secs(self.ack_retry_base_seconds),
            cap: Duration::from_secs(self.ack_retry_max_seconds),
        }
    }

    /// Retry budget for optimistic ledger writes.
    pub fn write_retry(&self) -> WriteRetry {
        WriteRetry {
            attempts: self.store_write_attempts,
            base_delay: Duration::from_millis(self.store_retry_base_ms),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

fn invalid(message: String) -> LatchError {
    LatchError::Validation(format!("config validation failed: {}", message))
}
