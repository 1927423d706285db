//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// Configuration for a latch project.
///
/// This struct represents the contents of `.latch/config.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Seconds after which a lock record may be reclaimed by another holder.
    #[serde(default = "default_lock_stale_seconds")]
    pub lock_stale_seconds: u64,

    /// Maximum length (in characters) of a lock reason.
    #[serde(default = "default_reason_max_len")]
    pub reason_max_len: usize,

    // =========================================================================
    // Acknowledgment settings
    // =========================================================================
    /// Resends of an unconfirmed message before it is escalated.
    #[serde(default = "default_ack_max_retries")]
    pub ack_max_retries: u32,

    /// Base delay of the exponential resend backoff.
    #[serde(default = "default_ack_retry_base_seconds")]
    pub ack_retry_base_seconds: u64,

    /// Upper bound on a single resend backoff step.
    #[serde(default = "default_ack_retry_max_seconds")]
    pub ack_retry_max_seconds: u64,

    /// Period of the background sweeper (`ack sweep --watch`).
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,

    // =========================================================================
    // Store settings
    // =========================================================================
    /// Optimistic-write attempts per ledger operation before giving up.
    #[serde(default = "default_store_write_attempts")]
    pub store_write_attempts: u32,

    /// Sleep base (milliseconds) between optimistic-write attempts.
    #[serde(default = "default_store_retry_base_ms")]
    pub store_retry_base_ms: u64,

    // =========================================================================
    // Collaborators
    // =========================================================================
    /// Live agent identities, used as escalation recipients.
    #[serde(default)]
    pub agents: Vec<String>,

    /// Delivery command (shell-words parsed; no shell). `{recipient}` and
    /// `{text}` are substituted in each argument. Unset means no transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_stale_seconds: default_lock_stale_seconds(),
            reason_max_len: default_reason_max_len(),
            ack_max_retries: default_ack_max_retries(),
            ack_retry_base_seconds: default_ack_retry_base_seconds(),
            ack_retry_max_seconds: default_ack_retry_max_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            store_write_attempts: default_store_write_attempts(),
            store_retry_base_ms: default_store_retry_base_ms(),
            agents: Vec::new(),
            notify_command: None,
        }
    }
}
