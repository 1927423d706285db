//! Ledger entries, retry policy, and sweep outcomes.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// A message that still awaits confirmation from its recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAck {
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    pub payload: Value,
    pub sent_at: DateTime<Utc>,

    /// Resends performed so far.
    #[serde(default)]
    pub retry_count: u32,

    pub next_retry_at: DateTime<Utc>,
}

impl PendingAck {
    /// New entry with a fresh id, first retry one `base` step after `now`.
    pub fn new(
        sender: &str,
        recipient: &str,
        payload: Value,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            payload,
            sent_at: now,
            retry_count: 0,
            next_retry_at: after(now, policy.base),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at <= now
    }

    /// Payload as message text: strings verbatim, anything else as JSON.
    pub fn payload_text(&self) -> String {
        match &self.payload {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Resend schedule for unconfirmed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Resends before the message is escalated and dropped.
    pub max_retries: u32,
    pub base: Duration,
    /// Upper bound on a single backoff step.
    pub cap: Duration,
}

impl RetryPolicy {
    /// Wait after the `resend`-th resend (1-based): `min(base * 2^(resend-1), cap)`.
    pub fn backoff(&self, resend: u32) -> Duration {
        let exponent = resend.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent).min(self.cap)
    }

    /// When an entry resent for the `resend`-th time at `now` is next due.
    pub fn next_retry_at(&self, now: DateTime<Utc>, resend: u32) -> DateTime<Utc> {
        after(now, self.backoff(resend))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_secs(30),
            cap: Duration::from_secs(900),
        }
    }
}

/// What one successful sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Overdue entries handled (resent or escalated).
    pub processed: usize,
    pub resent: usize,
    pub escalated: usize,
    /// Optimistic-write attempts used, including the one that landed.
    pub attempts: u32,
}

/// `now + delay`, saturating at the latest representable instant.
fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
