//! Lock record structures and utilities.

use crate::error::{LatchError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A persisted lock: one file per locked resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Agent identity holding the lock.
    pub holder: String,

    /// Normalized resource identifier (path or glob, project-relative).
    pub resource: String,

    /// When the lock was acquired or last refreshed, as Unix seconds.
    #[serde(with = "epoch_seconds")]
    pub acquired_at: DateTime<Utc>,

    /// Free-text annotation.
    #[serde(default)]
    pub reason: String,

    /// Process ID of the acquiring process, for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl LockRecord {
    /// Create a new record stamped with the current time.
    pub fn new(holder: &str, resource: &str, reason: &str) -> Self {
        Self {
            holder: holder.to_string(),
            resource: resource.to_string(),
            acquired_at: Utc::now(),
            reason: reason.to_string(),
            pid: Some(std::process::id()),
        }
    }

    /// Parse a record from file content.
    pub fn from_slice(content: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(content)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            LatchError::Serialization(format!("failed to serialize lock record: {}", e))
        })
    }

    /// Calculate the age of the lock.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.acquired_at)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let seconds = age.num_seconds();
        let minutes = age.num_minutes();
        let hours = age.num_hours();
        let days = age.num_days();

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}s", seconds.max(0))
        }
    }

    /// A record is stale once its age exceeds `timeout`.
    pub fn is_stale(&self, timeout: std::time::Duration) -> bool {
        match Duration::from_std(timeout) {
            Ok(timeout) => self.age() > timeout,
            // Larger than chrono can represent: never stale.
            Err(_) => false,
        }
    }
}

/// Serde adapter storing a timestamp as fractional Unix seconds.
pub(crate) mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(ts.timestamp_micros() as f64 / 1_000_000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() {
            return Err(de::Error::custom("timestamp is not a finite number"));
        }
        DateTime::from_timestamp_micros((secs * 1_000_000.0).round() as i64)
            .ok_or_else(|| de::Error::custom(format!("timestamp {} out of range", secs)))
    }
}
