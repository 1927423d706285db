//! Audit event log for latch.
//!
//! Every lock and acknowledgment state change is appended as one JSON object
//! per line to `.latch/events/events.ndjson`. The file is append-only and is
//! what an external dashboard tails.
//!
//! # Event Format
//!
//! - `ts`: RFC3339 timestamp
//! - `action`: what happened (lock_acquire, ack_escalate, ...)
//! - `actor`: the agent identity that caused it, or `user@HOST` for admin actions
//! - `subject`: the resource or message id, when there is one
//! - `details`: freeform object with action-specific details
//!
//! Recording is best-effort: a failure to append is logged and never fails
//! the operation that produced the event.

use crate::error::{LatchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Project state directory created
    Init,
    /// New lock record created
    LockAcquire,
    /// Holder refreshed its own lock
    LockRefresh,
    /// Stale lock removed so another holder could take it
    LockReclaim,
    /// Holder released its lock
    LockRelease,
    /// Administrative bulk removal
    LockCleanup,
    /// Confirmable message registered
    AckTrack,
    /// Confirmation received
    AckConfirm,
    /// Overdue message resent
    AckResend,
    /// Retries exhausted; broadcast to all agents and dropped
    AckEscalate,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventAction::Init => "init",
            EventAction::LockAcquire => "lock_acquire",
            EventAction::LockRefresh => "lock_refresh",
            EventAction::LockReclaim => "lock_reclaim",
            EventAction::LockRelease => "lock_release",
            EventAction::LockCleanup => "lock_cleanup",
            EventAction::AckTrack => "ack_track",
            EventAction::AckConfirm => "ack_confirm",
            EventAction::AckResend => "ack_resend",
            EventAction::AckEscalate => "ack_escalate",
        };
        f.write_str(name)
    }
}

/// An event record for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// When the event occurred.
    pub ts: DateTime<Utc>,

    /// The action that was performed.
    pub action: EventAction,

    /// Who performed it.
    pub actor: String,

    /// Resource or message id the event is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl Event {
    /// Create a new event attributed to the local `user@HOST`.
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: local_actor(),
            subject: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Attribute the event to an agent.
    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            LatchError::Serialization(format!("failed to serialize event to JSON: {}", e))
        })
    }
}

/// `user@HOST` of the current process.
pub fn local_actor() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Handle to an append-only event file.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event as one line. Lines from concurrent processes do not
    /// interleave because each is a single `O_APPEND` write.
    pub fn append(&self, event: &Event) -> Result<()> {
        let mut line = event.to_ndjson_line()?;
        line.push('\n');

        if let Some(dir) = self.path.parent()
            && !dir.exists()
        {
            fs::create_dir_all(dir).map_err(|e| {
                LatchError::Io(format!(
                    "failed to create events directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                LatchError::Io(format!(
                    "failed to open events file '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;

        file.write_all(line.as_bytes()).map_err(|e| {
            LatchError::Io(format!(
                "failed to write event to '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Append, logging instead of failing.
    pub fn record(&self, event: Event) {
        if let Err(e) = self.append(&event) {
            warn!(action = %event.action, error = %e, "failed to record event");
        }
    }

    /// Read all events. Unparsable lines are skipped.
    pub fn read_all(&self) -> Result<Vec<Event>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LatchError::Io(format!(
                    "failed to read events file '{}': {}",
                    self.path.display(),
                    e
                )));
            }
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}
