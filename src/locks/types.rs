//! Outcome types for lock operations.
//!
//! Conflicts are values, not errors: callers match on them to decide whether
//! to wait, message the holder, or give up.

use super::record::{LockRecord, epoch_seconds};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why the lock could not be granted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockConflict {
    /// Resource of the blocking lock (may be a pattern covering the request).
    pub resource: String,

    /// Current holder of the blocking lock.
    pub holder: String,

    #[serde(with = "epoch_seconds")]
    pub acquired_at: DateTime<Utc>,

    pub reason: String,
}

impl From<LockRecord> for LockConflict {
    fn from(record: LockRecord) -> Self {
        Self {
            resource: record.resource,
            holder: record.holder,
            acquired_at: record.acquired_at,
            reason: record.reason,
        }
    }
}

impl std::fmt::Display for LockConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} is held by {} since {}",
            self.resource,
            self.holder,
            self.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

/// How a granted lock came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    /// No previous record.
    Acquired,
    /// The holder already held it; timestamp and reason were updated in place.
    Refreshed,
    /// A stale record of another holder was removed first.
    Reclaimed,
}

/// Result of [`LockManager::acquire`](super::LockManager::acquire).
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Granted { record: LockRecord, kind: GrantKind },
    Conflict(LockConflict),
}

impl Acquisition {
    pub fn is_granted(&self) -> bool {
        matches!(self, Acquisition::Granted { .. })
    }

    pub fn conflict(&self) -> Option<&LockConflict> {
        match self {
            Acquisition::Conflict(conflict) => Some(conflict),
            Acquisition::Granted { .. } => None,
        }
    }
}

/// Result of [`LockManager::release`](super::LockManager::release).
#[derive(Debug, Clone, PartialEq)]
pub enum Release {
    /// This call removed the holder's record.
    Released,
    /// There was nothing to remove.
    AlreadyReleased,
    /// Someone else holds the resource; nothing was removed.
    HeldByOther(LockConflict),
}

impl Release {
    /// Release is idempotent: both removal and absence count as success.
    pub fn is_success(&self) -> bool {
        !matches!(self, Release::HeldByOther(_))
    }
}
