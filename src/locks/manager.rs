//! Lock acquisition, release, query, listing, and cleanup.

use super::record::LockRecord;
use super::resource::Resource;
use super::types::{Acquisition, GrantKind, LockConflict, Release};
use crate::context::ProjectContext;
use crate::error::{LatchError, Result};
use crate::events::{Event, EventAction, EventLog};
use crate::fs::{CreateOutcome, atomic_write, create_exclusive, remove_if_exists};
use crate::identity;
use serde_json::json;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Re-reads allowed when a record keeps changing or vanishing underneath a
/// create or release.
const RACE_ATTEMPTS: u32 = 3;

/// Outcome of a conditional delete.
enum Removal {
    Removed,
    Gone,
    Changed,
}

/// Grants and revokes exclusive holds on resources, one record file each.
///
/// Cross-process exclusion comes only from [`create_exclusive`] and atomic
/// rename. The internal mutex serializes refreshes within this process and
/// gives no cross-process guarantee on its own.
#[derive(Debug)]
pub struct LockManager {
    root: PathBuf,
    locks_dir: PathBuf,
    stale_after: Duration,
    reason_max_len: usize,
    events: Option<EventLog>,
    refresh: Mutex<()>,
}

impl LockManager {
    pub fn new(ctx: &ProjectContext, stale_after: Duration, reason_max_len: usize) -> Self {
        Self {
            root: ctx.root.clone(),
            locks_dir: ctx.locks_dir.clone(),
            stale_after,
            reason_max_len,
            events: None,
            refresh: Mutex::new(()),
        }
    }

    /// Record state changes to `events`.
    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// Default staleness timeout used by `query`, `list`, and glob checks.
    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Try to take `resource` for `holder`.
    ///
    /// Never waits: a live lock held by someone else comes back as
    /// [`Acquisition::Conflict`] immediately.
    pub fn acquire(
        &self,
        resource: &str,
        holder: &str,
        reason: &str,
        stale_after: Duration,
    ) -> Result<Acquisition> {
        identity::validate("holder", holder)?;
        let resource = Resource::parse(&self.root, resource)?;
        self.validate_reason(reason)?;

        let path = self.record_path(&resource);
        let mut kind = GrantKind::Acquired;

        if let Some(existing) = self.read_record(&path)? {
            if existing.holder != holder {
                if !existing.is_stale(stale_after) {
                    debug!(resource = %resource, holder, current = %existing.holder, "lock held");
                    return Ok(Acquisition::Conflict(existing.into()));
                }
                match self.remove_if_unchanged(&path, &existing)? {
                    Removal::Removed | Removal::Gone => {
                        info!(
                            resource = %resource,
                            holder,
                            previous = %existing.holder,
                            age = %existing.age_string(),
                            "reclaimed stale lock"
                        );
                        self.record_event(
                            Event::new(EventAction::LockReclaim)
                                .by(holder)
                                .with_subject(resource.as_str())
                                .with_details(json!({
                                    "previous_holder": existing.holder,
                                    "previous_reason": existing.reason,
                                    "age_seconds": existing.age().num_seconds(),
                                })),
                        );
                        kind = GrantKind::Reclaimed;
                    }
                    // Replaced under us; the create below reports whoever won.
                    Removal::Changed => {}
                }
            } else if let Some(record) = self.refresh(&path, &resource, holder, reason)? {
                return Ok(Acquisition::Granted {
                    record,
                    kind: GrantKind::Refreshed,
                });
            }
        }

        if let Some(conflict) = self.interfering_lock(&resource, holder, stale_after)? {
            debug!(
                resource = %resource,
                holder,
                blocking = %conflict.resource,
                "pattern interference"
            );
            return Ok(Acquisition::Conflict(conflict));
        }

        self.create(&path, &resource, holder, reason, kind)
    }

    /// Release `holder`'s lock on `resource`.
    ///
    /// Idempotent: releasing an absent lock succeeds.
    pub fn release(&self, resource: &str, holder: &str) -> Result<Release> {
        identity::validate("holder", holder)?;
        let resource = Resource::parse(&self.root, resource)?;
        let path = self.record_path(&resource);

        for _ in 0..RACE_ATTEMPTS {
            let Some(existing) = self.read_record(&path)? else {
                return Ok(Release::AlreadyReleased);
            };
            if existing.holder != holder {
                return Ok(Release::HeldByOther(existing.into()));
            }
            match self.remove_if_unchanged(&path, &existing)? {
                Removal::Removed => {
                    debug!(resource = %resource, holder, "released");
                    self.record_event(
                        Event::new(EventAction::LockRelease)
                            .by(holder)
                            .with_subject(resource.as_str()),
                    );
                    return Ok(Release::Released);
                }
                Removal::Gone => return Ok(Release::AlreadyReleased),
                // Refreshed or replaced between read and delete; look again.
                Removal::Changed => continue,
            }
        }

        Err(LatchError::Contention(format!(
            "lock on '{}' kept changing during release",
            resource
        )))
    }

    /// Current live lock on `resource`, if any. A stale record is removed and
    /// reported as absent.
    pub fn query(&self, resource: &str) -> Result<Option<LockRecord>> {
        let resource = Resource::parse(&self.root, resource)?;
        let path = self.record_path(&resource);

        match self.read_record(&path)? {
            Some(record) if record.is_stale(self.stale_after) => {
                self.sweep_record(&path, &record)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// All live locks, optionally only those of `holder`, sorted by resource.
    /// Stale records encountered along the way are removed.
    pub fn list(&self, holder: Option<&str>) -> Result<Vec<LockRecord>> {
        if let Some(holder) = holder {
            identity::validate("holder", holder)?;
        }

        let mut live = Vec::new();
        for (path, record) in self.scan()? {
            if record.is_stale(self.stale_after) {
                self.sweep_record(&path, &record)?;
                continue;
            }
            if holder.is_none_or(|h| h == record.holder) {
                live.push(record);
            }
        }

        live.sort_by(|a, b| a.resource.cmp(&b.resource));
        Ok(live)
    }

    /// Remove every record older than `timeout`. Returns what was removed.
    pub fn sweep_stale(&self, timeout: Duration) -> Result<Vec<LockRecord>> {
        self.sweep_where(|record| record.is_stale(timeout), "stale")
    }

    /// Remove every record held by `holder`, live or not. Returns what was removed.
    pub fn sweep_holder(&self, holder: &str) -> Result<Vec<LockRecord>> {
        identity::validate("holder", holder)?;
        self.sweep_where(|record| record.holder == holder, "holder")
    }

    fn sweep_where<F>(&self, predicate: F, criterion: &str) -> Result<Vec<LockRecord>>
    where
        F: Fn(&LockRecord) -> bool,
    {
        let mut removed = Vec::new();
        for (path, record) in self.scan()? {
            if !predicate(&record) {
                continue;
            }
            if let Removal::Removed = self.remove_if_unchanged(&path, &record)? {
                self.record_event(
                    Event::new(EventAction::LockCleanup)
                        .with_subject(record.resource.as_str())
                        .with_details(json!({
                            "criterion": criterion,
                            "holder": record.holder,
                            "age_seconds": record.age().num_seconds(),
                        })),
                );
                removed.push(record);
            }
        }

        if !removed.is_empty() {
            info!(count = removed.len(), criterion, "cleaned up locks");
        }
        removed.sort_by(|a, b| a.resource.cmp(&b.resource));
        Ok(removed)
    }

    /// Same-holder refresh. Returns `None` if the record stopped being ours
    /// in the meantime, in which case the caller proceeds as a fresh acquisition.
    fn refresh(
        &self,
        path: &Path,
        resource: &Resource,
        holder: &str,
        reason: &str,
    ) -> Result<Option<LockRecord>> {
        let _serialized = self
            .refresh
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());

        match self.read_record(path)? {
            Some(current) if current.holder == holder => {
                let record = LockRecord::new(holder, resource.as_str(), reason);
                atomic_write(path, &record.to_json()?)?;
                debug!(resource = %resource, holder, "refreshed");
                self.record_event(
                    Event::new(EventAction::LockRefresh)
                        .by(holder)
                        .with_subject(resource.as_str())
                        .with_details(json!({ "reason": reason })),
                );
                Ok(Some(record))
            }
            _ => {
                debug!(resource = %resource, holder, "lost lock before refresh, acquiring afresh");
                Ok(None)
            }
        }
    }

    fn create(
        &self,
        path: &Path,
        resource: &Resource,
        holder: &str,
        reason: &str,
        kind: GrantKind,
    ) -> Result<Acquisition> {
        let record = LockRecord::new(holder, resource.as_str(), reason);
        let body = record.to_json()?;

        for _ in 0..RACE_ATTEMPTS {
            match create_exclusive(path, &body)? {
                CreateOutcome::Created => {
                    debug!(resource = %resource, holder, ?kind, "acquired");
                    self.record_event(
                        Event::new(EventAction::LockAcquire)
                            .by(holder)
                            .with_subject(resource.as_str())
                            .with_details(json!({ "reason": reason, "kind": kind })),
                    );
                    return Ok(Acquisition::Granted { record, kind });
                }
                CreateOutcome::AlreadyExists => {
                    if let Some(winner) = self.read_record(path)? {
                        debug!(
                            resource = %resource,
                            holder,
                            winner = %winner.holder,
                            "lost create race"
                        );
                        return Ok(Acquisition::Conflict(winner.into()));
                    }
                }
            }
        }

        Err(LatchError::Contention(format!(
            "could not create lock for '{}' after {} attempts",
            resource, RACE_ATTEMPTS
        )))
    }

    /// First live lock of another holder whose resource interferes with `resource`.
    fn interfering_lock(
        &self,
        resource: &Resource,
        holder: &str,
        stale_after: Duration,
    ) -> Result<Option<LockConflict>> {
        for (_, record) in self.scan()? {
            if record.holder == holder || record.is_stale(stale_after) {
                continue;
            }
            let Ok(other) = Resource::parse(&self.root, &record.resource) else {
                continue;
            };
            if other != *resource && resource.interferes_with(&other) {
                return Ok(Some(record.into()));
            }
        }
        Ok(None)
    }

    /// Read a record. Missing → `None`. Unparsable → removed, then `None`.
    fn read_record(&self, path: &Path) -> Result<Option<LockRecord>> {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LatchError::Io(format!(
                    "failed to read lock file '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        match LockRecord::from_slice(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "removing unparsable lock record");
                remove_if_exists(path)?;
                Ok(None)
            }
        }
    }

    /// Delete `path` only if it still holds `seen`.
    ///
    /// Narrows the window in which a stale-record delete could remove a
    /// record someone else just wrote; "already gone" is not an error.
    fn remove_if_unchanged(&self, path: &Path, seen: &LockRecord) -> Result<Removal> {
        match self.read_record(path)? {
            None => Ok(Removal::Gone),
            Some(current) if current == *seen => {
                if remove_if_exists(path)? {
                    Ok(Removal::Removed)
                } else {
                    Ok(Removal::Gone)
                }
            }
            Some(_) => Ok(Removal::Changed),
        }
    }

    /// Opportunistic removal of a stale record found by a read.
    fn sweep_record(&self, path: &Path, record: &LockRecord) -> Result<()> {
        if let Removal::Removed = self.remove_if_unchanged(path, record)? {
            info!(resource = %record.resource, holder = %record.holder, "swept stale lock");
            self.record_event(
                Event::new(EventAction::LockCleanup)
                    .with_subject(record.resource.as_str())
                    .with_details(json!({
                        "criterion": "stale",
                        "holder": record.holder,
                        "age_seconds": record.age().num_seconds(),
                    })),
            );
        }
        Ok(())
    }

    /// Every parsable record in the locks directory.
    fn scan(&self) -> Result<Vec<(PathBuf, LockRecord)>> {
        let entries = match fs::read_dir(&self.locks_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LatchError::Io(format!(
                    "failed to read locks directory '{}': {}",
                    self.locks_dir.display(),
                    e
                )));
            }
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                LatchError::Io(format!("failed to read locks directory entry: {}", e))
            })?;
            let path = entry.path();

            // Skips temp files (`*.tmp`) too.
            if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }

            if let Some(record) = self.read_record(&path)? {
                records.push((path, record));
            }
        }
        Ok(records)
    }

    fn record_path(&self, resource: &Resource) -> PathBuf {
        self.locks_dir.join(resource.file_name())
    }

    fn validate_reason(&self, reason: &str) -> Result<()> {
        let len = reason.chars().count();
        if len > self.reason_max_len {
            return Err(LatchError::Validation(format!(
                "reason is {} characters long; the limit is {}",
                len, self.reason_max_len
            )));
        }
        Ok(())
    }

    fn record_event(&self, event: Event) {
        if let Some(events) = &self.events {
            events.record(event);
        }
    }
}
