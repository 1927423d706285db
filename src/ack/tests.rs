//! Tests for the acknowledgment ledger.

use super::*;
use crate::error::{LatchError, Result};
use crate::events::{EventAction, EventLog};
use crate::store::{Change, VersionedFile, WriteRetry};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Records every delivery and answers with a fixed result.
#[derive(Default)]
struct RecordingNotifier {
    deliveries: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn recipients(&self) -> Vec<String> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }

    fn count_to(&self, recipient: &str) -> usize {
        self.recipients().iter().filter(|r| *r == recipient).count()
    }
}

impl Notifier for RecordingNotifier {
    fn deliver(&self, recipient: &str, text: &str) -> Result<bool> {
        self.deliveries
            .lock()
            .unwrap()
            .push((recipient.to_string(), text.to_string()));
        if self.fail {
            Err(LatchError::Io("transport down".to_string()))
        } else {
            Ok(true)
        }
    }
}

/// Writes to the ledger file from inside a delivery, the way a concurrent
/// process would while a sweep is busy.
struct InterferingNotifier {
    store: VersionedFile<PendingAck>,
    remaining: AtomicUsize,
    deliveries: AtomicUsize,
}

impl Notifier for InterferingNotifier {
    fn deliver(&self, _recipient: &str, _text: &str) -> Result<bool> {
        self.deliveries.fetch_add(1, Ordering::SeqCst);
        let fire = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fire {
            let entry = PendingAck::new("intruder", "a2", json!("late"), &policy(3), Utc::now());
            self.store.update(|items| {
                items.push(entry.clone());
                Change::Modified(())
            })?;
        }
        Ok(true)
    }
}

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base: Duration::from_secs(30),
        cap: Duration::from_secs(100),
    }
}

fn ledger_path(dir: &TempDir) -> PathBuf {
    dir.path().join("acks.json")
}

fn store(path: &Path, attempts: u32) -> VersionedFile<PendingAck> {
    VersionedFile::new(
        path,
        WriteRetry {
            attempts,
            base_delay: Duration::from_millis(1),
        },
    )
}

fn ledger(dir: &TempDir, policy: RetryPolicy, notifier: Arc<dyn Notifier>) -> AckLedger {
    let agents = ["a1", "a2", "a3"].iter().map(|a| a.to_string()).collect();
    AckLedger::new(
        store(&ledger_path(dir), 50),
        policy,
        notifier,
        Arc::new(StaticDirectory::new(agents)),
    )
    .with_events(EventLog::new(dir.path().join("events.ndjson")))
}

fn far_future() -> DateTime<Utc> {
    Utc::now() + TimeDelta::days(365)
}

#[test]
fn test_track_then_confirm_leaves_nothing_to_resend() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let ledger = ledger(&dir, policy(3), notifier.clone());

    let id = ledger.track("a1", "a2", json!({"op": "review"})).unwrap();
    assert!(ledger.confirm(&id).unwrap());

    assert!(ledger.pending(None).unwrap().is_empty());
    let report = ledger.sweep_at(far_future()).unwrap();
    assert_eq!(report.processed, 0);
    assert!(notifier.recipients().is_empty());
}

#[test]
fn test_confirm_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let ledger = ledger(&dir, policy(3), Arc::new(RecordingNotifier::default()));

    let id = ledger.track("a1", "a2", Value::Null).unwrap();

    assert!(ledger.confirm(&id).unwrap());
    assert!(!ledger.confirm(&id).unwrap());
    assert!(!ledger.confirm("never-tracked").unwrap());
}

#[test]
fn test_track_validates_identities() {
    let dir = TempDir::new().unwrap();
    let ledger = ledger(&dir, policy(3), Arc::new(RecordingNotifier::default()));

    for (sender, recipient) in [("", "a2"), ("a1", "bad id"), ("-x", "a2")] {
        let err = ledger.track(sender, recipient, Value::Null).unwrap_err();
        assert!(matches!(err, LatchError::Validation(_)));
    }
    assert!(!ledger_path(&dir).exists());
}

#[test]
fn test_pending_filters_by_recipient() {
    let dir = TempDir::new().unwrap();
    let ledger = ledger(&dir, policy(3), Arc::new(RecordingNotifier::default()));

    let first = ledger.track("a1", "a2", json!("one")).unwrap();
    ledger.track("a1", "a3", json!("two")).unwrap();
    let third = ledger.track("a3", "a2", json!("three")).unwrap();

    assert_eq!(ledger.pending(None).unwrap().len(), 3);
    let ids: Vec<_> = ledger
        .pending(Some("a2"))
        .unwrap()
        .into_iter()
        .map(|e| e.message_id)
        .collect();
    assert_eq!(ids, vec![first, third]);
}

#[test]
fn test_entries_not_yet_due_are_left_alone() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let ledger = ledger(&dir, policy(3), notifier.clone());
    ledger.track("a1", "a2", Value::Null).unwrap();
    let version = store(&ledger_path(&dir), 1).load().unwrap().version;

    let report = ledger.sweep().unwrap();

    assert_eq!(report.processed, 0);
    assert_eq!(report.attempts, 1);
    assert!(notifier.recipients().is_empty());
    assert_eq!(store(&ledger_path(&dir), 1).load().unwrap().version, version);
}

#[test]
fn test_resend_backs_off_exponentially() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let ledger = ledger(&dir, policy(5), notifier.clone());
    let id = ledger.track("a1", "a2", json!("ping")).unwrap();

    let mut now = ledger.pending(None).unwrap()[0].next_retry_at;
    for (resend, expected_gap) in [(1, 30), (2, 60), (3, 100)] {
        let report = ledger.sweep_at(now).unwrap();
        assert_eq!(report.resent, 1);

        let entry = ledger.pending(None).unwrap().remove(0);
        assert_eq!(entry.retry_count, resend);
        assert_eq!((entry.next_retry_at - now).num_seconds(), expected_gap);
        now = entry.next_retry_at;
    }

    assert_eq!(notifier.count_to("a2"), 3);
    let (_, text) = notifier.deliveries.lock().unwrap()[0].clone();
    assert!(text.contains(&id));
    assert!(text.contains("ping"));
}

#[test]
fn test_unconfirmed_message_is_resent_max_times_then_escalated_once() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let ledger = ledger(&dir, policy(3), notifier.clone());
    ledger.track("a1", "a2", json!("deploy?")).unwrap();

    let start = far_future();
    let mut escalated = 0;
    for day in 0..10 {
        let report = ledger.sweep_at(start + TimeDelta::days(day)).unwrap();
        escalated += report.escalated;
    }

    assert_eq!(escalated, 1);
    // Three resends to the recipient; the escalation skips it.
    assert_eq!(notifier.count_to("a2"), 3);
    assert_eq!(notifier.count_to("a1"), 1);
    assert_eq!(notifier.count_to("a3"), 1);
    assert!(ledger.pending(None).unwrap().is_empty());

    let escalation = notifier
        .deliveries
        .lock()
        .unwrap()
        .iter()
        .find(|(r, _)| r == "a3")
        .map(|(_, t)| t.clone())
        .unwrap();
    assert!(escalation.contains("a2 did not acknowledge"));
}

#[test]
fn test_zero_retries_escalates_on_first_overdue_sweep() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let ledger = ledger(&dir, policy(0), notifier.clone());
    ledger.track("a1", "a2", Value::Null).unwrap();

    let report = ledger.sweep_at(far_future()).unwrap();

    assert_eq!(report.resent, 0);
    assert_eq!(report.escalated, 1);
    assert_eq!(notifier.count_to("a2"), 0);
    assert!(ledger.pending(None).unwrap().is_empty());
}

#[test]
fn test_failed_delivery_counts_as_attempt() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(RecordingNotifier::failing());
    let ledger = ledger(&dir, policy(2), notifier.clone());
    ledger.track("a1", "a2", Value::Null).unwrap();

    let report = ledger.sweep_at(far_future()).unwrap();

    assert_eq!(report.resent, 1);
    assert_eq!(ledger.pending(None).unwrap()[0].retry_count, 1);
}

#[test]
fn test_sweep_restarts_when_ledger_changes_underneath() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(InterferingNotifier {
        store: store(&ledger_path(&dir), 50),
        remaining: AtomicUsize::new(1),
        deliveries: AtomicUsize::new(0),
    });
    let ledger = ledger(&dir, policy(3), notifier.clone());
    ledger.track("a1", "a2", json!("original")).unwrap();
    let due = ledger.pending(None).unwrap()[0].next_retry_at;

    let report = ledger.sweep_at(due).unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(report.resent, 1);
    // The first attempt's resend is repeated on the fresh read.
    assert_eq!(notifier.deliveries.load(Ordering::SeqCst), 2);

    let pending = ledger.pending(None).unwrap();
    assert_eq!(pending.len(), 2);
    let original = pending.iter().find(|e| e.sender == "a1").unwrap();
    let intruder = pending.iter().find(|e| e.sender == "intruder").unwrap();
    assert_eq!(original.retry_count, 1);
    assert_eq!(intruder.retry_count, 0);
}

#[test]
fn test_exhausted_sweep_leaves_ledger_unchanged() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(InterferingNotifier {
        store: store(&ledger_path(&dir), 50),
        remaining: AtomicUsize::new(usize::MAX),
        deliveries: AtomicUsize::new(0),
    });
    let ledger = AckLedger::new(
        store(&ledger_path(&dir), 3),
        policy(3),
        notifier,
        Arc::new(StaticDirectory::default()),
    );
    ledger.track("a1", "a2", Value::Null).unwrap();
    let due = ledger.pending(None).unwrap()[0].next_retry_at;

    let err = ledger.sweep_at(due).unwrap_err();

    assert!(matches!(err, LatchError::Contention(_)));
    let pending = ledger.pending(None).unwrap();
    let original = pending.iter().find(|e| e.sender == "a1").unwrap();
    assert_eq!(original.retry_count, 0);
    assert_eq!(pending.iter().filter(|e| e.sender == "intruder").count(), 3);
}

#[test]
fn test_no_lost_updates_under_contention() {
    let dir = TempDir::new().unwrap();
    let ledger = Arc::new(AckLedger::new(
        store(&ledger_path(&dir), 500),
        policy(1_000),
        Arc::new(RecordingNotifier::default()),
        Arc::new(StaticDirectory::default()),
    ));

    let workers: Vec<_> = (0..4)
        .map(|w| {
            let ledger = Arc::clone(&ledger);
            std::thread::spawn(move || {
                let mut kept = Vec::new();
                for n in 0..10 {
                    let id = ledger
                        .track(&format!("s{}", w), "r", json!(n))
                        .unwrap();
                    if n % 2 == 0 {
                        assert!(ledger.confirm(&id).unwrap());
                    } else {
                        kept.push(id);
                    }
                }
                kept
            })
        })
        .collect();

    let sweeper = {
        let ledger = Arc::clone(&ledger);
        std::thread::spawn(move || {
            for _ in 0..20 {
                match ledger.sweep_at(far_future()) {
                    Ok(_) | Err(LatchError::Contention(_)) => {}
                    Err(e) => panic!("unexpected sweep error: {}", e),
                }
            }
        })
    };

    let expected: BTreeSet<String> = workers
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    sweeper.join().unwrap();

    let actual: BTreeSet<String> = ledger
        .pending(None)
        .unwrap()
        .into_iter()
        .map(|e| e.message_id)
        .collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_legacy_ledger_without_version() {
    let dir = TempDir::new().unwrap();
    let entry = PendingAck::new("a1", "a2", json!("old"), &policy(3), Utc::now());
    std::fs::write(
        ledger_path(&dir),
        serde_json::to_string(&vec![entry.clone()]).unwrap(),
    )
    .unwrap();
    let ledger = ledger(&dir, policy(3), Arc::new(RecordingNotifier::default()));

    assert_eq!(ledger.pending(None).unwrap(), vec![entry.clone()]);
    assert!(ledger.confirm(&entry.message_id).unwrap());

    let snapshot = store(&ledger_path(&dir), 1).load().unwrap();
    assert_eq!(snapshot.version, 1);
    assert!(snapshot.items.is_empty());
}

#[test]
fn test_state_changes_are_recorded() {
    let dir = TempDir::new().unwrap();
    let ledger = ledger(&dir, policy(0), Arc::new(RecordingNotifier::default()));

    let confirmed = ledger.track("a1", "a2", Value::Null).unwrap();
    ledger.confirm(&confirmed).unwrap();
    ledger.track("a1", "a3", Value::Null).unwrap();
    ledger.sweep_at(far_future()).unwrap();

    let actions: Vec<_> = EventLog::new(dir.path().join("events.ndjson"))
        .read_all()
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            EventAction::AckTrack,
            EventAction::AckConfirm,
            EventAction::AckTrack,
            EventAction::AckEscalate,
        ]
    );
}

#[test]
fn test_sweep_worker_runs_until_shutdown() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let fast = RetryPolicy {
        max_retries: 1_000,
        base: Duration::from_millis(1),
        cap: Duration::from_millis(1),
    };
    let ledger = Arc::new(ledger(&dir, fast, notifier.clone()));
    ledger.track("a1", "a2", Value::Null).unwrap();

    let worker = SweepWorker::spawn(Arc::clone(&ledger), Duration::from_millis(10)).unwrap();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while notifier.count_to("a2") < 2 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    worker.shutdown();

    assert!(notifier.count_to("a2") >= 2);
    let after_shutdown = notifier.count_to("a2");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(notifier.count_to("a2"), after_shutdown);
}
