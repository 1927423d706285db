//! Tests for the versioned collection store.

use super::*;
use crate::error::LatchError;
use std::fs;
use std::sync::{Arc, Barrier};
use std::time::Duration;
use tempfile::TempDir;

fn store(dir: &TempDir) -> VersionedFile<String> {
    VersionedFile::new(
        dir.path().join("items.json"),
        WriteRetry {
            attempts: 50,
            base_delay: Duration::from_millis(1),
        },
    )
}

#[test]
fn test_missing_file_is_empty_version_zero() {
    let dir = TempDir::new().unwrap();
    let snapshot = store(&dir).load().unwrap();

    assert_eq!(snapshot.version, 0);
    assert!(snapshot.items.is_empty());
}

#[test]
fn test_legacy_envelope_without_version_reads_as_zero() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("items.json"), r#"{"items":["a","b"]}"#).unwrap();

    let snapshot = store(&dir).load().unwrap();

    assert_eq!(snapshot.version, 0);
    assert_eq!(snapshot.items, vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_legacy_bare_array_reads_as_zero() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("items.json"), r#"["a"]"#).unwrap();

    let snapshot = store(&dir).load().unwrap();

    assert_eq!(snapshot.version, 0);
    assert_eq!(snapshot.items, vec!["a".to_string()]);
}

#[test]
fn test_corrupt_file_reads_as_empty_and_is_replaced() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("items.json"), "{not json").unwrap();
    let store = store(&dir);

    let snapshot = store.load().unwrap();
    assert_eq!(snapshot.version, 0);
    assert!(snapshot.items.is_empty());

    let outcome = store.commit(0, &["fresh".to_string()]).unwrap();
    assert_eq!(outcome, Commit::Applied { version: 1 });
    assert_eq!(store.load().unwrap().items, vec!["fresh".to_string()]);
}

#[test]
fn test_commit_increments_version_by_one() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    assert_eq!(
        store.commit(0, &["a".to_string()]).unwrap(),
        Commit::Applied { version: 1 }
    );
    assert_eq!(
        store.commit(1, &["a".to_string(), "b".to_string()]).unwrap(),
        Commit::Applied { version: 2 }
    );

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(raw["version"], 2);
    assert_eq!(raw["items"], serde_json::json!(["a", "b"]));
}

#[test]
fn test_stale_commit_is_rejected_and_not_applied() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);
    store.commit(0, &["first".to_string()]).unwrap();

    // A writer that read version 0 before the first commit landed.
    let outcome = store.commit(0, &["lost-update".to_string()]).unwrap();

    assert_eq!(
        outcome,
        Commit::VersionMismatch {
            expected: 0,
            found: 1
        }
    );
    let snapshot = store.load().unwrap();
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.items, vec!["first".to_string()]);
}

#[test]
fn test_update_unchanged_skips_write() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir);

    let result = store.update(|_items| Change::Unchanged(42)).unwrap();

    assert_eq!(result, 42);
    assert!(!store.path().exists());
}

#[test]
fn test_update_gives_up_with_contention_error() {
    let dir = TempDir::new().unwrap();
    let store = VersionedFile::<String>::new(
        dir.path().join("items.json"),
        WriteRetry {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        },
    );
    let competitor = store.clone();
    let mut calls = 0;

    // Every attempt is overtaken by a competing writer before it commits.
    let result = store.update(|items| {
        calls += 1;
        let snapshot = competitor.load().unwrap();
        competitor.commit(snapshot.version, &snapshot.items).unwrap();
        items.push("mine".to_string());
        Change::Modified(())
    });

    assert!(matches!(result, Err(LatchError::Contention(_))));
    assert_eq!(calls, 3);
    assert!(!store.load().unwrap().items.contains(&"mine".to_string()));
}

#[test]
fn test_concurrent_updates_lose_nothing() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(store(&dir));
    let workers = 8;
    let per_worker = 5;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|w| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                for i in 0..per_worker {
                    let item = format!("w{}-{}", w, i);
                    store
                        .update(|items| {
                            items.push(item.clone());
                            Change::Modified(())
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = store.load().unwrap();
    assert_eq!(snapshot.items.len(), workers * per_worker);
    assert_eq!(snapshot.version, (workers * per_worker) as u64);
    for w in 0..workers {
        for i in 0..per_worker {
            assert!(snapshot.items.contains(&format!("w{}-{}", w, i)));
        }
    }
}

#[test]
fn test_write_retry_delay_grows_exponentially() {
    let retry = WriteRetry {
        attempts: 5,
        base_delay: Duration::from_millis(10),
    };
    assert_eq!(retry.delay(0), Duration::from_millis(10));
    assert_eq!(retry.delay(1), Duration::from_millis(20));
    assert_eq!(retry.delay(3), Duration::from_millis(80));
}
