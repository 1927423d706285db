//! Optimistic-concurrency file store.

use crate::error::{LatchError, Result};
use crate::fs::atomic_write;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// A collection as read from disk, with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub version: u64,
    pub items: Vec<T>,
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// The write landed; the file is now at `version`.
    Applied { version: u64 },
    /// Another writer got there first. Nothing was written.
    VersionMismatch { expected: u64, found: u64 },
}

/// What an [`VersionedFile::update`] closure did to the collection.
#[derive(Debug)]
pub enum Change<R> {
    /// Items were modified and must be committed.
    Modified(R),
    /// Nothing to write.
    Unchanged(R),
}

/// Retry budget for optimistic writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRetry {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl WriteRetry {
    /// Delay before retrying after the given (zero-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(10))
    }
}

impl Default for WriteRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(10),
        }
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u64,
    items: &'a [T],
}

/// On-disk shapes accepted when reading. Files written before versioning
/// have no `version` (or are a bare array) and read as version 0.
#[derive(Deserialize)]
#[serde(untagged)]
enum OnDisk<T> {
    Envelope {
        #[serde(default)]
        version: u64,
        #[serde(default = "Vec::new")]
        items: Vec<T>,
    },
    Bare(Vec<T>),
}

/// Handle to one versioned collection file.
///
/// Cheap to construct; holds no open files between calls.
#[derive(Debug, Clone)]
pub struct VersionedFile<T> {
    path: PathBuf,
    guard_path: PathBuf,
    retry: WriteRetry,
    _items: PhantomData<fn() -> T>,
}

impl<T> VersionedFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new<P: Into<PathBuf>>(path: P, retry: WriteRetry) -> Self {
        let path = path.into();
        let mut guard_name = path.as_os_str().to_owned();
        guard_name.push(".lock");
        Self {
            path,
            guard_path: PathBuf::from(guard_name),
            retry,
            _items: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn retry(&self) -> WriteRetry {
        self.retry
    }

    /// Read the collection and its version.
    ///
    /// A missing file is an empty collection at version 0. An unparsable file
    /// is treated the same way; the next successful commit replaces it.
    pub fn load(&self) -> Result<Snapshot<T>> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Snapshot {
                    version: 0,
                    items: Vec::new(),
                });
            }
            Err(e) => {
                return Err(LatchError::Io(format!(
                    "failed to read '{}': {}",
                    self.path.display(),
                    e
                )));
            }
        };

        match serde_json::from_slice::<OnDisk<T>>(&content) {
            Ok(OnDisk::Envelope { version, items }) => Ok(Snapshot { version, items }),
            Ok(OnDisk::Bare(items)) => Ok(Snapshot { version: 0, items }),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "unparsable collection treated as empty"
                );
                Ok(Snapshot {
                    version: 0,
                    items: Vec::new(),
                })
            }
        }
    }

    /// Write `items` as version `expected + 1`, but only if the file is still
    /// at `expected`.
    ///
    /// The compare and the rename happen under an advisory lock on a sidecar
    /// file so two processes cannot both pass the check. The lock covers only
    /// this window; callers do their real work without it.
    pub fn commit(&self, expected: u64, items: &[T]) -> Result<Commit> {
        let next = expected + 1;
        let body = serde_json::to_vec_pretty(&EnvelopeRef {
            version: next,
            items,
        })
        .map_err(|e| {
            LatchError::Serialization(format!(
                "failed to serialize '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        let guard = self.lock_guard()?;

        let found = self.load()?.version;
        let outcome = if found != expected {
            Commit::VersionMismatch { expected, found }
        } else {
            atomic_write(&self.path, &body)?;
            Commit::Applied { version: next }
        };

        let _ = FileExt::unlock(&guard);
        Ok(outcome)
    }

    /// Read, apply `f`, and commit, retrying from a fresh read on version
    /// mismatch until the retry budget runs out.
    ///
    /// `f` may run several times and must derive its result from the items it
    /// is given each time.
    pub fn update<R, F>(&self, mut f: F) -> Result<R>
    where
        F: FnMut(&mut Vec<T>) -> Change<R>,
    {
        for attempt in 0..self.retry.attempts {
            let Snapshot { version, mut items } = self.load()?;

            let result = match f(&mut items) {
                Change::Unchanged(result) => return Ok(result),
                Change::Modified(result) => result,
            };

            match self.commit(version, &items)? {
                Commit::Applied { .. } => return Ok(result),
                Commit::VersionMismatch { expected, found } => {
                    debug!(
                        path = %self.path.display(),
                        attempt,
                        expected,
                        found,
                        "version mismatch, retrying from fresh read"
                    );
                    if attempt + 1 < self.retry.attempts {
                        thread::sleep(self.retry.delay(attempt));
                    }
                }
            }
        }

        Err(LatchError::Contention(format!(
            "gave up writing '{}' after {} attempts",
            self.path.display(),
            self.retry.attempts
        )))
    }

    fn lock_guard(&self) -> Result<File> {
        if let Some(parent) = self.guard_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                LatchError::Io(format!(
                    "failed to create directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.guard_path)
            .map_err(|e| {
                LatchError::Io(format!(
                    "failed to open '{}': {}",
                    self.guard_path.display(),
                    e
                ))
            })?;

        file.lock_exclusive().map_err(|e| {
            LatchError::Io(format!(
                "failed to lock '{}': {}",
                self.guard_path.display(),
                e
            ))
        })?;

        Ok(file)
    }
}
