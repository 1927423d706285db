//! Atomic filesystem operations for latch.
//!
//! Every record latch persists goes through one of the two primitives here, so
//! a reader never observes a partially written file.
//!
//! # Implementation Strategy
//!
//! [`atomic_write`] follows this pattern:
//! 1. Write content to a temporary file in the same directory
//! 2. Sync the file to disk (fsync)
//! 3. Atomically rename it over the target
//!
//! [`create_exclusive`] writes and syncs the same kind of temporary file, then
//! publishes it with a hard link. `link()` fails if the target exists, which
//! makes "create only if absent" a single atomic step whose winner is already
//! fully written.
//!
//! # Important Notes
//!
//! - Source and destination must be on the same filesystem for atomic rename
//! - Temporary names carry the pid and a per-process counter
//!   (`.{filename}.{pid}.{n}.tmp`), so concurrent writers never share one
//! - On crash, a temporary file may remain; it is never mistaken for a record

use crate::error::{LatchError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Outcome of [`create_exclusive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The file did not exist and now holds the given content.
    Created,
    /// The file already existed; it was left untouched.
    AlreadyExists,
}

/// Atomically write bytes to a file, replacing any previous content.
///
/// On any I/O error the temporary file is removed and the target keeps its
/// previous content (or stays absent).
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    ensure_parent(path)?;

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;
    replace(&temp_path, path)?;

    Ok(())
}

/// Create a file with the given content only if it does not already exist.
///
/// Losing the race to a concurrent creator is reported as
/// [`CreateOutcome::AlreadyExists`], not as an error.
pub fn create_exclusive<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<CreateOutcome> {
    let path = path.as_ref();

    ensure_parent(path)?;

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;

    let linked = fs::hard_link(&temp_path, path);
    let _ = fs::remove_file(&temp_path);

    match linked {
        Ok(()) => {
            sync_parent(path);
            Ok(CreateOutcome::Created)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(CreateOutcome::AlreadyExists),
        // Filesystems without hard links fall back to O_EXCL.
        Err(e) if e.kind() == io::ErrorKind::Unsupported => create_new_fallback(path, content),
        Err(e) => Err(LatchError::Io(format!(
            "failed to create '{}': {}",
            path.display(),
            e
        ))),
    }
}

/// Remove a file, treating "already gone" as success.
///
/// Returns `true` if this call removed the file.
pub fn remove_if_exists<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LatchError::Io(format!(
            "failed to remove '{}': {}",
            path.display(),
            e
        ))),
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            LatchError::Io(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Generate a unique temporary file path in the same directory as the target.
fn generate_temp_path(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            LatchError::Validation(format!("invalid file path '{}'", target.display()))
        })?;

    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp_name = format!(".{}.{}.{}.tmp", filename, std::process::id(), n);
    Ok(parent.join(temp_name))
}

/// Write content to a file and sync to disk.
fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        LatchError::Io(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        LatchError::Io(format!("failed to write to temporary file: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        LatchError::Io(format!("failed to sync temporary file to disk: {}", e))
    })?;

    Ok(())
}

/// Rename `source` over `target`.
///
/// `std::fs::rename` replaces an existing destination on both POSIX and
/// Windows (`MoveFileExW` with `MOVEFILE_REPLACE_EXISTING`).
fn replace(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        LatchError::Io(format!(
            "failed to atomically replace '{}': {}",
            target.display(),
            e
        ))
    })?;

    sync_parent(target);
    Ok(())
}

/// Persist the directory entry. Best-effort; not all platforms allow it.
fn sync_parent(target: &Path) {
    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

fn create_new_fallback(path: &Path, content: &[u8]) -> Result<CreateOutcome> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Ok(CreateOutcome::AlreadyExists);
        }
        Err(e) => {
            return Err(LatchError::Io(format!(
                "failed to create '{}': {}",
                path.display(),
                e
            )));
        }
    };

    file.write_all(content)
        .and_then(|()| file.sync_all())
        .map_err(|e| {
            let _ = fs::remove_file(path);
            LatchError::Io(format!("failed to write '{}': {}", path.display(), e))
        })?;

    Ok(CreateOutcome::Created)
}
