//! Version-stamped collection store.
//!
//! A shared collection lives in one JSON file wrapped in an envelope:
//!
//! ```json
//! {"version": 7, "items": [...]}
//! ```
//!
//! Writers follow read → decide → commit. A commit names the version it was
//! computed from and is rejected with [`Commit::VersionMismatch`] if the file
//! has moved on since, so a concurrent update is detected and retried instead
//! of silently overwritten.

mod versioned;

#[cfg(test)]
mod tests;

pub use versioned::{Change, Commit, Snapshot, VersionedFile, WriteRetry};
