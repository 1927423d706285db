//! Resource lock manager for latch.
//!
//! Agents take named, exclusive holds on resources (file paths or glob
//! patterns inside the project root) so they do not edit the same files at
//! once.
//!
//! # Lock Files
//!
//! Each locked resource has one record under `.latch/locks/`, named after the
//! escaped resource (`src%2Fauth.rs.lock`). New records are published with
//! exclusive create, so of two racing agents exactly one wins; refreshes and
//! every other rewrite go through atomic rename. Nothing ever deletes and
//! recreates a record to update it.
//!
//! # Lock Records
//!
//! ```json
//! {"holder":"agent-1","resource":"src/auth.*","acquired_at":1699364215.1,"reason":"refactor"}
//! ```
//!
//! # Staleness
//!
//! A record older than the staleness timeout may be removed by anyone: by
//! another agent acquiring the resource, or opportunistically by `query` and
//! `list`. Every deletion tolerates the record already being gone.

mod manager;
mod record;
mod resource;
mod types;


// Re-export public API
pub use manager::LockManager;
pub use record::LockRecord;
pub use resource::Resource;
pub use types::{Acquisition, GrantKind, LockConflict, Release};
