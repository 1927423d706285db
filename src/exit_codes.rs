//! Exit code constants for the latch CLI.
//!
//! - 0: Success
//! - 1: Conflict or validation failure (lock held, bad resource, bad identity)
//! - 2: Unexpected error (I/O, serialization, exhausted write retries)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// Conflict or validation failure: the caller can act on the reported reason.
pub const FAILURE: i32 = 1;

/// Unexpected error: filesystem or serialization failure, or persistent contention.
pub const UNEXPECTED: i32 = 2;
