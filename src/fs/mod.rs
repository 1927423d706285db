//! Filesystem utilities for latch.
//!
//! This module provides the crash-safe write primitives every store in latch
//! is built on: atomic replace and exclusive create.

pub mod atomic;

pub use atomic::{CreateOutcome, atomic_write, create_exclusive, remove_if_exists};
