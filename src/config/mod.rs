//! Configuration model for latch.
//!
//! This module defines the Config struct that represents `.latch/config.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.

mod model;
mod operations;
mod types;


// Re-export public API
pub use model::Config;
