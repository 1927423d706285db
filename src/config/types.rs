//! Configuration defaults for latch.
//!
//! Message-level retry settings (`ack_*`) and store write-conflict settings
//! (`store_*`) are separate knobs.

// Default value functions for serde
pub(crate) fn default_lock_stale_seconds() -> u64 {
    3600
}
pub(crate) fn default_reason_max_len() -> usize {
    256
}
pub(crate) fn default_ack_max_retries() -> u32 {
    3
}
pub(crate) fn default_ack_retry_base_seconds() -> u64 {
    30
}
pub(crate) fn default_ack_retry_max_seconds() -> u64 {
    900
}
pub(crate) fn default_store_write_attempts() -> u32 {
    5
}
pub(crate) fn default_store_retry_base_ms() -> u64 {
    10
}
pub(crate) fn default_sweep_interval_seconds() -> u64 {
    30
}
