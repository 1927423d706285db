//! Acknowledgment ledger for latch.
//!
//! A sender registers a message that its recipient must confirm. Until the
//! recipient calls `confirm`, periodic sweeps resend the message with
//! exponential backoff; after `max_retries` resends it is escalated to every
//! other live agent and dropped.
//!
//! # Ledger File
//!
//! `.latch/acks.json`, a versioned envelope (see [`crate::store`]):
//!
//! ```json
//! {"version":7,"items":[{"message_id":"...","sender":"a1","recipient":"a2",
//!   "payload":{},"sent_at":"...","retry_count":1,"next_retry_at":"..."}]}
//! ```
//!
//! Delivery and agent discovery are collaborators behind the [`Notifier`] and
//! [`AgentDirectory`] traits.

mod ledger;
mod notify;
mod types;
mod worker;

#[cfg(test)]
mod tests;

// Re-export public API
pub use ledger::AckLedger;
pub use notify::{AgentDirectory, CommandNotifier, LogNotifier, Notifier, StaticDirectory};
pub use types::{PendingAck, RetryPolicy, SweepReport};
pub use worker::SweepWorker;
