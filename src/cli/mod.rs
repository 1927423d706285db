//! CLI argument parsing for latch.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

/// Latch: file-based resource locks and message acknowledgments for
/// cooperating agents.
///
/// All state lives under `.latch/` in the project root:
/// - one lock record per held resource (path or glob pattern)
/// - a versioned ledger of messages awaiting confirmation
/// - an append-only audit log of every state change
///
/// Every command prints exactly one JSON object on stdout.
#[derive(Parser, Debug)]
#[command(name = "latch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root (defaults to $LATCH_ROOT, then the nearest directory
    /// containing `.latch/`, then the current directory).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for latch.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize latch state in the project root.
    ///
    /// Creates `.latch/` with the locks and events directories and a default
    /// config.yaml. Safe to run again.
    Init,

    /// Resource lock commands.
    Lock(LockCommand),

    /// Acknowledgment ledger commands.
    Ack(AckCommand),
}

/// Lock subcommands.
#[derive(Parser, Debug)]
pub struct LockCommand {
    #[command(subcommand)]
    pub action: LockAction,
}

/// Available lock actions.
#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// Take (or refresh) an exclusive lock.
    ///
    /// Never waits: if another holder has a live lock on the resource or an
    /// overlapping pattern, prints the conflict and exits 1.
    Acquire(AcquireArgs),

    /// Release a lock. Releasing an absent lock succeeds.
    Release(ReleaseArgs),

    /// Show the live lock on a resource, if any.
    Query(QueryArgs),

    /// List live locks.
    List(ListArgs),

    /// Remove stale locks, or every lock of one holder.
    Cleanup(CleanupArgs),
}

/// Arguments for `lock acquire`.
#[derive(Parser, Debug)]
pub struct AcquireArgs {
    /// File path or glob pattern, relative to the project root.
    pub resource: String,

    /// Agent identity taking the lock.
    #[arg(long)]
    pub holder: String,

    /// Free-text annotation shown to anyone who conflicts.
    #[arg(long, default_value = "")]
    pub reason: String,

    /// Override the configured staleness timeout for this call.
    #[arg(long)]
    pub stale_seconds: Option<u64>,
}

/// Arguments for `lock release`.
#[derive(Parser, Debug)]
pub struct ReleaseArgs {
    pub resource: String,

    #[arg(long)]
    pub holder: String,
}

/// Arguments for `lock query`.
#[derive(Parser, Debug)]
pub struct QueryArgs {
    pub resource: String,
}

/// Arguments for `lock list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only locks of this holder.
    #[arg(long)]
    pub holder: Option<String>,
}

/// Arguments for `lock cleanup`.
#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("criterion").required(true).args(["stale", "holder"])))]
pub struct CleanupArgs {
    /// Remove every lock older than the staleness timeout.
    #[arg(long)]
    pub stale: bool,

    /// Staleness timeout for `--stale` (defaults to config).
    #[arg(long, requires = "stale")]
    pub stale_seconds: Option<u64>,

    /// Remove every lock of this holder, live or not.
    #[arg(long)]
    pub holder: Option<String>,
}

/// Acknowledgment subcommands.
#[derive(Parser, Debug)]
pub struct AckCommand {
    #[command(subcommand)]
    pub action: AckAction,
}

/// Available acknowledgment actions.
#[derive(Subcommand, Debug)]
pub enum AckAction {
    /// Register a message the recipient must confirm. Prints its id.
    Track(TrackArgs),

    /// Confirm a message. Confirming twice is not an error.
    Confirm(ConfirmArgs),

    /// List messages awaiting confirmation.
    Pending(PendingArgs),

    /// Resend or escalate overdue messages.
    Sweep(SweepArgs),
}

/// Arguments for `ack track`.
#[derive(Parser, Debug)]
pub struct TrackArgs {
    /// Sending agent.
    #[arg(long = "from")]
    pub sender: String,

    /// Agent that must confirm.
    #[arg(long = "to")]
    pub recipient: String,

    /// Message payload: JSON, or plain text stored as a JSON string.
    pub payload: String,
}

/// Arguments for `ack confirm`.
#[derive(Parser, Debug)]
pub struct ConfirmArgs {
    pub message_id: String,
}

/// Arguments for `ack pending`.
#[derive(Parser, Debug)]
pub struct PendingArgs {
    /// Only messages addressed to this agent.
    #[arg(long = "to")]
    pub recipient: Option<String>,
}

/// Arguments for `ack sweep`.
#[derive(Parser, Debug)]
pub struct SweepArgs {
    /// Keep sweeping every `sweep_interval_seconds` until interrupted.
    #[arg(long)]
    pub watch: bool,
}
