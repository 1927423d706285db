//! Implementation of the `latch ack` subcommands.

use crate::ack::{AckLedger, SweepWorker};
use crate::cli::{ConfirmArgs, PendingArgs, SweepArgs, TrackArgs};
use crate::config::Config;
use crate::context::ProjectContext;
use crate::error::{LatchError, Result};
use serde_json::{Value, json};
use std::io::Write;
use std::sync::Arc;
use tracing::info;

use super::Output;

fn open_ledger(ctx: &ProjectContext) -> Result<(Config, AckLedger)> {
    let config = Config::load_or_default(ctx.config_path())?;
    let ledger = AckLedger::open(ctx, &config)?;
    Ok((config, ledger))
}

/// JSON if it parses as JSON, otherwise the raw text as a JSON string.
fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn cmd_track(ctx: &ProjectContext, args: TrackArgs) -> Result<Output> {
    let (_, ledger) = open_ledger(ctx)?;
    let message_id = ledger.track(&args.sender, &args.recipient, parse_payload(&args.payload))?;

    Ok(Output::success(json!({ "message_id": message_id })))
}

pub fn cmd_confirm(ctx: &ProjectContext, args: ConfirmArgs) -> Result<Output> {
    let (_, ledger) = open_ledger(ctx)?;
    let confirmed = ledger.confirm(&args.message_id)?;

    Ok(Output::success(json!({
        "message_id": args.message_id,
        "confirmed": confirmed,
    })))
}

pub fn cmd_pending(ctx: &ProjectContext, args: PendingArgs) -> Result<Output> {
    let (_, ledger) = open_ledger(ctx)?;
    let pending = ledger.pending(args.recipient.as_deref())?;

    Ok(Output::success(json!({
        "count": pending.len(),
        "pending": pending,
    })))
}

pub fn cmd_sweep(ctx: &ProjectContext, args: SweepArgs) -> Result<Output> {
    let (config, ledger) = open_ledger(ctx)?;
    let report = ledger.sweep()?;

    if !args.watch {
        return Ok(Output::success(json!({ "report": report })));
    }

    // Announce before blocking; this is the command's only stdout output.
    let interval = config.sweep_interval();
    let announcement = json!({
        "watching": true,
        "interval_seconds": interval.as_secs(),
        "report": report,
    });
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", announcement)
        .and_then(|()| stdout.flush())
        .map_err(|e| LatchError::Io(format!("failed to write to stdout: {}", e)))?;
    drop(stdout);

    info!(interval_seconds = interval.as_secs(), "sweeping until interrupted");
    SweepWorker::spawn(Arc::new(ledger), interval)?.join();
    Ok(Output::printed())
}
