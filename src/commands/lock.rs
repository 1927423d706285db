//! Implementation of the `latch lock` subcommands.

use crate::cli::{AcquireArgs, CleanupArgs, ListArgs, QueryArgs, ReleaseArgs};
use crate::config::Config;
use crate::context::ProjectContext;
use crate::error::Result;
use crate::events::EventLog;
use crate::locks::{Acquisition, LockManager, Release};
use serde_json::json;
use std::time::Duration;

use super::Output;

fn manager(ctx: &ProjectContext, config: &Config) -> LockManager {
    LockManager::new(ctx, config.lock_stale_timeout(), config.reason_max_len)
        .with_events(EventLog::new(ctx.events_file()))
}

fn timeout(config: &Config, override_seconds: Option<u64>) -> Duration {
    override_seconds
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.lock_stale_timeout())
}

pub fn cmd_acquire(ctx: &ProjectContext, args: AcquireArgs) -> Result<Output> {
    let config = Config::load_or_default(ctx.config_path())?;
    let manager = manager(ctx, &config);
    let stale_after = timeout(&config, args.stale_seconds);

    match manager.acquire(&args.resource, &args.holder, &args.reason, stale_after)? {
        Acquisition::Granted { record, kind } => Ok(Output::success(json!({
            "granted": true,
            "kind": kind,
            "lock": record,
        }))),
        Acquisition::Conflict(conflict) => Ok(Output::refused(json!({
            "granted": false,
            "conflict": conflict,
            "message": conflict.to_string(),
        }))),
    }
}

pub fn cmd_release(ctx: &ProjectContext, args: ReleaseArgs) -> Result<Output> {
    let config = Config::load_or_default(ctx.config_path())?;

    match manager(ctx, &config).release(&args.resource, &args.holder)? {
        Release::Released => Ok(Output::success(json!({
            "released": true,
            "outcome": "released",
        }))),
        Release::AlreadyReleased => Ok(Output::success(json!({
            "released": true,
            "outcome": "already_released",
        }))),
        Release::HeldByOther(conflict) => Ok(Output::refused(json!({
            "released": false,
            "conflict": conflict,
            "message": conflict.to_string(),
        }))),
    }
}

pub fn cmd_query(ctx: &ProjectContext, args: QueryArgs) -> Result<Output> {
    let config = Config::load_or_default(ctx.config_path())?;
    let lock = manager(ctx, &config).query(&args.resource)?;

    Ok(Output::success(json!({
        "locked": lock.is_some(),
        "lock": lock,
    })))
}

pub fn cmd_list(ctx: &ProjectContext, args: ListArgs) -> Result<Output> {
    let config = Config::load_or_default(ctx.config_path())?;
    let locks = manager(ctx, &config).list(args.holder.as_deref())?;

    Ok(Output::success(json!({
        "count": locks.len(),
        "locks": locks,
    })))
}

pub fn cmd_cleanup(ctx: &ProjectContext, args: CleanupArgs) -> Result<Output> {
    let config = Config::load_or_default(ctx.config_path())?;
    let manager = manager(ctx, &config);

    let removed = match &args.holder {
        Some(holder) => manager.sweep_holder(holder)?,
        None => manager.sweep_stale(timeout(&config, args.stale_seconds))?,
    };

    Ok(Output::success(json!({
        "count": removed.len(),
        "removed": removed,
    })))
}
