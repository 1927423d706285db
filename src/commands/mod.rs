//! Command implementations for latch.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Every command produces one JSON document; `main` prints
//! it and exits with the command's exit code.

mod ack;
mod init;
mod lock;

use crate::cli::{AckAction, Command, LockAction};
use crate::context::{ProjectContext, require_initialized};
use crate::error::Result;
use crate::exit_codes;
use serde_json::Value;
use std::path::Path;

/// What a command prints and how the process exits.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    /// JSON document for stdout; `None` if the command already printed it.
    pub body: Option<Value>,
    pub exit_code: i32,
}

impl Output {
    pub fn success(body: Value) -> Self {
        Self {
            body: Some(body),
            exit_code: exit_codes::SUCCESS,
        }
    }

    /// A definite "no" that is not an error, such as a lock conflict.
    pub fn refused(body: Value) -> Self {
        Self {
            body: Some(body),
            exit_code: exit_codes::FAILURE,
        }
    }

    pub fn printed() -> Self {
        Self {
            body: None,
            exit_code: exit_codes::SUCCESS,
        }
    }
}

/// Dispatch a command to its implementation.
///
/// `root` is the global `--root` flag.
pub fn dispatch(root: Option<&Path>, command: Command) -> Result<Output> {
    match command {
        Command::Init => init::cmd_init(&ProjectContext::resolve(root)?),
        Command::Lock(lock_cmd) => {
            let ctx = require_initialized(root)?;
            match lock_cmd.action {
                LockAction::Acquire(args) => lock::cmd_acquire(&ctx, args),
                LockAction::Release(args) => lock::cmd_release(&ctx, args),
                LockAction::Query(args) => lock::cmd_query(&ctx, args),
                LockAction::List(args) => lock::cmd_list(&ctx, args),
                LockAction::Cleanup(args) => lock::cmd_cleanup(&ctx, args),
            }
        }
        Command::Ack(ack_cmd) => {
            let ctx = require_initialized(root)?;
            match ack_cmd.action {
                AckAction::Track(args) => ack::cmd_track(&ctx, args),
                AckAction::Confirm(args) => ack::cmd_confirm(&ctx, args),
                AckAction::Pending(args) => ack::cmd_pending(&ctx, args),
                AckAction::Sweep(args) => ack::cmd_sweep(&ctx, args),
            }
        }
    }
}
