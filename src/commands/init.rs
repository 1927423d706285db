//! Implementation of the `latch init` command.
//!
//! Creates `.latch/` with `locks/`, `events/`, a default `config.yaml`, and a
//! `.gitignore` that keeps machine-local state out of version control.
//!
//! Idempotent: an existing config is never overwritten, and missing pieces
//! are filled in on a second run.

use crate::config::Config;
use crate::context::ProjectContext;
use crate::error::{LatchError, Result};
use crate::events::{Event, EventAction, EventLog};
use crate::fs::atomic_write;
use serde_json::json;
use std::fs;
use std::path::Path;

use super::Output;

/// Entries the state directory's `.gitignore` must contain.
const IGNORED: &[&str] = &["locks/", "events/", "acks.json", "acks.json.lock", ".*.tmp"];

pub fn cmd_init(ctx: &ProjectContext) -> Result<Output> {
    let already_initialized = ctx.is_initialized();

    create_dir(&ctx.state_dir)?;
    create_dir(&ctx.locks_dir)?;
    create_dir(&ctx.events_dir())?;

    let config_path = ctx.config_path();
    let config_created = !config_path.exists();
    if config_created {
        atomic_write(&config_path, Config::default().to_yaml()?.as_bytes())?;
    }
    // Validate whatever is there so a broken config surfaces now.
    Config::load(&config_path)?;

    ensure_gitignore(ctx)?;

    EventLog::new(ctx.events_file()).record(Event::new(EventAction::Init).with_details(json!({
        "root": ctx.root.display().to_string(),
        "config_created": config_created,
    })));

    Ok(Output::success(json!({
        "initialized": true,
        "already_initialized": already_initialized,
        "root": ctx.root.display().to_string(),
        "state_dir": ctx.state_dir.display().to_string(),
        "config_created": config_created,
    })))
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| {
        LatchError::Io(format!(
            "failed to create directory '{}': {}",
            path.display(),
            e
        ))
    })
}

/// Append any missing entries, keeping what the user added.
fn ensure_gitignore(ctx: &ProjectContext) -> Result<()> {
    let path = ctx.state_dir.join(".gitignore");
    let existing = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(LatchError::Io(format!(
                "failed to read '{}': {}",
                path.display(),
                e
            )));
        }
    };

    let missing: Vec<&str> = IGNORED
        .iter()
        .copied()
        .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    if !content.contains("# Machine-local state") {
        content.push_str("# Machine-local state (never commit)\n");
    }
    for entry in missing {
        content.push_str(entry);
        content.push('\n');
    }
    atomic_write(&path, content.as_bytes())
}
