//! Delivery and discovery collaborators.
//!
//! The ledger never talks to agents or enumerates them itself; it goes
//! through these two traits, and assumes either call may block.

use crate::error::{LatchError, Result};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Sends text to one agent.
pub trait Notifier: Send + Sync {
    /// `Ok(false)` means "not delivered, try again later". So does `Err`.
    fn deliver(&self, recipient: &str, text: &str) -> Result<bool>;
}

/// Supplies the identities of agents that are currently alive.
pub trait AgentDirectory: Send + Sync {
    fn live_agents(&self) -> Result<Vec<String>>;
}

/// Delivers by running an external command, no shell involved.
///
/// `{recipient}` and `{text}` are substituted inside each argument after
/// splitting, so message text can never inject extra arguments.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    /// Split `template` with shell-words rules.
    pub fn parse(template: &str) -> Result<Self> {
        let mut words = shell_words::split(template).map_err(|e| {
            LatchError::Validation(format!(
                "failed to parse notify_command '{}': {}\n\n\
                 Fix: check for unmatched quotes or invalid escape sequences in config.yaml notify_command.",
                template, e
            ))
        })?;

        if words.is_empty() {
            return Err(LatchError::Validation(
                "notify_command is empty after parsing.".to_string(),
            ));
        }

        let program = words.remove(0);
        Ok(Self {
            program,
            args: words,
        })
    }

    /// Argument vector for one delivery.
    pub fn render(&self, recipient: &str, text: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace("{recipient}", recipient).replace("{text}", text))
            .collect()
    }
}

impl Notifier for CommandNotifier {
    fn deliver(&self, recipient: &str, text: &str) -> Result<bool> {
        let output = Command::new(&self.program)
            .args(self.render(recipient, text))
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                LatchError::Io(format!(
                    "failed to execute notify_command '{}': {}",
                    self.program, e
                ))
            })?;

        if !output.status.success() {
            debug!(
                recipient,
                program = %self.program,
                code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "notify command failed"
            );
        }
        Ok(output.status.success())
    }
}

/// Used when no transport is configured: logs the message and reports it as
/// not delivered.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, recipient: &str, text: &str) -> Result<bool> {
        info!(recipient, text, "no notify_command configured; message not delivered");
        Ok(false)
    }
}

/// Fixed list of agents, typically from `config.yaml`.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    agents: Vec<String>,
}

impl StaticDirectory {
    pub fn new(agents: Vec<String>) -> Self {
        Self { agents }
    }
}

impl AgentDirectory for StaticDirectory {
    fn live_agents(&self) -> Result<Vec<String>> {
        Ok(self.agents.clone())
    }
}
