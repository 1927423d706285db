//! Latch: file-based resource locks and message acknowledgments for
//! cooperating agents.
//!
//! This is the main entry point for the `latch` CLI. It parses arguments,
//! dispatches to the appropriate command handler, prints the command's JSON
//! result, and exits with the command's exit code.

mod cli;
mod commands;
pub mod ack;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod fs;
pub mod identity;
pub mod locks;
pub mod logging;
pub mod store;

use clap::Parser;
use cli::Cli;
use error::LatchError;
use serde_json::json;
use std::process::ExitCode;

fn main() -> ExitCode {
    logging::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => {
            let _ = e.print();
            return ExitCode::from(exit_codes::SUCCESS as u8);
        }
        Err(e) => return fail(LatchError::Validation(e.to_string())),
    };

    match commands::dispatch(cli.root.as_deref(), cli.command) {
        Ok(output) => {
            if let Some(body) = output.body {
                println!("{}", body);
            }
            ExitCode::from(output.exit_code as u8)
        }
        Err(err) => fail(err),
    }
}

/// Report `err` as JSON on stdout and as text on stderr.
fn fail(err: LatchError) -> ExitCode {
    println!(
        "{}",
        json!({
            "ok": false,
            "error": { "kind": err.kind(), "message": err.to_string() },
        })
    );
    eprintln!("Error: {}", err.to_string().trim_end());

    ExitCode::from(err.exit_code() as u8)
}
