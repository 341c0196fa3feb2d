//! cli
//!
//! Command-line interface layer for forgepipe.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Load configuration and pipeline files
//! - Delegate execution to [`crate::engine`] and print results
//!
//! The CLI is the only layer that uses `anyhow`; everything below it
//! returns typed errors.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use anyhow::Result;

/// Global options shared by every command. `--debug` is consumed by the
/// log filter in `main.rs`.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub repo: Option<String>,
    pub api_base: Option<String>,
}

/// Run the CLI application with already parsed arguments.
///
/// This is the main entry point called from `main.rs`.
pub fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        repo: cli.repo,
        api_base: cli.api_base,
    };

    commands::dispatch(cli.command, &ctx)
}
