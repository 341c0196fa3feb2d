//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Async Commands
//!
//! `run` performs network I/O through the async forge client. It builds a
//! tokio runtime and blocks on the pipeline so the CLI entry point stays
//! synchronous.

mod completion;
mod plan;
mod run;

pub use completion::completion;
pub use plan::plan;
pub use run::run;

use super::args::Command;
use super::Context;
use anyhow::Result;

/// Dispatch a parsed command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Run { file } => run(ctx, &file),
        Command::Plan { file } => plan(ctx, &file),
        Command::Completion { shell } => completion(shell),
    }
}
