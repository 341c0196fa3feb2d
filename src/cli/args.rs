//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging
//! - `--repo <owner/name>`: Target repository, overriding config
//! - `--api-base <url>`: REST API base URL, overriding config

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fpipe - Run declarative tree, commit, branch and PR pipelines against GitHub
#[derive(Parser, Debug)]
#[command(name = "fpipe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Target repository as owner/name
    #[arg(long, global = true, value_name = "OWNER/NAME")]
    pub repo: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, global = true, value_name = "URL")]
    pub api_base: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute every step of a pipeline file in order
    #[command(
        long_about = "Execute every step of a pipeline file in order.\n\n\
            Steps run sequentially against the configured repository. The first \
            failing step stops the run; steps that already completed are not \
            rolled back.",
        after_help = "\
EXAMPLES:
    # Run a pipeline against the configured repository
    fpipe run pipeline.toml

    # Run against another repository with debug logging
    fpipe --debug --repo octo/hello run pipeline.toml"
    )]
    Run {
        /// Pipeline file
        file: PathBuf,
    },

    /// Show the steps a pipeline file declares without contacting the forge
    Plan {
        /// Pipeline file
        file: PathBuf,
    },

    /// Generate shell completion scripts
    #[command(after_help = "\
EXAMPLES:
    # Bash
    fpipe completion bash > ~/.local/share/bash-completion/completions/fpipe

    # Zsh
    fpipe completion zsh > ~/.zfunc/_fpipe")]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "fpipe",
            "run",
            "pipeline.toml",
            "--repo",
            "octo/hello",
            "--debug",
        ])
        .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.repo.as_deref(), Some("octo/hello"));
        assert!(matches!(cli.command, Command::Run { .. }));
    }

    #[test]
    fn completion_requires_known_shell() {
        assert!(Cli::try_parse_from(["fpipe", "completion", "tcsh"]).is_err());
    }
}
