//! run command - Execute a pipeline file against the forge

use std::path::Path;

use anyhow::{bail, Context as _, Result};

use crate::cli::Context;
use crate::core::config::Config;
use crate::core::manifest::Manifest;
use crate::engine::ResultHistory;
use crate::forge::create_forge;

/// Load config and the pipeline file, then execute every step.
///
/// Prints one line per completed step. On failure the completed prefix is
/// still printed and the error names the failing step.
pub fn run(ctx: &Context, file: &Path) -> Result<()> {
    let manifest = Manifest::load(file)
        .with_context(|| format!("failed to load pipeline '{}'", file.display()))?;

    let config = Config::load()
        .context("failed to load configuration")?
        .with_overrides(ctx.repo.as_deref(), ctx.api_base.as_deref())
        .context("invalid command-line override")?;

    if let Some(path) = config.loaded_from() {
        tracing::debug!(path = %path.display(), "using config");
    }

    let forge = create_forge(&config).context("failed to set up forge")?;
    let total = manifest.len();
    let pipeline = manifest
        .build(forge, config.draft())
        .context("failed to build pipeline")?;

    let rt = tokio::runtime::Runtime::new()?;
    match rt.block_on(pipeline.run()) {
        Ok(history) => {
            print_history(&history);
            println!("Completed {} of {} steps", history.len(), total);
            Ok(())
        }
        Err(err) => {
            print_history(&err.completed);
            bail!(
                "{} ({} of {} steps completed; completed steps were not rolled back)",
                err,
                err.completed.len(),
                total
            )
        }
    }
}

fn print_history(history: &ResultHistory) {
    for (index, output) in history.iter().enumerate() {
        println!("  {}: {}", index, output);
    }
}
