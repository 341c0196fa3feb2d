//! plan command - Show the steps of a pipeline file

use std::path::Path;

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::core::manifest::Manifest;

/// Print one line per declared step. Never contacts the forge.
pub fn plan(ctx: &Context, file: &Path) -> Result<()> {
    let manifest = Manifest::load(file)
        .with_context(|| format!("failed to load pipeline '{}'", file.display()))?;

    if manifest.is_empty() {
        println!("{} declares no steps", file.display());
        return Ok(());
    }

    if let Some(repo) = &ctx.repo {
        println!("Pipeline for {} ({} steps):", repo, manifest.len());
    } else {
        println!("Pipeline ({} steps):", manifest.len());
    }
    for line in manifest.describe() {
        println!("  {}", line);
    }

    Ok(())
}
