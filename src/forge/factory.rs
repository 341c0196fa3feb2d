//! forge::factory
//!
//! Forge construction from configuration.
//!
//! Commands call [`create_forge`] and receive a shared trait object, so they
//! never import a concrete forge implementation.

use std::sync::Arc;

use super::github::GitHubForge;
use super::traits::Forge;
use crate::core::config::{Config, ConfigError};

/// Create the forge a pipeline should run against.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if no target repository is known.
/// A missing token is allowed; the remote decides whether anonymous
/// access suffices.
pub fn create_forge(config: &Config) -> Result<Arc<dyn Forge>, ConfigError> {
    let (owner, repo) = config.repository().ok_or_else(|| {
        ConfigError::InvalidValue(
            "no repository configured; pass --repo owner/name or set [defaults] owner and repo"
                .to_string(),
        )
    })?;

    if config.token().is_none() {
        tracing::warn!("no token configured; requests will be anonymous");
    }

    let forge = GitHubForge::with_api_base(
        config.token().map(str::to_string),
        owner,
        repo,
        config.api_base(),
    );
    tracing::debug!(?forge, "created forge");
    Ok(Arc::new(forge))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_repository() {
        let config = Config::default().with_token("t");
        assert!(create_forge(&config).is_err());
    }

    #[test]
    fn creates_github_forge() {
        let config = Config::default()
            .with_overrides(Some("octocat/hello-world"), None)
            .unwrap();
        let forge = create_forge(&config).unwrap();
        assert_eq!(forge.name(), "github");
    }
}
