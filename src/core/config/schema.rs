//! core::config::schema
//!
//! Configuration schema types.
//!
//! # File
//!
//! Located at (in order of precedence):
//! 1. `$FORGEPIPE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/forgepipe/config.toml`
//! 3. `~/.forgepipe/config.toml` (canonical write location)
//!
//! # Validation
//!
//! Config values are validated after parsing: owner and repo must be
//! non-empty when present, and the API base must be an http(s) URL.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Top-level configuration file.
///
/// # Example
///
/// ```toml
/// [github]
/// token = "ghp_xxx"
/// api_base = "https://api.github.com"
///
/// [defaults]
/// owner = "octocat"
/// repo = "hello-world"
/// draft = false
/// ```
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// GitHub connection settings
    pub github: Option<GitHubConfig>,

    /// Defaults applied to pipelines
    pub defaults: Option<DefaultsConfig>,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for FileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfig")
            .field("github", &self.github)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(github) = &self.github {
            github.validate()?;
        }
        if let Some(defaults) = &self.defaults {
            defaults.validate()?;
        }
        Ok(())
    }
}

/// GitHub connection settings.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GitHubConfig {
    /// Personal access or installation token
    pub token: Option<String>,

    /// API base URL (GitHub Enterprise: `https://host/api/v3`)
    pub api_base: Option<String>,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("has_token", &self.token.is_some())
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GitHubConfig {
    /// Validate the connection settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(api_base) = &self.api_base {
            validate_api_base(api_base)?;
        }
        if let Some(token) = &self.token {
            if token.trim().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "github.token cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Defaults applied when a pipeline file or flag does not say otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Repository owner (user or organization)
    pub owner: Option<String>,

    /// Repository name
    pub repo: Option<String>,

    /// Open pull requests as drafts
    pub draft: Option<bool>,
}

impl DefaultsConfig {
    /// Validate the defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [("owner", &self.owner), ("repo", &self.repo)] {
            if let Some(value) = value {
                if value.trim().is_empty() || value.contains('/') {
                    return Err(ConfigError::InvalidValue(format!(
                        "defaults.{} must be a non-empty name without '/'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Check that an API base is an http(s) URL.
pub fn validate_api_base(api_base: &str) -> Result<(), ConfigError> {
    if api_base.starts_with("https://") || api_base.starts_with("http://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue(format!(
            "api_base '{}' must start with http:// or https://",
            api_base
        )))
    }
}
