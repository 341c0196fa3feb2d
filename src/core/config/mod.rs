//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. Environment (`FORGEPIPE_TOKEN`, then `GITHUB_TOKEN`)
//! 4. CLI flags (applied through [`Config::with_overrides`])
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. `$FORGEPIPE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/forgepipe/config.toml`
//! 3. `~/.forgepipe/config.toml` (canonical write location)
//!
//! # Example
//!
//! ```no_run
//! use forgepipe::core::config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("API base: {}", config.api_base());
//! if let Some((owner, repo)) = config.repository() {
//!     println!("Target: {}/{}", owner, repo);
//! }
//! ```

pub mod schema;

pub use schema::{DefaultsConfig, FileConfig, GitHubConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::forge::github::{parse_github_url, DEFAULT_API_BASE};

/// Environment variables consulted for the token, in priority order.
pub const TOKEN_ENV_VARS: &[&str] = &["FORGEPIPE_TOKEN", "GITHUB_TOKEN"];

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Effective configuration from all sources.
///
/// Accessors apply precedence rules automatically.
#[derive(Clone, Default)]
pub struct Config {
    /// Parsed config file contents
    pub file: FileConfig,
    /// Token from the environment, overriding the file
    env_token: Option<String>,
    /// Owner/repo given on the command line
    repo_override: Option<(String, String)>,
    /// API base given on the command line
    api_base_override: Option<String>,
    /// Path the file was loaded from
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("file", &self.file)
            .field("has_env_token", &self.env_token.is_some())
            .field("repo_override", &self.repo_override)
            .field("api_base_override", &self.api_base_override)
            .field("path", &self.path)
            .finish()
    }
}

impl Config {
    /// Load configuration from the default locations and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed or
    /// fails validation. A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_from(&path)?,
            None => Config::default(),
        };
        config.env_token = TOKEN_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()));
        Ok(config)
    }

    /// Load configuration from an explicit file, ignoring the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let file = Self::read_config(path)?;
        file.validate()?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(Config {
            file,
            path: Some(path.to_path_buf()),
            ..Default::default()
        })
    }

    /// Find the first existing config file in the search order.
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check $FORGEPIPE_CONFIG
        if let Ok(path) = std::env::var("FORGEPIPE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check $XDG_CONFIG_HOME/forgepipe/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("forgepipe/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Check ~/.forgepipe/config.toml
        let path = dirs::home_dir()?.join(".forgepipe/config.toml");
        path.exists().then_some(path)
    }

    /// Read and parse a config file.
    fn read_config(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the canonical path for the config file.
    ///
    /// Returns `~/.forgepipe/config.toml`.
    pub fn global_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".forgepipe/config.toml"))
    }

    /// Write the config file atomically to the canonical location.
    pub fn write_global(config: &FileConfig) -> Result<PathBuf, ConfigError> {
        let path = Self::global_config_path()?;
        Self::write_config_atomic(&path, config)?;
        Ok(path)
    }

    /// Write a config file atomically.
    ///
    /// Creates parent directories if needed. Writes to a temp file in the
    /// same directory, then renames over the target.
    pub fn write_config_atomic(path: &Path, config: &FileConfig) -> Result<(), ConfigError> {
        config.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        file.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        file.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Apply command-line overrides.
    ///
    /// `repo` accepts `owner/name` or a GitHub remote URL.
    pub fn with_overrides(
        mut self,
        repo: Option<&str>,
        api_base: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if let Some(repo) = repo {
            self.repo_override = Some(parse_repo_slug(repo)?);
        }
        if let Some(api_base) = api_base {
            schema::validate_api_base(api_base)?;
            self.api_base_override = Some(api_base.to_string());
        }
        Ok(self)
    }

    /// Override the token, as the environment would.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.env_token = Some(token.into());
        self
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Get the API token, if any source provides one.
    pub fn token(&self) -> Option<&str> {
        self.env_token.as_deref().or_else(|| {
            self.file
                .github
                .as_ref()
                .and_then(|g| g.token.as_deref())
        })
    }

    /// Get the API base URL.
    ///
    /// Defaults to `https://api.github.com`.
    pub fn api_base(&self) -> &str {
        self.api_base_override
            .as_deref()
            .or_else(|| {
                self.file
                    .github
                    .as_ref()
                    .and_then(|g| g.api_base.as_deref())
            })
            .unwrap_or(DEFAULT_API_BASE)
    }

    /// Get the target repository as `(owner, repo)`.
    ///
    /// Returns `None` unless both halves are known.
    pub fn repository(&self) -> Option<(&str, &str)> {
        if let Some((owner, repo)) = &self.repo_override {
            return Some((owner, repo));
        }
        let defaults = self.file.defaults.as_ref()?;
        Some((defaults.owner.as_deref()?, defaults.repo.as_deref()?))
    }

    /// Check if pull requests default to draft.
    ///
    /// Defaults to `false` if not configured.
    pub fn draft(&self) -> bool {
        self.file
            .defaults
            .as_ref()
            .and_then(|d| d.draft)
            .unwrap_or(false)
    }

    /// Get the path the config file was loaded from.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Parse `owner/name` or a GitHub remote URL into its two halves.
///
/// # Example
///
/// ```
/// use forgepipe::core::config::parse_repo_slug;
///
/// let (owner, repo) = parse_repo_slug("octocat/hello-world").unwrap();
/// assert_eq!((owner.as_str(), repo.as_str()), ("octocat", "hello-world"));
/// ```
pub fn parse_repo_slug(value: &str) -> Result<(String, String), ConfigError> {
    if let Some(parsed) = parse_github_url(value) {
        return Ok(parsed);
    }
    match value.split_once('/') {
        Some((owner, repo))
            if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
        {
            Ok((owner.to_string(), repo.to_string()))
        }
        _ => Err(ConfigError::InvalidValue(format!(
            "repository '{}' must be owner/name or a GitHub URL",
            value
        ))),
    }
}
