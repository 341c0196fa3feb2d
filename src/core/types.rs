//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`Sha`] - Git object identifier as reported by the remote
//! - [`FileMode`] - Tree entry mode (file, executable, subdirectory, ...)
//! - [`ObjectType`] - Git object type a tree entry points at
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use forgepipe::core::types::{FileMode, Sha};
//!
//! let sha = Sha::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! assert_eq!(sha.short(7), "abc123d");
//! assert_eq!(FileMode::Executable.as_str(), "100755");
//!
//! // Invalid constructions fail at creation time
//! assert!(Sha::new("not-a-sha").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object id: {0}")]
    InvalidSha(String),

    #[error("invalid file mode: {0}")]
    InvalidMode(String),
}

/// A validated Git object id (SHA-1 or SHA-256, hex encoded).
///
/// The id is normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha(String);

impl Sha {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidSha` if the string is not a valid hex id.
    pub fn new(sha: impl Into<String>) -> Result<Self, TypeError> {
        let sha = sha.into().to_ascii_lowercase();
        Self::validate(&sha)?;
        Ok(Self(sha))
    }

    /// Get an abbreviated form of the id.
    ///
    /// Returns the first `len` characters, or the full id if shorter.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    fn validate(sha: &str) -> Result<(), TypeError> {
        // SHA-1 is 40 hex chars, SHA-256 is 64
        if sha.len() != 40 && sha.len() != 64 {
            return Err(TypeError::InvalidSha(format!(
                "expected 40 or 64 hex characters, got {}",
                sha.len()
            )));
        }
        if !sha.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidSha("object id must be hexadecimal".into()));
        }
        Ok(())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Sha {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Sha {
    type Error = TypeError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Sha> for String {
    fn from(sha: Sha) -> Self {
        sha.0
    }
}

impl AsRef<str> for Sha {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Sha {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mode of a tree entry.
///
/// Serializes to the octal string the Git Data API expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FileMode {
    /// Regular file (`100644`)
    File,
    /// Executable file (`100755`)
    Executable,
    /// Subdirectory (`040000`)
    Subdirectory,
    /// Submodule commit (`160000`)
    Submodule,
    /// Symbolic link (`120000`)
    Symlink,
}

impl FileMode {
    /// The octal mode string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileMode::File => "100644",
            FileMode::Executable => "100755",
            FileMode::Subdirectory => "040000",
            FileMode::Submodule => "160000",
            FileMode::Symlink => "120000",
        }
    }

    /// The object type an entry with this mode points at.
    pub fn object_type(&self) -> ObjectType {
        match self {
            FileMode::File | FileMode::Executable | FileMode::Symlink => ObjectType::Blob,
            FileMode::Subdirectory => ObjectType::Tree,
            FileMode::Submodule => ObjectType::Commit,
        }
    }

    /// Parse an octal mode string. Accepts `40000` as well as `040000`.
    pub fn parse(mode: &str) -> Result<Self, TypeError> {
        match mode {
            "100644" => Ok(FileMode::File),
            "100755" => Ok(FileMode::Executable),
            "040000" | "40000" => Ok(FileMode::Subdirectory),
            "160000" => Ok(FileMode::Submodule),
            "120000" => Ok(FileMode::Symlink),
            other => Err(TypeError::InvalidMode(other.to_string())),
        }
    }
}

impl TryFrom<String> for FileMode {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<FileMode> for String {
    fn from(mode: FileMode) -> Self {
        mode.as_str().to_string()
    }
}

impl std::fmt::Display for FileMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Git object type referenced by a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectType::Blob => write!(f, "blob"),
            ObjectType::Tree => write!(f, "tree"),
            ObjectType::Commit => write!(f, "commit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod sha {
        use super::*;

        #[test]
        fn valid_sha1() {
            let sha = Sha::new("abc123def4567890abc123def4567890abc12345").unwrap();
            assert_eq!(sha.as_str(), "abc123def4567890abc123def4567890abc12345");
        }

        #[test]
        fn valid_sha256() {
            let hex64 = "a".repeat(64);
            assert!(Sha::new(hex64).is_ok());
        }

        #[test]
        fn normalizes_to_lowercase() {
            let sha = Sha::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
            assert_eq!(sha.as_str(), "abc123def4567890abc123def4567890abc12345");
        }

        #[test]
        fn rejects_wrong_length() {
            assert!(matches!(Sha::new("abc123"), Err(TypeError::InvalidSha(_))));
        }

        #[test]
        fn rejects_non_hex() {
            let bad = "g".repeat(40);
            assert!(Sha::new(bad).is_err());
        }

        #[test]
        fn short_truncates() {
            let sha = Sha::new("abc123def4567890abc123def4567890abc12345").unwrap();
            assert_eq!(sha.short(7), "abc123d");
            assert_eq!(sha.short(100).len(), 40);
        }

        #[test]
        fn serde_roundtrip_validates() {
            let sha: Sha =
                serde_json::from_str("\"abc123def4567890abc123def4567890abc12345\"").unwrap();
            assert_eq!(sha.short(3), "abc");
            assert!(serde_json::from_str::<Sha>("\"nope\"").is_err());
        }
    }

    mod file_mode {
        use super::*;

        #[test]
        fn octal_strings() {
            assert_eq!(FileMode::File.as_str(), "100644");
            assert_eq!(FileMode::Executable.as_str(), "100755");
            assert_eq!(FileMode::Subdirectory.as_str(), "040000");
            assert_eq!(FileMode::Submodule.as_str(), "160000");
            assert_eq!(FileMode::Symlink.as_str(), "120000");
        }

        #[test]
        fn object_types() {
            assert_eq!(FileMode::File.object_type(), ObjectType::Blob);
            assert_eq!(FileMode::Symlink.object_type(), ObjectType::Blob);
            assert_eq!(FileMode::Subdirectory.object_type(), ObjectType::Tree);
            assert_eq!(FileMode::Submodule.object_type(), ObjectType::Commit);
        }

        #[test]
        fn parse_accepts_short_tree_mode() {
            assert_eq!(FileMode::parse("40000").unwrap(), FileMode::Subdirectory);
            assert!(FileMode::parse("100600").is_err());
        }

        #[test]
        fn serializes_as_string() {
            let json = serde_json::to_string(&FileMode::Executable).unwrap();
            assert_eq!(json, "\"100755\"");
        }
    }
}
