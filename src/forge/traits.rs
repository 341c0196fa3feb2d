//! forge::traits
//!
//! Forge trait definition for reading and writing a remote repository.
//!
//! # Design
//!
//! The `Forge` trait is async because forge operations involve network I/O.
//! All methods return `Result` to handle API errors gracefully.
//!
//! Reads distinguish absence from failure: a missing branch, path or pull
//! request is reported as [`ForgeError::NotFound`] so callers can treat it
//! as ordinary control flow (empty file, branch to create, no open PR).
//!
//! # Example
//!
//! ```ignore
//! use forgepipe::forge::{Forge, CreatePrRequest};
//!
//! async fn open_pr(forge: &dyn Forge) -> Result<(), ForgeError> {
//!     let repo = forge.get_repository().await?;
//!     let pr = forge.create_pr(CreatePrRequest {
//!         head: "feature-branch".to_string(),
//!         base: repo.default_branch,
//!         title: "Add feature".to_string(),
//!         body: Some("Description".to_string()),
//!         draft: false,
//!     }).await?;
//!     println!("Created PR #{}: {}", pr.number, pr.url);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{FileMode, Sha};

/// Errors from forge operations.
///
/// These error types map to common failure modes when interacting
/// with remote hosting services like GitHub.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    /// Authentication is required but not available.
    #[error("authentication required")]
    AuthRequired,

    /// Authentication failed (invalid token, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The resource being created already exists (e.g. an open PR for head/base).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ForgeError {
    /// Whether this error reports an absent resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ForgeError::NotFound(_))
    }

    /// Whether this error reports that the resource already exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ForgeError::Conflict(_))
    }
}

/// Repository metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    /// `owner/name`
    pub full_name: String,
    /// Default branch name (bare, e.g. "main")
    pub default_branch: String,
}

/// Branch tip as reported by the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    /// Bare branch name
    pub name: String,
    /// Tip commit
    pub commit_sha: Sha,
    /// Root tree of the tip commit
    pub tree_sha: Sha,
}

/// Kind of an entry returned by a contents read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

impl ContentKind {
    /// Tree mode for an entry of this kind.
    ///
    /// The contents API does not report the executable bit, so files map to
    /// the regular file mode.
    pub fn mode(&self) -> FileMode {
        match self {
            ContentKind::File => FileMode::File,
            ContentKind::Dir => FileMode::Subdirectory,
            ContentKind::Symlink => FileMode::Symlink,
            ContentKind::Submodule => FileMode::Submodule,
        }
    }
}

/// One entry of a contents read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    /// Repository-relative path
    pub path: String,
    /// Object id of the entry
    pub sha: Sha,
    /// Entry kind
    pub kind: ContentKind,
}

/// Result of reading a path: a single entry, or a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contents {
    /// The path names a single entry (file, symlink or submodule).
    Entry(ContentEntry),
    /// The path names a directory; its immediate children.
    Directory(Vec<ContentEntry>),
}

/// Commit object as reported by the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: Sha,
    pub tree_sha: Sha,
    pub parents: Vec<Sha>,
    pub message: String,
}

/// A flat tree entry submitted to tree creation.
///
/// `sha == None` marks the path for deletion from the base tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Repository-relative path
    pub path: String,
    /// Entry mode
    pub mode: FileMode,
    /// Object id, or `None` to delete
    pub sha: Option<Sha>,
}

impl TreeEntry {
    /// An entry pointing `path` at `sha`.
    pub fn new(path: impl Into<String>, mode: FileMode, sha: Sha) -> Self {
        Self {
            path: path.into(),
            mode,
            sha: Some(sha),
        }
    }

    /// An entry removing `path`.
    pub fn deletion(path: impl Into<String>, mode: FileMode) -> Self {
        Self {
            path: path.into(),
            mode,
            sha: None,
        }
    }

    /// Whether this entry removes its path.
    pub fn is_deletion(&self) -> bool {
        self.sha.is_none()
    }
}

/// Request to create a tree.
#[derive(Debug, Clone)]
pub struct CreateTreeRequest {
    /// Tree the entries are applied on top of
    pub base_tree: Option<Sha>,
    /// Flat entry list; order is not significant
    pub entries: Vec<TreeEntry>,
}

/// Created tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeInfo {
    pub sha: Sha,
}

/// Request to create a commit.
#[derive(Debug, Clone)]
pub struct CreateCommitRequest {
    pub message: String,
    pub tree: Sha,
    pub parents: Vec<Sha>,
}

/// A ref after creation or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefInfo {
    /// Fully qualified ref as reported by the forge
    pub ref_name: String,
    /// Commit the ref points at
    pub sha: Sha,
}

/// Request to create a pull request.
#[derive(Debug, Clone)]
pub struct CreatePrRequest {
    /// Head branch name (the branch with changes)
    pub head: String,
    /// Base branch name (the branch to merge into)
    pub base: String,
    /// PR title
    pub title: String,
    /// PR body/description
    pub body: Option<String>,
    /// Create as draft
    pub draft: bool,
}

/// Request to update a pull request.
#[derive(Debug, Clone, Default)]
pub struct UpdatePrRequest {
    /// PR number
    pub number: u64,
    /// New title (if changing)
    pub title: Option<String>,
    /// New body (if changing)
    pub body: Option<String>,
    /// New base branch (if changing)
    pub base: Option<String>,
}

/// Pull request information returned from the forge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// PR number
    pub number: u64,
    /// PR URL (web URL for viewing)
    pub url: String,
    /// PR state (open, closed, merged)
    pub state: PrState,
    /// Whether the PR is a draft
    pub is_draft: bool,
    /// Head branch name
    pub head: String,
    /// Base branch name
    pub base: String,
    /// PR title
    pub title: String,
    /// PR body
    pub body: Option<String>,
}

/// PR state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrState {
    /// PR is open and awaiting review/merge
    Open,
    /// PR is closed without being merged
    Closed,
    /// PR has been merged
    Merged,
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrState::Open => write!(f, "open"),
            PrState::Closed => write!(f, "closed"),
            PrState::Merged => write!(f, "merged"),
        }
    }
}

/// The Forge trait: the read and write primitives a pipeline needs.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the tree reconciler issues
/// per-path reads and blob uploads concurrently.
///
/// # Ref spelling
///
/// `create_ref` receives a fully qualified ref (`refs/heads/x`) and
/// `update_ref` the short form (`heads/x`); see [`crate::core::naming`].
#[async_trait]
pub trait Forge: Send + Sync {
    /// Get the forge name (e.g., "github", "mock").
    fn name(&self) -> &'static str;

    /// Read repository metadata, including the default branch.
    async fn get_repository(&self) -> Result<RepoInfo, ForgeError>;

    /// Read a branch tip.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the branch does not exist
    async fn get_branch(&self, branch: &str) -> Result<BranchInfo, ForgeError>;

    /// Read the raw bytes of the file at `path` on `git_ref`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the path does not exist on that ref
    async fn read_raw(&self, path: &str, git_ref: &str) -> Result<Vec<u8>, ForgeError>;

    /// Read the entry (or directory listing) at `path` on `git_ref`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the path does not exist on that ref
    async fn read_contents(&self, path: &str, git_ref: &str) -> Result<Contents, ForgeError>;

    /// Read a commit object.
    async fn get_commit(&self, sha: &Sha) -> Result<CommitInfo, ForgeError>;

    /// Upload a blob, returning its id.
    async fn create_blob(&self, content: &[u8]) -> Result<Sha, ForgeError>;

    /// Create a tree from a base tree and a flat list of entries.
    async fn create_tree(&self, request: CreateTreeRequest) -> Result<TreeInfo, ForgeError>;

    /// Create a commit.
    async fn create_commit(&self, request: CreateCommitRequest) -> Result<CommitInfo, ForgeError>;

    /// Create a ref (`refs/heads/<name>` form).
    ///
    /// # Errors
    ///
    /// - `ApiError` with status 422 if the ref already exists
    async fn create_ref(&self, ref_name: &str, sha: &Sha) -> Result<RefInfo, ForgeError>;

    /// Move a ref (`heads/<name>` form).
    ///
    /// Without `force`, the update must be a fast-forward.
    async fn update_ref(&self, ref_name: &str, sha: &Sha, force: bool)
        -> Result<RefInfo, ForgeError>;

    /// Create a new pull request.
    ///
    /// # Errors
    ///
    /// - `Conflict` if a pull request already exists for head/base
    /// - `ApiError` with status 422 for other validation failures
    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError>;

    /// Update an existing pull request.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the PR doesn't exist
    async fn update_pr(&self, request: UpdatePrRequest) -> Result<PullRequest, ForgeError>;

    /// Find an open pull request by head branch, optionally narrowed by base.
    ///
    /// Returns `None` if no matching PR exists.
    async fn find_pr(&self, head: &str, base: Option<&str>)
        -> Result<Option<PullRequest>, ForgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pr_state_display() {
        assert_eq!(format!("{}", PrState::Open), "open");
        assert_eq!(format!("{}", PrState::Closed), "closed");
        assert_eq!(format!("{}", PrState::Merged), "merged");
    }

    #[test]
    fn update_pr_request_default() {
        let req = UpdatePrRequest::default();
        assert_eq!(req.number, 0);
        assert!(req.title.is_none());
        assert!(req.body.is_none());
        assert!(req.base.is_none());
    }

    #[test]
    fn tree_entry_deletion() {
        let entry = TreeEntry::deletion("a.txt", FileMode::File);
        assert!(entry.is_deletion());
        assert_eq!(entry.mode, FileMode::File);
    }

    #[test]
    fn content_kind_modes() {
        assert_eq!(ContentKind::File.mode(), FileMode::File);
        assert_eq!(ContentKind::Dir.mode(), FileMode::Subdirectory);
        assert_eq!(ContentKind::Symlink.mode(), FileMode::Symlink);
        assert_eq!(ContentKind::Submodule.mode(), FileMode::Submodule);
    }

    #[test]
    fn error_predicates() {
        assert!(ForgeError::NotFound("x".into()).is_not_found());
        assert!(!ForgeError::RateLimited.is_not_found());
        assert!(ForgeError::Conflict("exists".into()).is_conflict());
        assert!(!ForgeError::ApiError {
            status: 422,
            message: "Validation Failed".into()
        }
        .is_conflict());
    }

    #[test]
    fn forge_error_display() {
        assert_eq!(
            format!("{}", ForgeError::AuthRequired),
            "authentication required"
        );
        assert_eq!(
            format!("{}", ForgeError::AuthFailed("expired token".into())),
            "authentication failed: expired token"
        );
        assert_eq!(
            format!("{}", ForgeError::NotFound("branch feat".into())),
            "not found: branch feat"
        );
        assert_eq!(
            format!("{}", ForgeError::Conflict("PR exists".into())),
            "conflict: PR exists"
        );
        assert_eq!(format!("{}", ForgeError::RateLimited), "rate limited");
        assert_eq!(
            format!(
                "{}",
                ForgeError::ApiError {
                    status: 422,
                    message: "Validation failed".into()
                }
            ),
            "API error: 422 - Validation failed"
        );
        assert_eq!(
            format!("{}", ForgeError::NetworkError("connection refused".into())),
            "network error: connection refused"
        );
    }
}
