//! forge::github
//!
//! GitHub forge implementation using the REST and Git Data APIs.
//!
//! # Design
//!
//! This module implements the `Forge` trait for GitHub:
//! - Repository, branch and contents reads via the REST API
//! - Blob, tree, commit and ref writes via the Git Data API
//! - Pull request create/update/list via the REST API
//!
//! Raw file reads use the `application/vnd.github.raw` media type so binary
//! content arrives untouched. Blob uploads are always base64 encoded.
//!
//! # Errors
//!
//! - 404 maps to `ForgeError::NotFound`, which pipeline steps treat as state
//! - 422 "A pull request already exists" and 409 map to `ForgeError::Conflict`
//! - 429 maps to `ForgeError::RateLimited`; no automatic retry is attempted
//!
//! # Example
//!
//! ```ignore
//! use forgepipe::forge::github::GitHubForge;
//! use forgepipe::forge::Forge;
//!
//! let forge = GitHubForge::new("ghp_xxx", "octocat", "hello-world");
//! let repo = forge.get_repository().await?;
//! println!("default branch: {}", repo.default_branch);
//! ```

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::traits::{
    BranchInfo, CommitInfo, ContentEntry, ContentKind, Contents, CreateCommitRequest,
    CreatePrRequest, CreateTreeRequest, Forge, ForgeError, PrState, PullRequest, RefInfo,
    RepoInfo, TreeEntry, TreeInfo, UpdatePrRequest,
};
use crate::core::types::{ObjectType, Sha};

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "forgepipe";

/// Media type for JSON responses.
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Media type for raw file content.
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";

/// GitHub forge implementation.
pub struct GitHubForge {
    /// HTTP client for making requests
    client: Client,
    /// Bearer token; anonymous requests are allowed for public reads
    token: Option<String>,
    /// Repository owner (user or organization)
    owner: String,
    /// Repository name
    repo: String,
    /// API base URL (configurable for GitHub Enterprise)
    api_base: String,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("has_token", &self.token.is_some())
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GitHubForge {
    /// Create a new GitHub forge authenticated with `token`.
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Self::with_api_base(Some(token.into()), owner, repo, DEFAULT_API_BASE)
    }

    /// Create a GitHub forge with a custom API base URL.
    ///
    /// Use this for GitHub Enterprise (`https://github.example.com/api/v3`)
    /// or to point at a local test server.
    pub fn with_api_base(
        token: Option<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        let api_base: String = api_base.into();
        Self {
            client: Client::new(),
            token,
            owner: owner.into(),
            repo: repo.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Get the repository owner.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Get the repository name.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Build common headers for API requests.
    fn headers(&self, accept: &'static str) -> Result<HeaderMap, ForgeError> {
        let mut headers = HeaderMap::new();
        if let Some(ref token) = self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ForgeError::AuthFailed("token contains invalid characters".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Build URL for a repository endpoint.
    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.owner, self.repo, path
        )
    }

    /// Build the contents URL for a path, percent-encoding each segment.
    fn contents_url(&self, path: &str) -> Result<Url, ForgeError> {
        let mut url = Url::parse(&self.repo_url("contents"))
            .map_err(|e| ForgeError::NetworkError(format!("invalid API base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ForgeError::NetworkError("API base cannot be a base URL".into()))?
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    /// Send a request built by `build`, mapping transport failures.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ForgeError> {
        request
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, ForgeError> {
        tracing::debug!(%url, "GET");
        let request = self.client.get(url).headers(self.headers(JSON_MEDIA_TYPE)?);
        let response = self.send(request).await?;
        self.handle_response(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ForgeError> {
        tracing::debug!(%url, "POST");
        let request = self
            .client
            .post(url)
            .headers(self.headers(JSON_MEDIA_TYPE)?)
            .json(body);
        let response = self.send(request).await?;
        self.handle_response(response).await
    }

    async fn patch_json<B: Serialize + ?Sized, T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ForgeError> {
        tracing::debug!(%url, "PATCH");
        let request = self
            .client
            .patch(url)
            .headers(self.headers(JSON_MEDIA_TYPE)?)
            .json(body);
        let response = self.send(request).await?;
        self.handle_response(response).await
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: Response,
    ) -> Result<T, ForgeError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            })
        } else {
            self.handle_error_response(response, status).await
        }
    }

    /// Handle an error response from the API.
    async fn handle_error_response<T>(
        &self,
        response: Response,
        status: StatusCode,
    ) -> Result<T, ForgeError> {
        // Extract permission headers before consuming response body.
        let required_permissions = response
            .headers()
            .get("X-Accepted-GitHub-Permissions")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        // Validation failures carry the interesting text in `errors[]`
        let message = match response.json::<GitHubErrorResponse>().await {
            Ok(err) => err.detail(),
            Err(_) => "Unknown error".to_string(),
        };

        Err(match status {
            StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("Invalid or expired token".into()),
            StatusCode::FORBIDDEN => {
                let mut err_msg = format!("Permission denied: {}", message);
                if let Some(perms) = required_permissions.filter(|p| !p.is_empty()) {
                    err_msg.push_str(&format!(" [required: {}]", perms));
                }
                ForgeError::AuthFailed(err_msg)
            }
            StatusCode::NOT_FOUND => ForgeError::NotFound(message),
            StatusCode::CONFLICT => ForgeError::Conflict(message),
            StatusCode::UNPROCESSABLE_ENTITY if is_already_exists(&message) => {
                ForgeError::Conflict(message)
            }
            StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
            _ if status.is_server_error() => ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("GitHub server error: {}", message),
            },
            _ => ForgeError::ApiError {
                status: status.as_u16(),
                message,
            },
        })
    }
}

/// Whether a validation message reports an existing pull request.
fn is_already_exists(message: &str) -> bool {
    message.to_ascii_lowercase().contains("already exists")
}

#[async_trait]
impl Forge for GitHubForge {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn get_repository(&self) -> Result<RepoInfo, ForgeError> {
        let url = format!("{}/repos/{}/{}", self.api_base, self.owner, self.repo);
        let repo: GitHubRepository = self.get_json(&url).await?;
        Ok(RepoInfo {
            full_name: repo.full_name,
            default_branch: repo.default_branch,
        })
    }

    async fn get_branch(&self, branch: &str) -> Result<BranchInfo, ForgeError> {
        let url = self.repo_url(&format!("branches/{}", branch));
        let branch: GitHubBranch = self.get_json(&url).await?;
        Ok(BranchInfo {
            name: branch.name,
            commit_sha: branch.commit.sha,
            tree_sha: branch.commit.commit.tree.sha,
        })
    }

    async fn read_raw(&self, path: &str, git_ref: &str) -> Result<Vec<u8>, ForgeError> {
        let url = self.contents_url(path)?;
        tracing::debug!(%url, git_ref, "GET raw");
        let request = self
            .client
            .get(url)
            .query(&[("ref", git_ref)])
            .headers(self.headers(RAW_MEDIA_TYPE)?);
        let response = self.send(request).await?;

        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| ForgeError::NetworkError(e.to_string()))?;
            Ok(bytes.to_vec())
        } else {
            self.handle_error_response(response, status).await
        }
    }

    async fn read_contents(&self, path: &str, git_ref: &str) -> Result<Contents, ForgeError> {
        let url = self.contents_url(path)?;
        tracing::debug!(%url, git_ref, "GET contents");
        let request = self
            .client
            .get(url)
            .query(&[("ref", git_ref)])
            .headers(self.headers(JSON_MEDIA_TYPE)?);
        let response = self.send(request).await?;
        let contents: GitHubContents = self.handle_response(response).await?;

        Ok(match contents {
            GitHubContents::Directory(items) => {
                Contents::Directory(items.into_iter().map(Into::into).collect())
            }
            GitHubContents::Entry(item) => Contents::Entry(item.into()),
        })
    }

    async fn get_commit(&self, sha: &Sha) -> Result<CommitInfo, ForgeError> {
        let url = self.repo_url(&format!("git/commits/{}", sha));
        let commit: GitHubCommit = self.get_json(&url).await?;
        Ok(commit.into())
    }

    async fn create_blob(&self, content: &[u8]) -> Result<Sha, ForgeError> {
        let url = self.repo_url("git/blobs");
        let body = CreateBlobBody {
            content: BASE64.encode(content),
            encoding: "base64",
        };
        let blob: GitHubSha = self.post_json(&url, &body).await?;
        Ok(blob.sha)
    }

    async fn create_tree(&self, request: CreateTreeRequest) -> Result<TreeInfo, ForgeError> {
        let url = self.repo_url("git/trees");
        let body = CreateTreeBody {
            base_tree: request.base_tree.as_ref(),
            tree: request.entries.iter().map(TreeEntryBody::from).collect(),
        };
        let tree: GitHubSha = self.post_json(&url, &body).await?;
        Ok(TreeInfo { sha: tree.sha })
    }

    async fn create_commit(&self, request: CreateCommitRequest) -> Result<CommitInfo, ForgeError> {
        let url = self.repo_url("git/commits");
        let body = CreateCommitBody {
            message: &request.message,
            tree: &request.tree,
            parents: &request.parents,
        };
        let commit: GitHubCommit = self.post_json(&url, &body).await?;
        Ok(commit.into())
    }

    async fn create_ref(&self, ref_name: &str, sha: &Sha) -> Result<RefInfo, ForgeError> {
        let url = self.repo_url("git/refs");
        let body = CreateRefBody { ref_name, sha };
        let created: GitHubRef = self.post_json(&url, &body).await?;
        Ok(created.into())
    }

    async fn update_ref(
        &self,
        ref_name: &str,
        sha: &Sha,
        force: bool,
    ) -> Result<RefInfo, ForgeError> {
        let url = self.repo_url(&format!("git/refs/{}", ref_name));
        let body = UpdateRefBody { sha, force };
        let updated: GitHubRef = self.patch_json(&url, &body).await?;
        Ok(updated.into())
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError> {
        let url = self.repo_url("pulls");
        let body = CreatePrBody {
            head: &request.head,
            base: &request.base,
            title: &request.title,
            body: request.body.as_deref(),
            draft: request.draft,
        };
        let pr: GitHubPullRequest = self.post_json(&url, &body).await?;
        Ok(pr.into())
    }

    async fn update_pr(&self, request: UpdatePrRequest) -> Result<PullRequest, ForgeError> {
        let url = self.repo_url(&format!("pulls/{}", request.number));
        let body = UpdatePrBody {
            title: request.title.as_deref(),
            body: request.body.as_deref(),
            base: request.base.as_deref(),
        };
        let pr: GitHubPullRequest = self.patch_json(&url, &body).await?;
        Ok(pr.into())
    }

    async fn find_pr(
        &self,
        head: &str,
        base: Option<&str>,
    ) -> Result<Option<PullRequest>, ForgeError> {
        // GitHub API requires owner:branch format for the head filter
        let head_param = if head.contains(':') {
            head.to_string()
        } else {
            format!("{}:{}", self.owner, head)
        };

        let mut query = vec![("head", head_param.as_str()), ("state", "open")];
        if let Some(base) = base {
            query.push(("base", base));
        }

        let url = self.repo_url("pulls");
        tracing::debug!(%url, head = %head_param, "GET pulls");
        let request = self
            .client
            .get(&url)
            .query(&query)
            .headers(self.headers(JSON_MEDIA_TYPE)?);
        let response = self.send(request).await?;
        let prs: Vec<GitHubPullRequest> = self.handle_response(response).await?;

        Ok(prs.into_iter().next().map(Into::into))
    }
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

/// Request body for creating a blob.
#[derive(Serialize)]
struct CreateBlobBody {
    content: String,
    encoding: &'static str,
}

/// Request body for creating a tree.
#[derive(Serialize)]
struct CreateTreeBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    base_tree: Option<&'a Sha>,
    tree: Vec<TreeEntryBody<'a>>,
}

/// One tree entry. `sha: null` deletes the path, so it is never skipped.
#[derive(Serialize)]
struct TreeEntryBody<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    object_type: ObjectType,
    sha: Option<&'a Sha>,
}

impl<'a> From<&'a TreeEntry> for TreeEntryBody<'a> {
    fn from(entry: &'a TreeEntry) -> Self {
        Self {
            path: &entry.path,
            mode: entry.mode.as_str(),
            object_type: entry.mode.object_type(),
            sha: entry.sha.as_ref(),
        }
    }
}

/// Request body for creating a commit.
#[derive(Serialize)]
struct CreateCommitBody<'a> {
    message: &'a str,
    tree: &'a Sha,
    parents: &'a [Sha],
}

/// Request body for creating a ref.
#[derive(Serialize)]
struct CreateRefBody<'a> {
    #[serde(rename = "ref")]
    ref_name: &'a str,
    sha: &'a Sha,
}

/// Request body for moving a ref.
#[derive(Serialize)]
struct UpdateRefBody<'a> {
    sha: &'a Sha,
    force: bool,
}

/// Request body for creating a PR.
#[derive(Serialize)]
struct CreatePrBody<'a> {
    head: &'a str,
    base: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    draft: bool,
}

/// Request body for updating a PR.
#[derive(Serialize)]
struct UpdatePrBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base: Option<&'a str>,
}

/// GitHub error response format.
#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<GitHubErrorDetail>,
}

impl GitHubErrorResponse {
    /// Top-level message joined with any per-field messages.
    fn detail(self) -> String {
        let details: Vec<String> = self.errors.into_iter().filter_map(|e| e.message).collect();
        if details.is_empty() {
            self.message
        } else {
            format!("{}: {}", self.message, details.join("; "))
        }
    }
}

/// One entry of a validation error's `errors` array.
#[derive(Deserialize)]
struct GitHubErrorDetail {
    message: Option<String>,
}

/// Object reference carrying only an id.
#[derive(Deserialize)]
struct GitHubSha {
    sha: Sha,
}

/// Repository response (subset).
#[derive(Deserialize)]
struct GitHubRepository {
    full_name: String,
    default_branch: String,
}

/// Branch response (subset).
#[derive(Deserialize)]
struct GitHubBranch {
    name: String,
    commit: GitHubBranchCommit,
}

#[derive(Deserialize)]
struct GitHubBranchCommit {
    sha: Sha,
    commit: GitHubBranchCommitDetail,
}

#[derive(Deserialize)]
struct GitHubBranchCommitDetail {
    tree: GitHubSha,
}

/// Git Data API commit.
#[derive(Deserialize)]
struct GitHubCommit {
    sha: Sha,
    tree: GitHubSha,
    parents: Vec<GitHubSha>,
    message: String,
}

impl From<GitHubCommit> for CommitInfo {
    fn from(commit: GitHubCommit) -> Self {
        CommitInfo {
            sha: commit.sha,
            tree_sha: commit.tree.sha,
            parents: commit.parents.into_iter().map(|p| p.sha).collect(),
            message: commit.message,
        }
    }
}

/// Git Data API ref.
#[derive(Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    ref_name: String,
    object: GitHubSha,
}

impl From<GitHubRef> for RefInfo {
    fn from(r: GitHubRef) -> Self {
        RefInfo {
            ref_name: r.ref_name,
            sha: r.object.sha,
        }
    }
}

/// Contents response: an array for directories, an object otherwise.
#[derive(Deserialize)]
#[serde(untagged)]
enum GitHubContents {
    Directory(Vec<GitHubContentItem>),
    Entry(GitHubContentItem),
}

#[derive(Deserialize)]
struct GitHubContentItem {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    sha: Sha,
}

impl From<GitHubContentItem> for ContentEntry {
    fn from(item: GitHubContentItem) -> Self {
        let kind = match item.kind.as_str() {
            "dir" => ContentKind::Dir,
            "symlink" => ContentKind::Symlink,
            "submodule" => ContentKind::Submodule,
            _ => ContentKind::File,
        };
        ContentEntry {
            path: item.path,
            sha: item.sha,
            kind,
        }
    }
}

/// GitHub PR response format.
#[derive(Deserialize)]
struct GitHubPullRequest {
    number: u64,
    html_url: String,
    state: String,
    #[serde(default)]
    draft: bool,
    head: GitHubPrRef,
    base: GitHubPrRef,
    title: String,
    body: Option<String>,
    merged: Option<bool>,
}

/// GitHub PR ref (head/base) format.
#[derive(Deserialize)]
struct GitHubPrRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

impl From<GitHubPullRequest> for PullRequest {
    fn from(pr: GitHubPullRequest) -> Self {
        let state = if pr.merged.unwrap_or(false) {
            PrState::Merged
        } else if pr.state == "closed" {
            PrState::Closed
        } else {
            PrState::Open
        };

        PullRequest {
            number: pr.number,
            url: pr.html_url,
            state,
            is_draft: pr.draft,
            head: pr.head.ref_name,
            base: pr.base.ref_name,
            title: pr.title,
            body: pr.body,
        }
    }
}

// --------------------------------------------------------------------------
// URL Parsing
// --------------------------------------------------------------------------

/// Parse a GitHub remote URL to extract owner and repo.
///
/// Supports both SSH and HTTPS formats:
/// - `git@github.com:owner/repo.git`
/// - `https://github.com/owner/repo.git`
/// - `https://github.com/owner/repo`
///
/// # Example
///
/// ```
/// use forgepipe::forge::github::parse_github_url;
///
/// let (owner, repo) = parse_github_url("git@github.com:octocat/hello-world.git").unwrap();
/// assert_eq!(owner, "octocat");
/// assert_eq!(repo, "hello-world");
/// ```
pub fn parse_github_url(url: &str) -> Option<(String, String)> {
    // SSH format: git@github.com:owner/repo.git
    if let Some(rest) = url.strip_prefix("git@github.com:") {
        let rest = rest.strip_suffix(".git").unwrap_or(rest);
        let parts: Vec<&str> = rest.splitn(2, '/').collect();
        if parts.len() == 2 {
            return Some((parts[0].to_string(), parts[1].to_string()));
        }
    }

    // HTTPS format: https://github.com/owner/repo.git
    if let Some(rest) = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("http://github.com/"))
    {
        let rest = rest.strip_suffix(".git").unwrap_or(rest);
        let parts: Vec<&str> = rest.splitn(2, '/').collect();
        if parts.len() == 2 && !parts[1].is_empty() {
            return Some((parts[0].to_string(), parts[1].to_string()));
        }
    }

    None
}
