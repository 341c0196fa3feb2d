//! forge::mock
//!
//! Mock forge implementation for deterministic testing.
//!
//! # Design
//!
//! The mock forge keeps a small content-addressed object store in memory:
//! blobs, flat trees (full path to entry), commits, branches and pull
//! requests. Object ids are SHA-256 digests of the object's kind and content,
//! so identical content always yields the same id. It mirrors the remote's
//! validation closely enough for pipeline tests: unknown objects are rejected
//! with 422, ref updates must fast-forward unless forced, and a second PR for
//! the same head/base is a conflict.
//!
//! Failure scenarios are configured with [`FailOn`], and every call is
//! recorded as a [`MockOperation`] for verification.
//!
//! # Example
//!
//! ```
//! use forgepipe::forge::mock::MockForge;
//! use forgepipe::forge::Forge;
//!
//! # tokio_test::block_on(async {
//! let forge = MockForge::new();
//! forge.commit_files("main", &[("README.md", "hello")], "initial");
//!
//! let bytes = forge.read_raw("README.md", "main").await.unwrap();
//! assert_eq!(bytes, b"hello");
//! # });
//! ```

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use super::traits::{
    BranchInfo, CommitInfo, ContentEntry, ContentKind, Contents, CreateCommitRequest,
    CreatePrRequest, CreateTreeRequest, Forge, ForgeError, PrState, PullRequest, RefInfo,
    RepoInfo, TreeEntry, TreeInfo, UpdatePrRequest,
};
use crate::core::naming;
use crate::core::types::{FileMode, Sha};

/// Flat tree: full path to (mode, object id).
type FlatTree = BTreeMap<String, (FileMode, Sha)>;

/// Mock forge for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping.
#[derive(Debug, Clone)]
pub struct MockForge {
    /// Internal state shared across clones.
    inner: Arc<Mutex<MockForgeInner>>,
}

/// Internal mutable state.
#[derive(Debug)]
struct MockForgeInner {
    /// Default branch name.
    default_branch: String,
    /// Blob contents by id.
    blobs: HashMap<Sha, Vec<u8>>,
    /// Trees by id.
    trees: HashMap<Sha, FlatTree>,
    /// Commits by id.
    commits: HashMap<Sha, CommitInfo>,
    /// Branch tips by bare name.
    branches: BTreeMap<String, Sha>,
    /// Stored PRs by number.
    prs: HashMap<u64, PullRequest>,
    /// Next PR number to assign.
    next_pr_number: u64,
    /// Method to fail on (for testing error paths).
    fail_on: Option<FailOn>,
    /// Recorded operations for verification.
    operations: Vec<MockOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail get_repository with the given error.
    GetRepository(ForgeError),
    /// Fail get_branch with the given error.
    GetBranch(ForgeError),
    /// Fail read_raw with the given error.
    ReadRaw(ForgeError),
    /// Fail create_blob with the given error.
    CreateBlob(ForgeError),
    /// Fail create_tree with the given error.
    CreateTree(ForgeError),
    /// Fail create_commit with the given error.
    CreateCommit(ForgeError),
    /// Fail create_ref with the given error.
    CreateRef(ForgeError),
    /// Fail update_ref with the given error.
    UpdateRef(ForgeError),
    /// Fail create_pr with the given error.
    CreatePr(ForgeError),
    /// Fail update_pr with the given error.
    UpdatePr(ForgeError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOperation {
    GetRepository,
    GetBranch {
        branch: String,
    },
    ReadRaw {
        path: String,
        git_ref: String,
    },
    ReadContents {
        path: String,
        git_ref: String,
    },
    GetCommit {
        sha: Sha,
    },
    CreateBlob {
        sha: Sha,
    },
    CreateTree {
        base_tree: Option<Sha>,
        entries: Vec<TreeEntry>,
    },
    CreateCommit {
        message: String,
        tree: Sha,
        parents: Vec<Sha>,
    },
    CreateRef {
        ref_name: String,
        sha: Sha,
    },
    UpdateRef {
        ref_name: String,
        sha: Sha,
        force: bool,
    },
    CreatePr {
        head: String,
        base: String,
        title: String,
        draft: bool,
    },
    UpdatePr {
        number: u64,
        title: Option<String>,
        body: Option<String>,
        base: Option<String>,
    },
    FindPr {
        head: String,
        base: Option<String>,
    },
}

impl MockOperation {
    /// Whether this operation writes to the remote.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            MockOperation::CreateBlob { .. }
                | MockOperation::CreateTree { .. }
                | MockOperation::CreateCommit { .. }
                | MockOperation::CreateRef { .. }
                | MockOperation::UpdateRef { .. }
                | MockOperation::CreatePr { .. }
                | MockOperation::UpdatePr { .. }
        )
    }
}

impl MockForge {
    /// Create a mock repository whose `main` branch holds one empty commit.
    pub fn new() -> Self {
        Self::with_default_branch("main")
    }

    /// Create a mock repository with the given default branch name.
    pub fn with_default_branch(default_branch: &str) -> Self {
        let mut inner = MockForgeInner {
            default_branch: default_branch.to_string(),
            blobs: HashMap::new(),
            trees: HashMap::new(),
            commits: HashMap::new(),
            branches: BTreeMap::new(),
            prs: HashMap::new(),
            next_pr_number: 1,
            fail_on: None,
            operations: Vec::new(),
        };
        let tree = inner.store_tree(FlatTree::new());
        let root = inner.store_commit("initial commit", tree, Vec::new());
        inner.branches.insert(default_branch.to_string(), root);

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Create a mock forge with pre-existing PRs.
    pub fn with_prs(prs: Vec<PullRequest>) -> Self {
        let forge = Self::new();
        {
            let mut inner = forge.inner.lock().unwrap();
            let max_number = prs.iter().map(|p| p.number).max().unwrap_or(0);
            inner.prs = prs.into_iter().map(|p| (p.number, p)).collect();
            inner.next_pr_number = max_number + 1;
        }
        forge
    }

    /// Configure the mock to fail on a specific operation.
    ///
    /// # Example
    ///
    /// ```
    /// use forgepipe::forge::mock::{MockForge, FailOn};
    /// use forgepipe::forge::ForgeError;
    ///
    /// let forge = MockForge::new()
    ///     .fail_on(FailOn::CreatePr(ForgeError::RateLimited));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.fail_on = Some(fail_on);
        }
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_on = None;
    }

    /// Commit text files on top of `branch`, creating the branch from the
    /// default branch if it does not exist yet. Returns the new commit id.
    pub fn commit_files(&self, branch: &str, files: &[(&str, &str)], message: &str) -> Sha {
        let entries: Vec<(&str, FileMode, &[u8])> = files
            .iter()
            .map(|(path, content)| (*path, FileMode::File, content.as_bytes()))
            .collect();
        self.commit_entries(branch, &entries, message)
    }

    /// Commit entries with explicit modes on top of `branch`.
    pub fn commit_entries(
        &self,
        branch: &str,
        entries: &[(&str, FileMode, &[u8])],
        message: &str,
    ) -> Sha {
        let mut inner = self.inner.lock().unwrap();
        let parent = match inner.branches.get(branch) {
            Some(tip) => tip.clone(),
            None => {
                let default = inner.default_branch.clone();
                inner.branches[&default].clone()
            }
        };
        let mut tree = inner.tree_of_commit(&parent);
        for (path, mode, content) in entries {
            let sha = inner.store_blob(content);
            tree.insert(path.to_string(), (*mode, sha));
        }
        let tree_sha = inner.store_tree(tree);
        let commit = inner.store_commit(message, tree_sha, vec![parent]);
        inner.branches.insert(branch.to_string(), commit.clone());
        commit
    }

    /// Current tip of a branch (for test verification).
    pub fn branch_tip(&self, branch: &str) -> Option<Sha> {
        let inner = self.inner.lock().unwrap();
        inner.branches.get(branch).cloned()
    }

    /// A commit by id (for test verification).
    pub fn commit(&self, sha: &Sha) -> Option<CommitInfo> {
        let inner = self.inner.lock().unwrap();
        inner.commits.get(sha).cloned()
    }

    /// File content at `path` in the tip of `branch` (for test verification).
    pub fn file_at(&self, branch: &str, path: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        let tip = inner.branches.get(branch)?;
        let tree = inner.tree_of_commit(tip);
        let (_, sha) = tree.get(path)?;
        inner.blobs.get(sha).cloned()
    }

    /// Mode and object id of `path` at the tip of `branch` (for test verification).
    pub fn entry_at(&self, branch: &str, path: &str) -> Option<(FileMode, Sha)> {
        let inner = self.inner.lock().unwrap();
        let tip = inner.branches.get(branch)?;
        inner.tree_of_commit(tip).get(path).cloned()
    }

    /// Mode of `path` in a tree (for test verification).
    pub fn mode_in_tree(&self, tree: &Sha, path: &str) -> Option<FileMode> {
        let inner = self.inner.lock().unwrap();
        inner.trees.get(tree)?.get(path).map(|(mode, _)| *mode)
    }

    /// Paths present in a tree (for test verification).
    pub fn paths_in_tree(&self, tree: &Sha) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .trees
            .get(tree)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Blob content by id (for test verification).
    pub fn blob(&self, sha: &Sha) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.blobs.get(sha).cloned()
    }

    /// Get all recorded operations.
    ///
    /// Useful for verifying the mock was called correctly.
    pub fn operations(&self) -> Vec<MockOperation> {
        let inner = self.inner.lock().unwrap();
        inner.operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.operations.clear();
    }

    /// Get all PRs (for test verification).
    pub fn all_prs(&self) -> Vec<PullRequest> {
        let inner = self.inner.lock().unwrap();
        inner.prs.values().cloned().collect()
    }

    /// Get the count of PRs.
    pub fn pr_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.prs.len()
    }

    /// Record an operation.
    fn record(&self, op: MockOperation) {
        let mut inner = self.inner.lock().unwrap();
        inner.operations.push(op);
    }

    /// Check if we should fail and return the error if so.
    fn check_fail<T>(&self, expected: &str) -> Option<Result<T, ForgeError>> {
        let inner = self.inner.lock().unwrap();
        let err = match (&inner.fail_on, expected) {
            (Some(FailOn::GetRepository(e)), "get_repository") => e,
            (Some(FailOn::GetBranch(e)), "get_branch") => e,
            (Some(FailOn::ReadRaw(e)), "read_raw") => e,
            (Some(FailOn::CreateBlob(e)), "create_blob") => e,
            (Some(FailOn::CreateTree(e)), "create_tree") => e,
            (Some(FailOn::CreateCommit(e)), "create_commit") => e,
            (Some(FailOn::CreateRef(e)), "create_ref") => e,
            (Some(FailOn::UpdateRef(e)), "update_ref") => e,
            (Some(FailOn::CreatePr(e)), "create_pr") => e,
            (Some(FailOn::UpdatePr(e)), "update_pr") => e,
            _ => return None,
        };
        Some(Err(err.clone()))
    }
}

impl Default for MockForge {
    fn default() -> Self {
        Self::new()
    }
}

/// Content address of an object: SHA-256 over kind and payload.
fn object_id(kind: &str, payload: &[u8]) -> Sha {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload);
    Sha::new(hex::encode(hasher.finalize())).expect("sha256 digest is a valid object id")
}

fn unprocessable(message: impl Into<String>) -> ForgeError {
    ForgeError::ApiError {
        status: 422,
        message: message.into(),
    }
}

impl MockForgeInner {
    fn store_blob(&mut self, content: &[u8]) -> Sha {
        let sha = object_id("blob", content);
        self.blobs.insert(sha.clone(), content.to_vec());
        sha
    }

    fn store_tree(&mut self, tree: FlatTree) -> Sha {
        let mut payload = Vec::new();
        for (path, (mode, sha)) in &tree {
            payload.extend_from_slice(format!("{} {} {}\n", mode, path, sha).as_bytes());
        }
        let sha = object_id("tree", &payload);
        self.trees.insert(sha.clone(), tree);
        sha
    }

    fn store_commit(&mut self, message: &str, tree: Sha, parents: Vec<Sha>) -> Sha {
        let mut payload = format!("tree {}\n", tree);
        for parent in &parents {
            payload.push_str(&format!("parent {}\n", parent));
        }
        payload.push_str(message);
        let sha = object_id("commit", payload.as_bytes());
        self.commits.insert(
            sha.clone(),
            CommitInfo {
                sha: sha.clone(),
                tree_sha: tree,
                parents,
                message: message.to_string(),
            },
        );
        sha
    }

    fn tree_of_commit(&self, commit: &Sha) -> FlatTree {
        self.commits
            .get(commit)
            .and_then(|c| self.trees.get(&c.tree_sha))
            .cloned()
            .unwrap_or_default()
    }

    /// Resolve a branch name or commit id to its flat tree.
    fn resolve_tree(&self, git_ref: &str) -> Result<FlatTree, ForgeError> {
        let branch = naming::branch_name(git_ref);
        if let Some(tip) = self.branches.get(branch) {
            return Ok(self.tree_of_commit(tip));
        }
        if let Ok(sha) = Sha::new(git_ref) {
            if self.commits.contains_key(&sha) {
                return Ok(self.tree_of_commit(&sha));
            }
        }
        Err(ForgeError::NotFound(format!("No commit found for the ref {}", git_ref)))
    }

    fn is_ancestor(&self, ancestor: &Sha, descendant: &Sha) -> bool {
        let mut stack = vec![descendant.clone()];
        let mut seen = BTreeSet::new();
        while let Some(sha) = stack.pop() {
            if &sha == ancestor {
                return true;
            }
            if !seen.insert(sha.clone()) {
                continue;
            }
            if let Some(commit) = self.commits.get(&sha) {
                stack.extend(commit.parents.iter().cloned());
            }
        }
        false
    }

    fn apply_entry(&self, tree: &mut FlatTree, entry: &TreeEntry) -> Result<(), ForgeError> {
        let prefix = format!("{}/", entry.path);
        let sha = match &entry.sha {
            None => {
                tree.remove(&entry.path);
                tree.retain(|path, _| !path.starts_with(&prefix));
                return Ok(());
            }
            Some(sha) => sha,
        };

        match entry.mode {
            FileMode::Subdirectory => {
                let subtree = self
                    .trees
                    .get(sha)
                    .ok_or_else(|| unprocessable(format!("tree {} does not exist", sha)))?;
                tree.remove(&entry.path);
                tree.retain(|path, _| !path.starts_with(&prefix));
                for (path, value) in subtree {
                    tree.insert(format!("{}{}", prefix, path), value.clone());
                }
            }
            FileMode::Submodule => {
                tree.insert(entry.path.clone(), (entry.mode, sha.clone()));
            }
            FileMode::File | FileMode::Executable | FileMode::Symlink => {
                if !self.blobs.contains_key(sha) {
                    return Err(unprocessable(format!("blob {} does not exist", sha)));
                }
                tree.insert(entry.path.clone(), (entry.mode, sha.clone()));
            }
        }
        Ok(())
    }

    fn content_entry(path: &str, mode: FileMode, sha: &Sha) -> ContentEntry {
        let kind = match mode {
            FileMode::File | FileMode::Executable => ContentKind::File,
            FileMode::Symlink => ContentKind::Symlink,
            FileMode::Submodule => ContentKind::Submodule,
            FileMode::Subdirectory => ContentKind::Dir,
        };
        ContentEntry {
            path: path.to_string(),
            sha: sha.clone(),
            kind,
        }
    }
}

#[async_trait]
impl Forge for MockForge {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_repository(&self) -> Result<RepoInfo, ForgeError> {
        self.record(MockOperation::GetRepository);

        if let Some(result) = self.check_fail("get_repository") {
            return result;
        }

        let inner = self.inner.lock().unwrap();
        Ok(RepoInfo {
            full_name: "mock/repo".to_string(),
            default_branch: inner.default_branch.clone(),
        })
    }

    async fn get_branch(&self, branch: &str) -> Result<BranchInfo, ForgeError> {
        self.record(MockOperation::GetBranch {
            branch: branch.to_string(),
        });

        if let Some(result) = self.check_fail("get_branch") {
            return result;
        }

        let inner = self.inner.lock().unwrap();
        let tip = inner
            .branches
            .get(branch)
            .ok_or_else(|| ForgeError::NotFound("Branch not found".into()))?;
        let commit = &inner.commits[tip];
        Ok(BranchInfo {
            name: branch.to_string(),
            commit_sha: commit.sha.clone(),
            tree_sha: commit.tree_sha.clone(),
        })
    }

    async fn read_raw(&self, path: &str, git_ref: &str) -> Result<Vec<u8>, ForgeError> {
        self.record(MockOperation::ReadRaw {
            path: path.to_string(),
            git_ref: git_ref.to_string(),
        });

        if let Some(result) = self.check_fail("read_raw") {
            return result;
        }

        let inner = self.inner.lock().unwrap();
        let tree = inner.resolve_tree(git_ref)?;
        match tree.get(path) {
            Some((mode, sha)) if mode.object_type() == crate::core::types::ObjectType::Blob => {
                Ok(inner.blobs.get(sha).cloned().unwrap_or_default())
            }
            _ => Err(ForgeError::NotFound("Not Found".into())),
        }
    }

    async fn read_contents(&self, path: &str, git_ref: &str) -> Result<Contents, ForgeError> {
        self.record(MockOperation::ReadContents {
            path: path.to_string(),
            git_ref: git_ref.to_string(),
        });

        let inner = self.inner.lock().unwrap();
        let tree = inner.resolve_tree(git_ref)?;

        if let Some((mode, sha)) = tree.get(path) {
            return Ok(Contents::Entry(MockForgeInner::content_entry(
                path, *mode, sha,
            )));
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        let mut children: BTreeMap<String, ContentEntry> = BTreeMap::new();
        for (full, (mode, sha)) in tree.range(prefix.clone()..) {
            let Some(rest) = full.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    let dir_path = format!("{}{}", prefix, dir);
                    children.entry(dir_path.clone()).or_insert_with(|| ContentEntry {
                        sha: object_id("tree-listing", dir_path.as_bytes()),
                        path: dir_path,
                        kind: ContentKind::Dir,
                    });
                }
                None => {
                    children.insert(
                        full.clone(),
                        MockForgeInner::content_entry(full, *mode, sha),
                    );
                }
            }
        }

        if children.is_empty() {
            return Err(ForgeError::NotFound("Not Found".into()));
        }
        Ok(Contents::Directory(children.into_values().collect()))
    }

    async fn get_commit(&self, sha: &Sha) -> Result<CommitInfo, ForgeError> {
        self.record(MockOperation::GetCommit { sha: sha.clone() });

        let inner = self.inner.lock().unwrap();
        inner
            .commits
            .get(sha)
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(format!("commit {}", sha)))
    }

    async fn create_blob(&self, content: &[u8]) -> Result<Sha, ForgeError> {
        if let Some(result) = self.check_fail("create_blob") {
            return result;
        }

        let sha = {
            let mut inner = self.inner.lock().unwrap();
            inner.store_blob(content)
        };
        self.record(MockOperation::CreateBlob { sha: sha.clone() });
        Ok(sha)
    }

    async fn create_tree(&self, request: CreateTreeRequest) -> Result<TreeInfo, ForgeError> {
        self.record(MockOperation::CreateTree {
            base_tree: request.base_tree.clone(),
            entries: request.entries.clone(),
        });

        if let Some(result) = self.check_fail("create_tree") {
            return result;
        }

        let mut inner = self.inner.lock().unwrap();
        let mut tree = match &request.base_tree {
            Some(base) => inner
                .trees
                .get(base)
                .cloned()
                .ok_or_else(|| unprocessable(format!("base_tree {} does not exist", base)))?,
            None => FlatTree::new(),
        };
        for entry in &request.entries {
            inner.apply_entry(&mut tree, entry)?;
        }
        let sha = inner.store_tree(tree);
        Ok(TreeInfo { sha })
    }

    async fn create_commit(&self, request: CreateCommitRequest) -> Result<CommitInfo, ForgeError> {
        self.record(MockOperation::CreateCommit {
            message: request.message.clone(),
            tree: request.tree.clone(),
            parents: request.parents.clone(),
        });

        if let Some(result) = self.check_fail("create_commit") {
            return result;
        }

        let mut inner = self.inner.lock().unwrap();
        if !inner.trees.contains_key(&request.tree) {
            return Err(unprocessable(format!("tree {} does not exist", request.tree)));
        }
        if let Some(missing) = request.parents.iter().find(|p| !inner.commits.contains_key(*p)) {
            return Err(unprocessable(format!("parent {} does not exist", missing)));
        }
        let sha = inner.store_commit(&request.message, request.tree, request.parents);
        Ok(inner.commits[&sha].clone())
    }

    async fn create_ref(&self, ref_name: &str, sha: &Sha) -> Result<RefInfo, ForgeError> {
        self.record(MockOperation::CreateRef {
            ref_name: ref_name.to_string(),
            sha: sha.clone(),
        });

        if let Some(result) = self.check_fail("create_ref") {
            return result;
        }

        let branch = ref_name
            .strip_prefix("refs/heads/")
            .ok_or_else(|| unprocessable(format!("{} is not a valid ref name", ref_name)))?;

        let mut inner = self.inner.lock().unwrap();
        if inner.branches.contains_key(branch) {
            return Err(unprocessable("Reference already exists"));
        }
        if !inner.commits.contains_key(sha) {
            return Err(unprocessable("Object does not exist"));
        }
        inner.branches.insert(branch.to_string(), sha.clone());
        Ok(RefInfo {
            ref_name: ref_name.to_string(),
            sha: sha.clone(),
        })
    }

    async fn update_ref(
        &self,
        ref_name: &str,
        sha: &Sha,
        force: bool,
    ) -> Result<RefInfo, ForgeError> {
        self.record(MockOperation::UpdateRef {
            ref_name: ref_name.to_string(),
            sha: sha.clone(),
            force,
        });

        if let Some(result) = self.check_fail("update_ref") {
            return result;
        }

        let branch = naming::branch_name(ref_name).to_string();
        let mut inner = self.inner.lock().unwrap();
        let current = inner
            .branches
            .get(&branch)
            .cloned()
            .ok_or_else(|| unprocessable("Reference does not exist"))?;
        if !inner.commits.contains_key(sha) {
            return Err(unprocessable("Object does not exist"));
        }
        if !force && !inner.is_ancestor(&current, sha) {
            return Err(unprocessable("Update is not a fast forward"));
        }
        inner.branches.insert(branch.clone(), sha.clone());
        Ok(RefInfo {
            ref_name: format!("refs/heads/{}", branch),
            sha: sha.clone(),
        })
    }

    async fn create_pr(&self, request: CreatePrRequest) -> Result<PullRequest, ForgeError> {
        self.record(MockOperation::CreatePr {
            head: request.head.clone(),
            base: request.base.clone(),
            title: request.title.clone(),
            draft: request.draft,
        });

        if let Some(result) = self.check_fail("create_pr") {
            return result;
        }

        let mut inner = self.inner.lock().unwrap();
        if !inner.branches.contains_key(&request.head) {
            return Err(unprocessable(format!("head {} is invalid", request.head)));
        }
        let duplicate = inner.prs.values().any(|p| {
            p.state == PrState::Open && p.head == request.head && p.base == request.base
        });
        if duplicate {
            return Err(ForgeError::Conflict(format!(
                "A pull request already exists for mock:{}.",
                request.head
            )));
        }

        let number = inner.next_pr_number;
        inner.next_pr_number += 1;

        let pr = PullRequest {
            number,
            url: format!("https://github.com/mock/repo/pull/{}", number),
            state: PrState::Open,
            is_draft: request.draft,
            head: request.head,
            base: request.base,
            title: request.title,
            body: request.body,
        };

        inner.prs.insert(number, pr.clone());
        Ok(pr)
    }

    async fn update_pr(&self, request: UpdatePrRequest) -> Result<PullRequest, ForgeError> {
        self.record(MockOperation::UpdatePr {
            number: request.number,
            title: request.title.clone(),
            body: request.body.clone(),
            base: request.base.clone(),
        });

        if let Some(result) = self.check_fail("update_pr") {
            return result;
        }

        let mut inner = self.inner.lock().unwrap();
        let pr = inner
            .prs
            .get_mut(&request.number)
            .ok_or_else(|| ForgeError::NotFound(format!("PR #{}", request.number)))?;

        if let Some(title) = request.title {
            pr.title = title;
        }
        if let Some(body) = request.body {
            pr.body = Some(body);
        }
        if let Some(base) = request.base {
            pr.base = base;
        }

        Ok(pr.clone())
    }

    async fn find_pr(
        &self,
        head: &str,
        base: Option<&str>,
    ) -> Result<Option<PullRequest>, ForgeError> {
        self.record(MockOperation::FindPr {
            head: head.to_string(),
            base: base.map(str::to_string),
        });

        let inner = self.inner.lock().unwrap();
        let pr = inner
            .prs
            .values()
            .filter(|p| p.state == PrState::Open && p.head == head)
            .filter(|p| base.map_or(true, |b| p.base == b))
            .min_by_key(|p| p.number)
            .cloned();

        Ok(pr)
    }
}
