//! engine::ops
//!
//! Operation kinds and their desired-state payloads.
//!
//! # Design
//!
//! [`Operation`] is a closed enum: the pipeline dispatches each variant to
//! exactly one handler with an exhaustive match. Every payload is wrapped
//! in a [`Deferred`] so it may be computed from earlier outputs.

use std::collections::BTreeMap;
use std::fmt;

use super::deferred::{Content, Deferred};
use super::error::PipelineError;
use super::history::ResultHistory;
use super::json_patch::PatchOperation;
use crate::core::types::Sha;

/// Desired change at one path of a tree.
#[derive(Debug)]
pub enum FileIntent {
    /// Regular file with binary content (`100644`).
    Blob(Content<Vec<u8>>),
    /// Regular file with UTF-8 content (`100644`).
    Text(Content<String>),
    /// JSON file edited with a patch list (`100644`).
    JsonPatch(Deferred<Vec<PatchOperation>>),
    /// Executable file (`100755`).
    Executable(Content<Vec<u8>>),
    /// Existing tree object (`040000`).
    Subdirectory(Deferred<Sha>),
    /// Submodule commit (`160000`).
    Submodule(Deferred<Sha>),
    /// Symbolic link whose content is the target path (`120000`).
    Symlink(Content<String>),
    /// Move the entry at this path to the given path.
    Rename(String),
    /// Remove the path.
    Delete,
}

impl FileIntent {
    /// Short name for logs and plans.
    pub fn name(&self) -> &'static str {
        match self {
            FileIntent::Blob(_) => "write",
            FileIntent::Text(_) => "write_text",
            FileIntent::JsonPatch(_) => "json_patch",
            FileIntent::Executable(_) => "executable",
            FileIntent::Subdirectory(_) => "subdirectory",
            FileIntent::Submodule(_) => "submodule",
            FileIntent::Symlink(_) => "symlink",
            FileIntent::Rename(_) => "rename",
            FileIntent::Delete => "delete",
        }
    }
}

/// Input of a tree-creation step.
///
/// Paths are kept sorted; setting a path twice keeps the last intent.
///
/// # Example
///
/// ```
/// use forgepipe::engine::TreeOptions;
///
/// let options = TreeOptions::new()
///     .base_ref("main")
///     .write_text("README.md", "hello\n")
///     .rename("old.txt", "new.txt")
///     .delete("stale.txt");
/// assert_eq!(options.len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct TreeOptions {
    /// Branch whose tree the entries apply to; the default branch if unset
    pub base_ref: Option<String>,
    /// Intents by path
    pub files: BTreeMap<String, FileIntent>,
}

impl TreeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_ref(mut self, base_ref: impl Into<String>) -> Self {
        self.base_ref = Some(base_ref.into());
        self
    }

    /// Set the intent for `path`, replacing any earlier one.
    pub fn file(mut self, path: impl Into<String>, intent: FileIntent) -> Self {
        self.set(path, intent);
        self
    }

    /// In-place form of [`TreeOptions::file`].
    pub fn set(&mut self, path: impl Into<String>, intent: FileIntent) {
        let path = path.into();
        let path = path.trim_start_matches('/').to_string();
        self.files.insert(path, intent);
    }

    pub fn write(self, path: impl Into<String>, content: impl Into<Content<Vec<u8>>>) -> Self {
        self.file(path, FileIntent::Blob(content.into()))
    }

    pub fn write_text(self, path: impl Into<String>, content: impl Into<Content<String>>) -> Self {
        self.file(path, FileIntent::Text(content.into()))
    }

    /// Rewrite a text file from its current content.
    pub fn edit_text<F>(self, path: impl Into<String>, f: F) -> Self
    where
        F: Fn(String, &ResultHistory) -> Result<String, PipelineError> + Send + Sync + 'static,
    {
        self.write_text(path, Content::edit(f))
    }

    pub fn json_patch(
        self,
        path: impl Into<String>,
        operations: impl Into<Deferred<Vec<PatchOperation>>>,
    ) -> Self {
        self.file(path, FileIntent::JsonPatch(operations.into()))
    }

    pub fn executable(
        self,
        path: impl Into<String>,
        content: impl Into<Content<Vec<u8>>>,
    ) -> Self {
        self.file(path, FileIntent::Executable(content.into()))
    }

    pub fn symlink(self, path: impl Into<String>, target: impl Into<Content<String>>) -> Self {
        self.file(path, FileIntent::Symlink(target.into()))
    }

    pub fn subdirectory(self, path: impl Into<String>, tree: impl Into<Deferred<Sha>>) -> Self {
        self.file(path, FileIntent::Subdirectory(tree.into()))
    }

    pub fn submodule(self, path: impl Into<String>, commit: impl Into<Deferred<Sha>>) -> Self {
        self.file(path, FileIntent::Submodule(commit.into()))
    }

    pub fn rename(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let to: String = to.into();
        self.file(from, FileIntent::Rename(to.trim_start_matches('/').to_string()))
    }

    pub fn delete(self, path: impl Into<String>) -> Self {
        self.file(path, FileIntent::Delete)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Input of a commit-creation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOptions {
    pub message: String,
    pub tree: Sha,
    /// Explicit parents; when unset one parent is read from a ref
    pub parents: Option<Vec<Sha>>,
    /// Branch whose tip becomes the parent
    pub parent_ref: Option<String>,
    /// Fall back to the default branch's tip when `parent_ref` is unset
    pub use_default_branch: bool,
}

impl CommitOptions {
    pub fn new(message: impl Into<String>, tree: Sha) -> Self {
        Self {
            message: message.into(),
            tree,
            parents: None,
            parent_ref: None,
            use_default_branch: false,
        }
    }

    pub fn parents(mut self, parents: Vec<Sha>) -> Self {
        self.parents = Some(parents);
        self
    }

    pub fn parent_ref(mut self, parent_ref: impl Into<String>) -> Self {
        self.parent_ref = Some(parent_ref.into());
        self
    }

    pub fn on_default_branch(mut self) -> Self {
        self.use_default_branch = true;
        self
    }
}

/// Desired state of a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOptions {
    /// Bare name or qualified ref
    pub name: String,
    /// Commit the branch should point at
    pub sha: Sha,
    /// Allow non-fast-forward updates
    pub force: bool,
}

impl BranchOptions {
    pub fn new(name: impl Into<String>, sha: Sha) -> Self {
        Self {
            name: name.into(),
            sha,
            force: false,
        }
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Desired state of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrOptions {
    pub title: String,
    /// Head branch name
    pub head: String,
    /// Base branch; the default branch if unset
    pub base: Option<String>,
    pub body: Option<String>,
    pub draft: bool,
    /// Existing pull request to update
    pub number: Option<u64>,
    /// Commit to reconcile the head branch to before creating
    pub head_sha: Option<Sha>,
}

impl PrOptions {
    pub fn new(head: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn draft(mut self, draft: bool) -> Self {
        self.draft = draft;
        self
    }

    pub fn number(mut self, number: u64) -> Self {
        self.number = Some(number);
        self
    }

    pub fn head_sha(mut self, sha: Sha) -> Self {
        self.head_sha = Some(sha);
        self
    }
}

/// Lookup of an open pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrQuery {
    pub head: String,
    pub base: Option<String>,
}

impl PrQuery {
    pub fn head(head: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            base: None,
        }
    }

    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }
}

/// Kind of an operation, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    CreateTree,
    CreateCommit,
    CreateBranch,
    UpdateBranch,
    CreateOrUpdateBranch,
    CreatePr,
    UpdatePr,
    CreateOrUpdatePr,
    MaybeCreatePr,
    FindPr,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateTree => "create_tree",
            OperationKind::CreateCommit => "create_commit",
            OperationKind::CreateBranch => "create_branch",
            OperationKind::UpdateBranch => "update_branch",
            OperationKind::CreateOrUpdateBranch => "create_or_update_branch",
            OperationKind::CreatePr => "create_pr",
            OperationKind::UpdatePr => "update_pr",
            OperationKind::CreateOrUpdatePr => "create_or_update_pr",
            OperationKind::MaybeCreatePr => "maybe_create_pr",
            OperationKind::FindPr => "find_pr",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued pipeline step.
#[derive(Debug)]
pub enum Operation {
    CreateTree(Deferred<TreeOptions>),
    CreateCommit(Deferred<CommitOptions>),
    CreateBranch(Deferred<BranchOptions>),
    UpdateBranch(Deferred<BranchOptions>),
    CreateOrUpdateBranch(Deferred<BranchOptions>),
    CreatePr(Deferred<PrOptions>),
    UpdatePr(Deferred<PrOptions>),
    CreateOrUpdatePr(Deferred<PrOptions>),
    /// Create a pull request, tolerating an existing one.
    MaybeCreatePr(Deferred<PrOptions>),
    FindPr(Deferred<PrQuery>),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateTree(_) => OperationKind::CreateTree,
            Operation::CreateCommit(_) => OperationKind::CreateCommit,
            Operation::CreateBranch(_) => OperationKind::CreateBranch,
            Operation::UpdateBranch(_) => OperationKind::UpdateBranch,
            Operation::CreateOrUpdateBranch(_) => OperationKind::CreateOrUpdateBranch,
            Operation::CreatePr(_) => OperationKind::CreatePr,
            Operation::UpdatePr(_) => OperationKind::UpdatePr,
            Operation::CreateOrUpdatePr(_) => OperationKind::CreateOrUpdatePr,
            Operation::MaybeCreatePr(_) => OperationKind::MaybeCreatePr,
            Operation::FindPr(_) => OperationKind::FindPr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let options = TreeOptions::new()
            .write_text("a.txt", "one")
            .delete("a.txt");
        assert_eq!(options.len(), 1);
        assert!(matches!(options.files["a.txt"], FileIntent::Delete));
    }

    #[test]
    fn leading_slash_is_stripped() {
        let options = TreeOptions::new()
            .write_text("/docs/a.md", "x")
            .rename("/b", "/c");
        assert!(options.files.contains_key("docs/a.md"));
        assert!(matches!(options.files["b"], FileIntent::Rename(ref to) if to == "c"));
    }

    #[test]
    fn intent_names() {
        let options = TreeOptions::new()
            .write("bin", b"\x00\x01")
            .executable("run.sh", "#!/bin/sh\n")
            .symlink("link", "target")
            .json_patch("package.json", Vec::<PatchOperation>::new());
        let names: Vec<_> = options.files.values().map(FileIntent::name).collect();
        assert_eq!(names, ["write", "symlink", "json_patch", "executable"]);
    }

    #[test]
    fn commit_options_builder() {
        let sha = Sha::new("a".repeat(40)).unwrap();
        let options = CommitOptions::new("msg", sha.clone()).parent_ref("main");
        assert_eq!(options.parent_ref.as_deref(), Some("main"));
        assert!(options.parents.is_none());
        assert!(!options.use_default_branch);

        let explicit = CommitOptions::new("msg", sha.clone()).parents(vec![sha]);
        assert_eq!(explicit.parents.map(|p| p.len()), Some(1));
    }

    #[test]
    fn operation_kind_names() {
        let op = Operation::FindPr(PrQuery::head("feat").into());
        assert_eq!(op.kind(), OperationKind::FindPr);
        assert_eq!(
            OperationKind::CreateOrUpdateBranch.to_string(),
            "create_or_update_branch"
        );
    }
}
