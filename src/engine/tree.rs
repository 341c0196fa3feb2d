//! engine::tree
//!
//! Turns per-path intents into one tree-creation call.
//!
//! # Algorithm
//!
//! 1. Resolve the base branch (explicit, or the default branch) to its tree.
//! 2. Resolve every deferred input into a [`TreeRecipe`]. Edits stay
//!    runnable.
//! 3. Reconcile every path concurrently against the base commit. Each path
//!    yields one entry, or two for a rename (the new path, and a deletion
//!    of the old one).
//! 4. Submit the base tree and the flattened entries in a single call.
//!
//! Edits read existing content at the base commit; a missing file is
//! presented to the edit as empty content. Deleting an absent path is
//! not an error.
//!
//! [`rebuild_tree`] runs steps 3 and 4 again on another branch, so edits
//! and patches see that branch's content.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use futures::future::try_join_all;

use super::deferred::Prepared;
use super::error::PipelineError;
use super::history::{ResultHistory, TreeOutput};
use super::json_patch::{self, PatchOperation};
use super::ops::{FileIntent, TreeOptions};
use crate::core::naming;
use crate::core::types::{FileMode, Sha};
use crate::forge::{
    BranchInfo, ContentKind, Contents, CreateTreeRequest, Forge, ForgeError, TreeEntry,
};

/// One path's intent with its deferred inputs resolved.
#[derive(Debug, Clone)]
enum PathPlan {
    Bytes(FileMode, Prepared<Vec<u8>>),
    Text(FileMode, Prepared<String>),
    JsonPatch(Vec<PatchOperation>),
    Object(FileMode, Sha),
    Rename(String),
    Delete,
}

/// A tree step's intents, resolved and replayable on any base.
#[derive(Debug, Clone, Default)]
pub struct TreeRecipe {
    files: BTreeMap<String, PathPlan>,
}

/// Recipes of the trees built during one run, by tree SHA.
#[derive(Debug, Clone, Default)]
pub struct TreeRecipes {
    by_tree: HashMap<Sha, TreeRecipe>,
}

impl TreeRecipes {
    pub fn insert(&mut self, tree: Sha, recipe: TreeRecipe) {
        self.by_tree.insert(tree, recipe);
    }

    pub fn get(&self, tree: &Sha) -> Option<&TreeRecipe> {
        self.by_tree.get(tree)
    }
}

/// Reject paths and renames that cannot form a tree.
fn validate(options: &TreeOptions) -> Result<(), PipelineError> {
    if let Some(path) = options
        .files
        .keys()
        .find(|p| p.is_empty() || p.ends_with('/'))
    {
        return Err(PipelineError::Build(format!("invalid tree path '{}'", path)));
    }

    let mut targets = BTreeSet::new();
    for (from, intent) in &options.files {
        let FileIntent::Rename(to) = intent else {
            continue;
        };
        if to.is_empty() || to.ends_with('/') {
            return Err(PipelineError::Build(format!("invalid rename target '{}'", to)));
        }
        if options.files.contains_key(to) {
            return Err(PipelineError::Build(format!(
                "rename of '{}' targets '{}', which is also declared",
                from, to
            )));
        }
        if !targets.insert(to.as_str()) {
            return Err(PipelineError::Build(format!(
                "more than one rename targets '{}'",
                to
            )));
        }
    }
    Ok(())
}

/// Build and submit a tree from `options`.
///
/// Returns the output together with the recipe needed to rebuild it.
pub async fn build_tree(
    forge: &dyn Forge,
    options: TreeOptions,
    history: &ResultHistory,
) -> Result<(TreeOutput, TreeRecipe), PipelineError> {
    validate(&options)?;

    let base_ref = match options.base_ref {
        Some(base_ref) => naming::branch_name(&base_ref).to_string(),
        None => forge.get_repository().await?.default_branch,
    };
    let base = forge.get_branch(&base_ref).await?;

    let prepared = options
        .files
        .into_iter()
        .map(|(path, intent)| async move {
            Ok::<_, PipelineError>((path, prepare(intent, history).await?))
        });
    let recipe = TreeRecipe {
        files: try_join_all(prepared).await?.into_iter().collect(),
    };

    let output = submit(forge, &recipe, base_ref, &base, history).await?;
    Ok((output, recipe))
}

/// Apply a recipe on top of `branch`, re-reading existing content there.
pub async fn rebuild_tree(
    forge: &dyn Forge,
    recipe: &TreeRecipe,
    branch: &BranchInfo,
    history: &ResultHistory,
) -> Result<TreeOutput, PipelineError> {
    submit(forge, recipe, branch.name.clone(), branch, history).await
}

async fn submit(
    forge: &dyn Forge,
    recipe: &TreeRecipe,
    base_ref: String,
    base: &BranchInfo,
    history: &ResultHistory,
) -> Result<TreeOutput, PipelineError> {
    tracing::debug!(
        base_ref = %base_ref,
        base_tree = %base.tree_sha,
        paths = recipe.files.len(),
        "building tree"
    );

    let base_commit = base.commit_sha.as_str();
    let per_path = recipe
        .files
        .iter()
        .map(|(path, plan)| reconcile_path(forge, base_commit, path, plan, history));
    let entries: Vec<TreeEntry> = try_join_all(per_path).await?.into_iter().flatten().collect();

    let tree = forge
        .create_tree(CreateTreeRequest {
            base_tree: Some(base.tree_sha.clone()),
            entries: entries.clone(),
        })
        .await?;

    Ok(TreeOutput {
        sha: tree.sha,
        base_tree: base.tree_sha.clone(),
        base_ref,
        entries,
    })
}

async fn prepare(intent: FileIntent, history: &ResultHistory) -> Result<PathPlan, PipelineError> {
    Ok(match intent {
        FileIntent::Blob(content) => PathPlan::Bytes(FileMode::File, content.prepare(history).await?),
        FileIntent::Executable(content) => {
            PathPlan::Bytes(FileMode::Executable, content.prepare(history).await?)
        }
        FileIntent::Text(content) => PathPlan::Text(FileMode::File, content.prepare(history).await?),
        FileIntent::Symlink(target) => {
            PathPlan::Text(FileMode::Symlink, target.prepare(history).await?)
        }
        FileIntent::JsonPatch(operations) => PathPlan::JsonPatch(operations.resolve(history).await?),
        FileIntent::Subdirectory(tree) => {
            PathPlan::Object(FileMode::Subdirectory, tree.resolve(history).await?)
        }
        FileIntent::Submodule(commit) => {
            PathPlan::Object(FileMode::Submodule, commit.resolve(history).await?)
        }
        FileIntent::Rename(to) => PathPlan::Rename(to),
        FileIntent::Delete => PathPlan::Delete,
    })
}

/// Entries for one path.
async fn reconcile_path(
    forge: &dyn Forge,
    git_ref: &str,
    path: &str,
    plan: &PathPlan,
    history: &ResultHistory,
) -> Result<Vec<TreeEntry>, PipelineError> {
    let entry = match plan {
        PathPlan::Bytes(mode, content) => {
            let existing = if content.needs_existing() {
                read_existing(forge, git_ref, path).await?
            } else {
                None
            };
            let bytes = content.apply(existing, history).await?;
            upload(forge, path, *mode, &bytes).await?
        }
        PathPlan::Text(mode, content) => {
            let existing = if content.needs_existing() {
                read_text(forge, git_ref, path).await?
            } else {
                None
            };
            let text = content.apply(existing, history).await?;
            upload(forge, path, *mode, text.as_bytes()).await?
        }
        PathPlan::JsonPatch(operations) => {
            let existing = read_text(forge, git_ref, path).await?.unwrap_or_default();
            let patched = patch_json(path, &existing, operations)?;
            upload(forge, path, FileMode::File, patched.as_bytes()).await?
        }
        PathPlan::Object(mode, sha) => TreeEntry::new(path, *mode, sha.clone()),
        PathPlan::Rename(to) => return rename(forge, git_ref, path, to).await,
        PathPlan::Delete => TreeEntry::deletion(path, FileMode::File),
    };
    Ok(vec![entry])
}

async fn upload(
    forge: &dyn Forge,
    path: &str,
    mode: FileMode,
    content: &[u8],
) -> Result<TreeEntry, PipelineError> {
    let sha = forge.create_blob(content).await?;
    tracing::debug!(path = %path, %mode, blob = %sha, bytes = content.len(), "uploaded blob");
    Ok(TreeEntry::new(path, mode, sha))
}

/// Read the raw bytes at `path`, or `None` if absent.
async fn read_existing(
    forge: &dyn Forge,
    git_ref: &str,
    path: &str,
) -> Result<Option<Vec<u8>>, PipelineError> {
    match forge.read_raw(path, git_ref).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(ForgeError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn read_text(
    forge: &dyn Forge,
    git_ref: &str,
    path: &str,
) -> Result<Option<String>, PipelineError> {
    read_existing(forge, git_ref, path)
        .await?
        .map(|bytes| {
            String::from_utf8(bytes).map_err(|_| PipelineError::Content {
                path: path.to_string(),
                message: "existing content is not valid UTF-8".to_string(),
            })
        })
        .transpose()
}

/// Apply a patch to JSON text. Blank text is treated as an empty object.
/// Object keys keep their order.
fn patch_json(
    path: &str,
    existing: &str,
    operations: &[PatchOperation],
) -> Result<String, PipelineError> {
    let mut doc = if existing.trim().is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(existing).map_err(|e| PipelineError::Content {
            path: path.to_string(),
            message: format!("existing content is not valid JSON: {}", e),
        })?
    };

    json_patch::apply(&mut doc, operations).map_err(|source| PipelineError::Patch {
        path: path.to_string(),
        source,
    })?;

    let mut text = serde_json::to_string_pretty(&doc).map_err(|e| PipelineError::Content {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    text.push('\n');
    Ok(text)
}

/// Move the entry at `from` to `to`, keeping its object and mode.
async fn rename(
    forge: &dyn Forge,
    git_ref: &str,
    from: &str,
    to: &str,
) -> Result<Vec<TreeEntry>, PipelineError> {
    let entry = match forge.read_contents(from, git_ref).await? {
        Contents::Entry(entry) if entry.kind != ContentKind::Dir => entry,
        Contents::Entry(_) | Contents::Directory(_) => {
            return Err(PipelineError::RenameDirectory(from.to_string()));
        }
    };
    let mode = entry.kind.mode();
    tracing::debug!(from = %from, to = %to, sha = %entry.sha, "renaming");
    Ok(vec![
        TreeEntry::new(to, mode, entry.sha),
        TreeEntry::deletion(from, mode),
    ])
}
