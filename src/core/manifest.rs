//! core::manifest
//!
//! Declarative pipeline files.
//!
//! # Format
//!
//! A manifest is a TOML file with one `[[step]]` table per operation.
//! Values produced by earlier steps are referenced by step index through
//! `*_from` keys; each reference becomes a deferred value that reads the
//! typed output of that step when the pipeline runs.
//!
//! ```toml
//! [[step]]
//! kind = "tree"
//! files = [
//!   { path = "hello.txt", write_text = "Hi\n" },
//!   { path = "package.json", json_patch = [{ op = "replace", path = "/version", value = "2.0.0" }] },
//!   { path = "old.txt", rename = "new.txt" },
//!   { path = "stale.txt", delete = true },
//! ]
//!
//! [[step]]
//! kind = "commit"
//! message = "add hello"
//! tree_from = 0
//!
//! [[step]]
//! kind = "branch"
//! name = "feat"
//! sha_from = 1
//!
//! [[step]]
//! kind = "pr"
//! mode = "maybe_create"
//! head = "feat"
//! title = "Add hello"
//! ```
//!
//! `write` and `executable` name a local file, relative to the manifest,
//! whose bytes are uploaded. `write_text` and `symlink` take literal text.
//! A commit without `parents` or `parent_ref` takes its parent from the
//! base ref of the tree it references, or the default branch.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::Sha;
use crate::engine::{
    BranchOptions, BranchOutput, CommitOptions, CommitOutput, Deferred, OperationKind,
    PatchOperation, Pipeline, PipelineError, PrOptions, PrOutput, PrQuery, ResultHistory, Step,
    TreeOptions, TreeOutput,
};
use crate::forge::Forge;

/// Errors from loading or compiling a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse manifest '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("step {step}: {message}")]
    Invalid { step: usize, message: String },
}

fn invalid(step: usize, message: impl Into<String>) -> ManifestError {
    ManifestError::Invalid {
        step,
        message: message.into(),
    }
}

/// A parsed pipeline file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "step", default)]
    pub steps: Vec<StepDecl>,

    /// Directory local file references resolve against
    #[serde(skip)]
    base_dir: PathBuf,
}

/// One `[[step]]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepDecl {
    Tree(TreeStep),
    Commit(CommitStep),
    Branch(BranchStep),
    Pr(PrStep),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TreeStep {
    #[serde(default)]
    pub base_ref: Option<String>,
    #[serde(default)]
    pub files: Vec<FileDecl>,
}

/// One path of a tree step. Exactly one intent key must be set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileDecl {
    pub path: String,
    pub write: Option<PathBuf>,
    pub write_text: Option<String>,
    pub executable: Option<PathBuf>,
    pub symlink: Option<String>,
    pub json_patch: Option<Vec<PatchOperation>>,
    pub submodule: Option<Sha>,
    pub rename: Option<String>,
    pub delete: bool,
}

impl FileDecl {
    /// Names of the intent keys that are set.
    fn intents(&self) -> Vec<&'static str> {
        let mut set = Vec::new();
        if self.write.is_some() {
            set.push("write");
        }
        if self.write_text.is_some() {
            set.push("write_text");
        }
        if self.executable.is_some() {
            set.push("executable");
        }
        if self.symlink.is_some() {
            set.push("symlink");
        }
        if self.json_patch.is_some() {
            set.push("json_patch");
        }
        if self.submodule.is_some() {
            set.push("submodule");
        }
        if self.rename.is_some() {
            set.push("rename");
        }
        if self.delete {
            set.push("delete");
        }
        set
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommitStep {
    pub message: String,
    #[serde(default)]
    pub tree: Option<Sha>,
    #[serde(default)]
    pub tree_from: Option<usize>,
    #[serde(default)]
    pub parents: Option<Vec<Sha>>,
    #[serde(default)]
    pub parent_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchMode {
    #[default]
    CreateOrUpdate,
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BranchStep {
    pub name: String,
    #[serde(default)]
    pub mode: BranchMode,
    #[serde(default)]
    pub sha: Option<Sha>,
    #[serde(default)]
    pub sha_from: Option<usize>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrMode {
    #[default]
    CreateOrUpdate,
    Create,
    MaybeCreate,
    Update,
    Find,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PrStep {
    pub head: String,
    #[serde(default)]
    pub mode: PrMode,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub draft: Option<bool>,
    #[serde(default)]
    pub number: Option<u64>,
    /// Head commit for `create_or_update`
    #[serde(default)]
    pub sha: Option<Sha>,
    #[serde(default)]
    pub sha_from: Option<usize>,
}

impl StepDecl {
    /// Operation this step compiles to.
    pub fn operation_kind(&self) -> OperationKind {
        match self {
            StepDecl::Tree(_) => OperationKind::CreateTree,
            StepDecl::Commit(_) => OperationKind::CreateCommit,
            StepDecl::Branch(b) => match b.mode {
                BranchMode::CreateOrUpdate => OperationKind::CreateOrUpdateBranch,
                BranchMode::Create => OperationKind::CreateBranch,
                BranchMode::Update => OperationKind::UpdateBranch,
            },
            StepDecl::Pr(p) => match p.mode {
                PrMode::CreateOrUpdate => OperationKind::CreateOrUpdatePr,
                PrMode::Create => OperationKind::CreatePr,
                PrMode::MaybeCreate => OperationKind::MaybeCreatePr,
                PrMode::Update => OperationKind::UpdatePr,
                PrMode::Find => OperationKind::FindPr,
            },
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            StepDecl::Tree(_) => "tree",
            StepDecl::Commit(_) => "commit",
            StepDecl::Branch(_) => "branch",
            StepDecl::Pr(_) => "pr",
        }
    }
}

/// Typed handle to a compiled step.
#[derive(Clone, Copy)]
enum Handle {
    Tree(Step<TreeOutput>),
    Commit(Step<CommitOutput>),
    Branch(Step<BranchOutput>),
    Pr(Step<PrOutput>),
}

/// Where a commit id comes from.
#[derive(Clone)]
enum ShaSource {
    Literal(Sha),
    Commit(Step<CommitOutput>),
    Branch(Step<BranchOutput>),
}

impl ShaSource {
    fn read(&self, history: &ResultHistory) -> Result<Sha, PipelineError> {
        match self {
            ShaSource::Literal(sha) => Ok(sha.clone()),
            ShaSource::Commit(step) => Ok(history.get(*step)?.sha.clone()),
            ShaSource::Branch(step) => Ok(history.get(*step)?.sha.clone()),
        }
    }
}

impl Manifest {
    /// Load and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse(&contents, base_dir).map_err(|e| match e {
            ManifestError::Parse { message, .. } => ManifestError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// Parse and validate manifest text.
    pub fn parse(contents: &str, base_dir: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let mut manifest: Manifest =
            toml::from_str(contents).map_err(|e| ManifestError::Parse {
                path: PathBuf::from("<inline>"),
                message: e.to_string(),
            })?;
        manifest.base_dir = base_dir.into();
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check step shapes and that every reference points at an earlier
    /// step of a usable kind.
    pub fn validate(&self) -> Result<(), ManifestError> {
        for (index, step) in self.steps.iter().enumerate() {
            match step {
                StepDecl::Tree(tree) => {
                    for file in &tree.files {
                        if file.path.trim_matches('/').is_empty() {
                            return Err(invalid(index, "file entry has an empty path"));
                        }
                        let intents = file.intents();
                        if intents.len() != 1 {
                            return Err(invalid(
                                index,
                                format!(
                                    "'{}' must set exactly one of write, write_text, executable, \
                                     symlink, json_patch, submodule, rename, delete (found {})",
                                    file.path,
                                    intents.len()
                                ),
                            ));
                        }
                    }
                }
                StepDecl::Commit(commit) => {
                    if commit.message.trim().is_empty() {
                        return Err(invalid(index, "commit message is empty"));
                    }
                    match (&commit.tree, commit.tree_from) {
                        (Some(_), None) => {}
                        (None, Some(from)) => self.check_reference(index, from, &["tree"])?,
                        _ => return Err(invalid(index, "set exactly one of tree or tree_from")),
                    }
                }
                StepDecl::Branch(branch) => {
                    if branch.name.trim().is_empty() {
                        return Err(invalid(index, "branch name is empty"));
                    }
                    self.check_sha(index, &branch.sha, branch.sha_from, true)?;
                }
                StepDecl::Pr(pr) => {
                    if pr.head.trim().is_empty() {
                        return Err(invalid(index, "pull request head is empty"));
                    }
                    let creates = matches!(
                        pr.mode,
                        PrMode::CreateOrUpdate | PrMode::Create | PrMode::MaybeCreate
                    );
                    if creates && pr.title.trim().is_empty() {
                        return Err(invalid(index, "pull request title is empty"));
                    }
                    let needs_sha = pr.mode == PrMode::CreateOrUpdate;
                    if needs_sha || pr.sha.is_some() || pr.sha_from.is_some() {
                        self.check_sha(index, &pr.sha, pr.sha_from, needs_sha)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_sha(
        &self,
        index: usize,
        sha: &Option<Sha>,
        sha_from: Option<usize>,
        required: bool,
    ) -> Result<(), ManifestError> {
        match (sha, sha_from) {
            (Some(_), None) => Ok(()),
            (None, Some(from)) => self.check_reference(index, from, &["commit", "branch"]),
            (None, None) if !required => Ok(()),
            _ => Err(invalid(index, "set exactly one of sha or sha_from")),
        }
    }

    fn check_reference(
        &self,
        index: usize,
        from: usize,
        kinds: &[&str],
    ) -> Result<(), ManifestError> {
        if from >= index {
            return Err(invalid(
                index,
                format!("references step {}, which does not run before it", from),
            ));
        }
        let kind = self.steps[from].kind_name();
        if !kinds.contains(&kind) {
            return Err(invalid(
                index,
                format!(
                    "references step {} ({}), expected {}",
                    from,
                    kind,
                    kinds.join(" or ")
                ),
            ));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// One line per step, for previews.
    pub fn describe(&self) -> Vec<String> {
        self.steps
            .iter()
            .enumerate()
            .map(|(index, step)| format!("{}: {} {}", index, step.operation_kind(), detail(step)))
            .collect()
    }

    /// Compile into a pipeline against `forge`.
    ///
    /// Local files named by `write` and `executable` are read here.
    pub fn build(&self, forge: Arc<dyn Forge>, default_draft: bool) -> Result<Pipeline, ManifestError> {
        self.validate()?;

        let mut pipeline = Pipeline::new(forge);
        let mut handles: Vec<Handle> = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            let handle = match step {
                StepDecl::Tree(decl) => {
                    Handle::Tree(pipeline.create_tree(self.tree_options(index, decl)?))
                }
                StepDecl::Commit(decl) => {
                    Handle::Commit(pipeline.create_commit(commit_options(index, decl, &handles)?))
                }
                StepDecl::Branch(decl) => {
                    let source = sha_source(index, &decl.sha, decl.sha_from, &handles)?
                        .ok_or_else(|| invalid(index, "branch needs sha or sha_from"))?;
                    let (name, force) = (decl.name.clone(), decl.force);
                    let options = Deferred::from_fn(move |h: &ResultHistory| {
                        Ok(BranchOptions::new(name, source.read(h)?).force(force))
                    });
                    Handle::Branch(match decl.mode {
                        BranchMode::CreateOrUpdate => pipeline.create_or_update_branch(options),
                        BranchMode::Create => pipeline.create_branch(options),
                        BranchMode::Update => pipeline.update_branch(options),
                    })
                }
                StepDecl::Pr(decl) => {
                    Handle::Pr(self.add_pr(&mut pipeline, index, decl, &handles, default_draft)?)
                }
            };
            handles.push(handle);
        }

        Ok(pipeline)
    }

    fn tree_options(&self, index: usize, decl: &TreeStep) -> Result<TreeOptions, ManifestError> {
        let mut options = TreeOptions::new();
        if let Some(base_ref) = &decl.base_ref {
            options = options.base_ref(base_ref.clone());
        }
        for file in &decl.files {
            let path = file.path.clone();
            options = if let Some(local) = &file.write {
                options.write(path, self.read_local(index, local)?)
            } else if let Some(text) = &file.write_text {
                options.write_text(path, text.clone())
            } else if let Some(local) = &file.executable {
                options.executable(path, self.read_local(index, local)?)
            } else if let Some(target) = &file.symlink {
                options.symlink(path, target.clone())
            } else if let Some(patch) = &file.json_patch {
                options.json_patch(path, patch.clone())
            } else if let Some(commit) = &file.submodule {
                options.submodule(path, commit.clone())
            } else if let Some(to) = &file.rename {
                options.rename(path, to.clone())
            } else if file.delete {
                options.delete(path)
            } else {
                return Err(invalid(index, format!("'{}' has no intent", file.path)));
            };
        }
        Ok(options)
    }

    fn read_local(&self, index: usize, local: &Path) -> Result<Vec<u8>, ManifestError> {
        let path = self.base_dir.join(local);
        fs::read(&path).map_err(|source| {
            tracing::debug!(step = index, path = %path.display(), "local file unreadable");
            ManifestError::Read { path, source }
        })
    }

    fn add_pr(
        &self,
        pipeline: &mut Pipeline,
        index: usize,
        decl: &PrStep,
        handles: &[Handle],
        default_draft: bool,
    ) -> Result<Step<PrOutput>, ManifestError> {
        let mut options = PrOptions::new(decl.head.clone(), decl.title.clone())
            .draft(decl.draft.unwrap_or(default_draft));
        options.base = decl.base.clone();
        options.body = decl.body.clone();
        options.number = decl.number;

        let source = sha_source(index, &decl.sha, decl.sha_from, handles)?;
        let deferred = move || {
            Deferred::from_fn(move |h: &ResultHistory| {
                let mut options = options;
                if let Some(source) = &source {
                    options.head_sha = Some(source.read(h)?);
                }
                Ok(options)
            })
        };

        Ok(match decl.mode {
            PrMode::CreateOrUpdate => pipeline.create_or_update_pr(deferred()),
            PrMode::Create => pipeline.create_pr(deferred()),
            PrMode::MaybeCreate => pipeline.maybe_create_pr(deferred()),
            PrMode::Update => pipeline.update_pr(deferred()),
            PrMode::Find => {
                let mut query = PrQuery::head(decl.head.clone());
                if let Some(base) = &decl.base {
                    query = query.base(base.clone());
                }
                pipeline.find_pr(query)
            }
        })
    }
}

fn commit_options(
    index: usize,
    decl: &CommitStep,
    handles: &[Handle],
) -> Result<Deferred<CommitOptions>, ManifestError> {
    let tree_step = match decl.tree_from {
        Some(from) => match handles.get(from) {
            Some(Handle::Tree(step)) => Some(*step),
            _ => return Err(invalid(index, format!("step {} is not a tree step", from))),
        },
        None => None,
    };
    let literal_tree = decl.tree.clone();
    let message = decl.message.clone();
    let parents = decl.parents.clone();
    let parent_ref = decl.parent_ref.clone();

    Ok(Deferred::from_fn(move |h: &ResultHistory| {
        let (tree, base_ref) = match (tree_step, literal_tree) {
            (Some(step), _) => {
                let tree = h.get(step)?;
                (tree.sha.clone(), Some(tree.base_ref.clone()))
            }
            (None, Some(sha)) => (sha, None),
            (None, None) => {
                return Err(PipelineError::Build("commit has no tree".to_string()));
            }
        };

        let mut options = CommitOptions::new(message, tree);
        if let Some(parents) = parents {
            options = options.parents(parents);
        }
        Ok(match parent_ref.or(base_ref) {
            Some(parent_ref) => options.parent_ref(parent_ref),
            None => options.on_default_branch(),
        })
    }))
}

fn sha_source(
    index: usize,
    sha: &Option<Sha>,
    sha_from: Option<usize>,
    handles: &[Handle],
) -> Result<Option<ShaSource>, ManifestError> {
    match (sha, sha_from) {
        (Some(sha), _) => Ok(Some(ShaSource::Literal(sha.clone()))),
        (None, Some(from)) => match handles.get(from) {
            Some(Handle::Commit(step)) => Ok(Some(ShaSource::Commit(*step))),
            Some(Handle::Branch(step)) => Ok(Some(ShaSource::Branch(*step))),
            _ => Err(invalid(
                index,
                format!("step {} does not produce a commit", from),
            )),
        },
        (None, None) => Ok(None),
    }
}

fn detail(step: &StepDecl) -> String {
    match step {
        StepDecl::Tree(tree) => {
            let base = tree.base_ref.as_deref().unwrap_or("<default branch>");
            let files: Vec<String> = tree
                .files
                .iter()
                .map(|f| format!("{} {}", f.intents().first().copied().unwrap_or("?"), f.path))
                .collect();
            format!("on {} [{}]", base, files.join(", "))
        }
        StepDecl::Commit(commit) => {
            let tree = match (&commit.tree, commit.tree_from) {
                (_, Some(from)) => format!("tree of step {}", from),
                (Some(sha), None) => format!("tree {}", sha.short(7)),
                (None, None) => "no tree".to_string(),
            };
            format!("\"{}\" ({})", commit.message, tree)
        }
        StepDecl::Branch(branch) => format!("{} -> {}", branch.name, sha_detail(&branch.sha, branch.sha_from)),
        StepDecl::Pr(pr) => {
            let base = pr.base.as_deref().unwrap_or("<default branch>");
            if pr.title.is_empty() {
                format!("{} -> {}", pr.head, base)
            } else {
                format!("{} -> {} \"{}\"", pr.head, base, pr.title)
            }
        }
    }
}

fn sha_detail(sha: &Option<Sha>, sha_from: Option<usize>) -> String {
    match (sha, sha_from) {
        (_, Some(from)) => format!("commit of step {}", from),
        (Some(sha), None) => sha.short(7).to_string(),
        (None, None) => "?".to_string(),
    }
}
