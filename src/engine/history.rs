//! engine::history
//!
//! Ordered outputs of executed pipeline steps.
//!
//! # Design
//!
//! The history is append-only: entry `i` is the output of operation `i`,
//! and entries are never mutated or removed. Builders hand out typed
//! [`Step`] handles, so reading a prior result is checked for its output
//! kind at compile time and for its position at run time.
//!
//! # Example
//!
//! ```ignore
//! let tree = pipeline.create_tree(TreeOptions::new().write_text("a.txt", "hi"));
//! pipeline.create_commit(Deferred::from_fn(move |history| {
//!     let tree = history.get(tree)?;
//!     Ok(CommitOptions::new("add a.txt", tree.sha.clone()).on_default_branch())
//! }));
//! ```

use std::fmt;
use std::marker::PhantomData;

use super::error::PipelineError;
use crate::core::types::Sha;
use crate::forge::{PullRequest, TreeEntry};

/// Output of a tree-creation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeOutput {
    /// The new tree
    pub sha: Sha,
    /// Tree the entries were applied on top of
    pub base_tree: Sha,
    /// Ref the base tree was read from
    pub base_ref: String,
    /// Entries submitted
    pub entries: Vec<TreeEntry>,
}

/// Output of a commit-creation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutput {
    pub sha: Sha,
    pub tree_sha: Sha,
    pub parents: Vec<Sha>,
    pub message: String,
}

/// What a branch step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchAction {
    Created,
    Updated,
}

impl fmt::Display for BranchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchAction::Created => write!(f, "created"),
            BranchAction::Updated => write!(f, "updated"),
        }
    }
}

/// Output of a branch step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOutput {
    pub action: BranchAction,
    /// Ref in the form sent to the remote (`refs/heads/x` or `heads/x`)
    pub ref_name: String,
    /// Commit the branch now points at
    pub sha: Sha,
    /// Requested commit, when it was re-derived onto the branch tip
    pub rederived_from: Option<Sha>,
}

/// Output of a pull request step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrOutput {
    /// `None` when an open pull request already existed, or none was found
    pub pull_request: Option<PullRequest>,
    /// Branch reconciliation performed before the pull request call
    pub branch: Option<BranchOutput>,
}

/// Output of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutput {
    Tree(TreeOutput),
    Commit(CommitOutput),
    Branch(BranchOutput),
    PullRequest(PrOutput),
}

impl StepOutput {
    /// Short name of the output kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StepOutput::Tree(_) => TreeOutput::KIND,
            StepOutput::Commit(_) => CommitOutput::KIND,
            StepOutput::Branch(_) => BranchOutput::KIND,
            StepOutput::PullRequest(_) => PrOutput::KIND,
        }
    }
}

impl fmt::Display for StepOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutput::Tree(t) => write!(
                f,
                "tree {} ({} entries on {})",
                t.sha.short(7),
                t.entries.len(),
                t.base_ref
            ),
            StepOutput::Commit(c) => write!(f, "commit {} \"{}\"", c.sha.short(7), c.message),
            StepOutput::Branch(b) => {
                write!(f, "{} {} -> {}", b.action, b.ref_name, b.sha.short(7))?;
                if let Some(original) = &b.rederived_from {
                    write!(f, " (re-derived from {})", original.short(7))?;
                }
                Ok(())
            }
            StepOutput::PullRequest(p) => match &p.pull_request {
                Some(pr) => write!(f, "pull request #{} {}", pr.number, pr.url),
                None => write!(f, "no new pull request"),
            },
        }
    }
}

/// Typed view of one [`StepOutput`] variant.
pub trait StepKind: Sized {
    /// Name used in errors and logs.
    const KIND: &'static str;

    /// Borrow this kind out of an output, if it matches.
    fn extract(output: &StepOutput) -> Option<&Self>;
}

macro_rules! step_kind {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl StepKind for $ty {
            const KIND: &'static str = $name;

            fn extract(output: &StepOutput) -> Option<&Self> {
                match output {
                    StepOutput::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

step_kind!(TreeOutput, Tree, "tree");
step_kind!(CommitOutput, Commit, "commit");
step_kind!(BranchOutput, Branch, "branch");
step_kind!(PrOutput, PullRequest, "pull request");

/// Position of an appended operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepId(pub(crate) usize);

impl StepId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Typed handle to the output of an appended operation.
pub struct Step<T> {
    id: StepId,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Step<T> {
    pub(crate) fn new(id: StepId) -> Self {
        Self {
            id,
            _kind: PhantomData,
        }
    }

    pub fn id(&self) -> StepId {
        self.id
    }

    pub fn index(&self) -> usize {
        self.id.0
    }
}

impl<T> Clone for Step<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Step<T> {}

impl<T> PartialEq for Step<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Step<T> {}

impl<T: StepKind> fmt::Debug for Step<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step<{}>({})", T::KIND, self.id.0)
    }
}

/// Append-only outputs of the steps executed so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultHistory {
    outputs: Vec<StepOutput>,
}

impl ResultHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, output: StepOutput) {
        self.outputs.push(output);
    }

    /// Number of executed steps.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Output at a raw position.
    pub fn at(&self, index: usize) -> Option<&StepOutput> {
        self.outputs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepOutput> {
        self.outputs.iter()
    }

    pub fn last(&self) -> Option<&StepOutput> {
        self.outputs.last()
    }

    /// Read the output of a prior step.
    ///
    /// # Errors
    ///
    /// `PipelineError::Build` if the step has not executed yet.
    pub fn get<T: StepKind>(&self, step: Step<T>) -> Result<&T, PipelineError> {
        self.get_at(step.index())
    }

    /// Read the output at `index` as kind `T`.
    ///
    /// # Errors
    ///
    /// `PipelineError::Build` if the index is out of range or holds a
    /// different kind of output.
    pub fn get_at<T: StepKind>(&self, index: usize) -> Result<&T, PipelineError> {
        let output = self.outputs.get(index).ok_or_else(|| {
            PipelineError::Build(format!(
                "step {} has not executed ({} steps completed)",
                index,
                self.outputs.len()
            ))
        })?;
        T::extract(output).ok_or_else(|| {
            PipelineError::Build(format!(
                "step {} produced a {}, not a {}",
                index,
                output.kind(),
                T::KIND
            ))
        })
    }

    /// Find a commit created earlier in this run.
    pub fn commit_by_sha(&self, sha: &Sha) -> Option<&CommitOutput> {
        self.outputs.iter().find_map(|o| match o {
            StepOutput::Commit(c) if &c.sha == sha => Some(c),
            _ => None,
        })
    }

    /// Find a tree created earlier in this run.
    pub fn tree_by_sha(&self, sha: &Sha) -> Option<&TreeOutput> {
        self.outputs.iter().find_map(|o| match o {
            StepOutput::Tree(t) if &t.sha == sha => Some(t),
            _ => None,
        })
    }

    pub fn into_outputs(self) -> Vec<StepOutput> {
        self.outputs
    }
}

impl<'a> IntoIterator for &'a ResultHistory {
    type Item = &'a StepOutput;
    type IntoIter = std::slice::Iter<'a, StepOutput>;

    fn into_iter(self) -> Self::IntoIter {
        self.outputs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(c: char) -> Sha {
        Sha::new(c.to_string().repeat(40)).unwrap()
    }

    fn commit(c: char) -> StepOutput {
        StepOutput::Commit(CommitOutput {
            sha: sha(c),
            tree_sha: sha('f'),
            parents: vec![],
            message: "msg".to_string(),
        })
    }

    #[test]
    fn typed_get() {
        let mut history = ResultHistory::new();
        history.push(commit('a'));

        let step: Step<CommitOutput> = Step::new(StepId(0));
        assert_eq!(history.get(step).unwrap().sha, sha('a'));
    }

    #[test]
    fn wrong_kind_is_build_error() {
        let mut history = ResultHistory::new();
        history.push(commit('a'));

        let err = history.get_at::<TreeOutput>(0).unwrap_err();
        assert!(matches!(err, PipelineError::Build(ref m) if m.contains("not a tree")));
    }

    #[test]
    fn future_step_is_build_error() {
        let history = ResultHistory::new();
        let step: Step<TreeOutput> = Step::new(StepId(3));
        let err = history.get(step).unwrap_err();
        assert!(matches!(err, PipelineError::Build(ref m) if m.contains("has not executed")));
    }

    #[test]
    fn find_commit_by_sha() {
        let mut history = ResultHistory::new();
        history.push(commit('a'));
        history.push(commit('b'));

        assert_eq!(history.commit_by_sha(&sha('b')).unwrap().sha, sha('b'));
        assert!(history.commit_by_sha(&sha('c')).is_none());
        assert!(history.tree_by_sha(&sha('f')).is_none());
    }

    #[test]
    fn display_branch_output() {
        let output = StepOutput::Branch(BranchOutput {
            action: BranchAction::Updated,
            ref_name: "heads/feat".to_string(),
            sha: sha('a'),
            rederived_from: Some(sha('b')),
        });
        assert_eq!(
            output.to_string(),
            "updated heads/feat -> aaaaaaa (re-derived from bbbbbbb)"
        );
    }

    #[test]
    fn step_handles_are_copy() {
        let step: Step<TreeOutput> = Step::new(StepId(1));
        let copy = step;
        assert_eq!(step, copy);
        assert_eq!(format!("{:?}", copy), "Step<tree>(1)");
    }
}
