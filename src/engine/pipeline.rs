//! engine::pipeline
//!
//! Ordered operation queue with result threading.
//!
//! # Execution
//!
//! `run` consumes the pipeline and executes operations strictly in the
//! order they were appended. Each operation resolves its payload against
//! the outputs of the steps before it, runs its handler, and appends its
//! output to the history.
//!
//! # Failure
//!
//! Execution is not transactional. The first failing step stops the run;
//! [`RunError`] carries the index of that step and the outputs of every
//! step that completed before it. Remote effects of completed steps stay.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use forgepipe::engine::{BranchOptions, CommitOptions, Deferred, Pipeline, TreeOptions};
//!
//! let mut pipeline = Pipeline::new(forge);
//! let tree = pipeline.create_tree(TreeOptions::new().write_text("hello.txt", "Hi"));
//! let commit = pipeline.create_commit(Deferred::from_fn(move |h| {
//!     Ok(CommitOptions::new("add hello", h.get(tree)?.sha.clone()).on_default_branch())
//! }));
//! pipeline.create_or_update_branch(Deferred::from_fn(move |h| {
//!     Ok(BranchOptions::new("feat", h.get(commit)?.sha.clone()))
//! }));
//!
//! let history = pipeline.run().await?;
//! assert_eq!(history.len(), 3);
//! ```

use std::sync::Arc;

use tracing::Instrument;

use super::deferred::Deferred;
use super::error::{PipelineError, RunError};
use super::history::{
    BranchOutput, CommitOutput, PrOutput, ResultHistory, Step, StepId, StepOutput, TreeOutput,
};
use super::ops::{
    BranchOptions, CommitOptions, Operation, OperationKind, PrOptions, PrQuery, TreeOptions,
};
use super::tree::TreeRecipes;
use super::{reconcile, tree};
use crate::core::naming;
use crate::forge::{CreateCommitRequest, Forge};

/// A queue of operations against one forge.
pub struct Pipeline {
    forge: Arc<dyn Forge>,
    operations: Vec<Operation>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("forge", &self.forge.name())
            .field("operations", &self.kinds())
            .finish()
    }
}

impl Pipeline {
    pub fn new(forge: Arc<dyn Forge>) -> Self {
        Self {
            forge,
            operations: Vec::new(),
        }
    }

    /// Append an operation. Order is preserved; nothing is deduplicated.
    pub fn op(&mut self, operation: Operation) -> StepId {
        let id = StepId(self.operations.len());
        self.operations.push(operation);
        id
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Kinds of the queued operations, in order.
    pub fn kinds(&self) -> Vec<OperationKind> {
        self.operations.iter().map(Operation::kind).collect()
    }

    pub fn create_tree(&mut self, options: impl Into<Deferred<TreeOptions>>) -> Step<TreeOutput> {
        Step::new(self.op(Operation::CreateTree(options.into())))
    }

    pub fn create_commit(
        &mut self,
        options: impl Into<Deferred<CommitOptions>>,
    ) -> Step<CommitOutput> {
        Step::new(self.op(Operation::CreateCommit(options.into())))
    }

    pub fn create_branch(
        &mut self,
        options: impl Into<Deferred<BranchOptions>>,
    ) -> Step<BranchOutput> {
        Step::new(self.op(Operation::CreateBranch(options.into())))
    }

    pub fn update_branch(
        &mut self,
        options: impl Into<Deferred<BranchOptions>>,
    ) -> Step<BranchOutput> {
        Step::new(self.op(Operation::UpdateBranch(options.into())))
    }

    pub fn create_or_update_branch(
        &mut self,
        options: impl Into<Deferred<BranchOptions>>,
    ) -> Step<BranchOutput> {
        Step::new(self.op(Operation::CreateOrUpdateBranch(options.into())))
    }

    pub fn create_pr(&mut self, options: impl Into<Deferred<PrOptions>>) -> Step<PrOutput> {
        Step::new(self.op(Operation::CreatePr(options.into())))
    }

    pub fn update_pr(&mut self, options: impl Into<Deferred<PrOptions>>) -> Step<PrOutput> {
        Step::new(self.op(Operation::UpdatePr(options.into())))
    }

    pub fn create_or_update_pr(
        &mut self,
        options: impl Into<Deferred<PrOptions>>,
    ) -> Step<PrOutput> {
        Step::new(self.op(Operation::CreateOrUpdatePr(options.into())))
    }

    pub fn maybe_create_pr(&mut self, options: impl Into<Deferred<PrOptions>>) -> Step<PrOutput> {
        Step::new(self.op(Operation::MaybeCreatePr(options.into())))
    }

    pub fn find_pr(&mut self, query: impl Into<Deferred<PrQuery>>) -> Step<PrOutput> {
        Step::new(self.op(Operation::FindPr(query.into())))
    }

    /// Execute every operation in order.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] for the first failing step, carrying the
    /// outputs of the steps that completed before it.
    pub async fn run(self) -> Result<ResultHistory, RunError> {
        let Pipeline { forge, operations } = self;
        let total = operations.len();
        let mut history = ResultHistory::new();
        let mut recipes = TreeRecipes::default();

        for (index, operation) in operations.into_iter().enumerate() {
            let kind = operation.kind();
            let span = tracing::info_span!("step", index, kind = %kind);
            let result = execute(forge.as_ref(), operation, &history, &mut recipes)
                .instrument(span)
                .await;

            match result {
                Ok(output) => {
                    tracing::info!(index, total, kind = %kind, "{}", output);
                    history.push(output);
                }
                Err(source) => {
                    tracing::debug!(index, kind = %kind, error = %source, "step failed");
                    return Err(RunError {
                        step: index,
                        kind,
                        source,
                        completed: history,
                    });
                }
            }
        }

        Ok(history)
    }
}

/// Resolve an operation's payload and dispatch it to its handler.
async fn execute(
    forge: &dyn Forge,
    operation: Operation,
    history: &ResultHistory,
    recipes: &mut TreeRecipes,
) -> Result<StepOutput, PipelineError> {
    match operation {
        Operation::CreateTree(options) => {
            let options = options.resolve(history).await?;
            let (output, recipe) = tree::build_tree(forge, options, history).await?;
            recipes.insert(output.sha.clone(), recipe);
            Ok(StepOutput::Tree(output))
        }
        Operation::CreateCommit(options) => {
            let options = options.resolve(history).await?;
            create_commit(forge, options).await.map(StepOutput::Commit)
        }
        Operation::CreateBranch(options) => {
            let options = options.resolve(history).await?;
            reconcile::create_branch(forge, options)
                .await
                .map(StepOutput::Branch)
        }
        Operation::UpdateBranch(options) => {
            let options = options.resolve(history).await?;
            reconcile::update_branch(forge, options)
                .await
                .map(StepOutput::Branch)
        }
        Operation::CreateOrUpdateBranch(options) => {
            let options = options.resolve(history).await?;
            reconcile::create_or_update_branch(forge, options, history, recipes)
                .await
                .map(StepOutput::Branch)
        }
        Operation::CreatePr(options) => {
            let options = options.resolve(history).await?;
            reconcile::create_pr(forge, options)
                .await
                .map(StepOutput::PullRequest)
        }
        Operation::UpdatePr(options) => {
            let options = options.resolve(history).await?;
            reconcile::update_pr(forge, options)
                .await
                .map(StepOutput::PullRequest)
        }
        Operation::CreateOrUpdatePr(options) => {
            let options = options.resolve(history).await?;
            reconcile::create_or_update_pr(forge, options, history, recipes)
                .await
                .map(StepOutput::PullRequest)
        }
        Operation::MaybeCreatePr(options) => {
            let options = options.resolve(history).await?;
            reconcile::maybe_create_pr(forge, options)
                .await
                .map(StepOutput::PullRequest)
        }
        Operation::FindPr(query) => {
            let query = query.resolve(history).await?;
            reconcile::find_pr(forge, query)
                .await
                .map(StepOutput::PullRequest)
        }
    }
}

/// Create a commit, reading its parent from a ref when none are given.
async fn create_commit(
    forge: &dyn Forge,
    options: CommitOptions,
) -> Result<CommitOutput, PipelineError> {
    let parents = match options.parents {
        Some(parents) => parents,
        None => {
            let parent_ref = match options.parent_ref {
                Some(parent_ref) => parent_ref,
                None if options.use_default_branch => {
                    forge.get_repository().await?.default_branch
                }
                None => return Err(PipelineError::Build("parent ref is undefined".to_string())),
            };
            let parent = forge.get_branch(naming::branch_name(&parent_ref)).await?;
            tracing::debug!(parent_ref = %parent_ref, parent = %parent.commit_sha, "resolved parent");
            vec![parent.commit_sha]
        }
    };

    let commit = forge
        .create_commit(CreateCommitRequest {
            message: options.message,
            tree: options.tree,
            parents,
        })
        .await?;

    Ok(CommitOutput {
        sha: commit.sha,
        tree_sha: commit.tree_sha,
        parents: commit.parents,
        message: commit.message,
    })
}
