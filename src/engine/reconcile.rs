//! engine::reconcile
//!
//! Create-or-update reconciliation for branches and pull requests.
//!
//! # Branch state machine
//!
//! ```text
//! Unknown --probe--> NotExists --create--> Exists
//!                    Exists    --update--> Exists
//! ```
//!
//! The probe is a branch read; `NotFound` means absent and any other error
//! propagates. Creation sends `refs/heads/<name>`, updates send
//! `heads/<name>`.
//!
//! # Re-derivation
//!
//! When an existing branch is moved to a commit this run produced from a
//! tree this run produced, and that commit does not sit on the branch tip,
//! the tree is rebuilt from its recipe on the branch tip: edits and patches
//! re-run against the branch's content. A new commit (same message, branch
//! tip as parent) is created and the branch is moved to it as a
//! fast-forward. The original commit is left as it was.
//!
//! # Pull requests
//!
//! `maybe_create_pr` and `create_or_update_pr` treat "already exists" as
//! success with no new pull request.

use super::error::PipelineError;
use super::history::{BranchAction, BranchOutput, PrOutput, ResultHistory};
use super::ops::{BranchOptions, PrOptions, PrQuery};
use super::tree::{rebuild_tree, TreeRecipes};
use crate::core::naming;
use crate::core::types::Sha;
use crate::forge::{
    BranchInfo, CreateCommitRequest, CreatePrRequest, Forge, ForgeError, UpdatePrRequest,
};

/// Read a branch, mapping absence to `None`.
pub async fn probe_branch(
    forge: &dyn Forge,
    name: &str,
) -> Result<Option<BranchInfo>, PipelineError> {
    let branch = naming::branch_name(name);
    match forge.get_branch(branch).await {
        Ok(info) => {
            tracing::debug!(branch, tip = %info.commit_sha, "branch exists");
            Ok(Some(info))
        }
        Err(ForgeError::NotFound(_)) => {
            tracing::debug!(branch, "branch absent");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Create `refs/heads/<name>` at the requested commit.
pub async fn create_branch(
    forge: &dyn Forge,
    options: BranchOptions,
) -> Result<BranchOutput, PipelineError> {
    let ref_name = naming::create_ref(&options.name);
    let created = forge.create_ref(&ref_name, &options.sha).await?;
    Ok(BranchOutput {
        action: BranchAction::Created,
        ref_name,
        sha: created.sha,
        rederived_from: None,
    })
}

/// Move `heads/<name>` to the requested commit.
pub async fn update_branch(
    forge: &dyn Forge,
    options: BranchOptions,
) -> Result<BranchOutput, PipelineError> {
    let ref_name = naming::update_ref(&options.name);
    let updated = forge
        .update_ref(&ref_name, &options.sha, options.force)
        .await?;
    Ok(BranchOutput {
        action: BranchAction::Updated,
        ref_name,
        sha: updated.sha,
        rederived_from: None,
    })
}

/// Create the branch if absent, otherwise update it.
pub async fn create_or_update_branch(
    forge: &dyn Forge,
    options: BranchOptions,
    history: &ResultHistory,
    recipes: &TreeRecipes,
) -> Result<BranchOutput, PipelineError> {
    let Some(existing) = probe_branch(forge, &options.name).await? else {
        return create_branch(forge, options).await;
    };

    let requested = options.sha.clone();
    match rederive(forge, &existing, &requested, history, recipes).await? {
        Some(rederived) => {
            let mut output = update_branch(forge, BranchOptions { sha: rederived, ..options }).await?;
            output.rederived_from = Some(requested);
            Ok(output)
        }
        None => update_branch(forge, options).await,
    }
}

/// Rebuild a commit from this run on the branch tip, when it needs it.
///
/// Returns the new commit, or `None` if the requested commit can be used
/// as is.
async fn rederive(
    forge: &dyn Forge,
    branch: &BranchInfo,
    requested: &Sha,
    history: &ResultHistory,
    recipes: &TreeRecipes,
) -> Result<Option<Sha>, PipelineError> {
    if requested == &branch.commit_sha {
        return Ok(None);
    }
    let Some(commit) = history.commit_by_sha(requested) else {
        return Ok(None);
    };
    if commit.parents.contains(&branch.commit_sha) {
        return Ok(None);
    }
    let Some(recipe) = recipes.get(&commit.tree_sha) else {
        return Ok(None);
    };

    tracing::debug!(
        branch = %branch.name,
        tip = %branch.commit_sha,
        commit = %commit.sha,
        "re-deriving commit onto branch tip"
    );
    let tree = rebuild_tree(forge, recipe, branch, history).await?;
    let rederived = forge
        .create_commit(CreateCommitRequest {
            message: commit.message.clone(),
            tree: tree.sha,
            parents: vec![branch.commit_sha.clone()],
        })
        .await?;
    Ok(Some(rederived.sha))
}

/// Resolve an omitted base to the default branch.
async fn resolve_base(forge: &dyn Forge, base: Option<String>) -> Result<String, PipelineError> {
    match base {
        Some(base) => Ok(naming::branch_name(&base).to_string()),
        None => Ok(forge.get_repository().await?.default_branch),
    }
}

/// Create a pull request. An existing one is an error.
pub async fn create_pr(forge: &dyn Forge, options: PrOptions) -> Result<PrOutput, PipelineError> {
    let base = resolve_base(forge, options.base).await?;
    let pr = forge
        .create_pr(CreatePrRequest {
            head: naming::branch_name(&options.head).to_string(),
            base,
            title: options.title,
            body: options.body,
            draft: options.draft,
        })
        .await?;
    Ok(PrOutput {
        pull_request: Some(pr),
        branch: None,
    })
}

/// Create a pull request, treating an existing one as success.
pub async fn maybe_create_pr(
    forge: &dyn Forge,
    options: PrOptions,
) -> Result<PrOutput, PipelineError> {
    let head = options.head.clone();
    match create_pr(forge, options).await {
        Err(PipelineError::Forge(ForgeError::Conflict(message))) => {
            tracing::warn!(head = %head, %message, "pull request already exists");
            Ok(PrOutput::default())
        }
        other => other,
    }
}

/// Reconcile the head branch, then create its pull request if needed.
pub async fn create_or_update_pr(
    forge: &dyn Forge,
    mut options: PrOptions,
    history: &ResultHistory,
    recipes: &TreeRecipes,
) -> Result<PrOutput, PipelineError> {
    let sha = options.head_sha.take().ok_or_else(|| {
        PipelineError::Build(format!(
            "no head commit given for branch '{}'",
            options.head
        ))
    })?;
    let branch =
        create_or_update_branch(
            forge,
            BranchOptions::new(options.head.clone(), sha),
            history,
            recipes,
        )
        .await?;
    let mut output = maybe_create_pr(forge, options).await?;
    output.branch = Some(branch);
    Ok(output)
}

/// Update a pull request by number, or the open one for the head branch.
pub async fn update_pr(forge: &dyn Forge, options: PrOptions) -> Result<PrOutput, PipelineError> {
    let number = match options.number {
        Some(number) => number,
        None => {
            let head = naming::branch_name(&options.head);
            forge
                .find_pr(head, None)
                .await?
                .ok_or_else(|| ForgeError::NotFound(format!("no open pull request for {}", head)))?
                .number
        }
    };
    let pr = forge
        .update_pr(UpdatePrRequest {
            number,
            title: Some(options.title).filter(|t| !t.is_empty()),
            body: options.body,
            base: options.base.map(|base| naming::branch_name(&base).to_string()),
        })
        .await?;
    Ok(PrOutput {
        pull_request: Some(pr),
        branch: None,
    })
}

/// Look up the open pull request for a head branch.
pub async fn find_pr(forge: &dyn Forge, query: PrQuery) -> Result<PrOutput, PipelineError> {
    let pr = forge
        .find_pr(naming::branch_name(&query.head), query.base.as_deref())
        .await?;
    Ok(PrOutput {
        pull_request: pr,
        branch: None,
    })
}
