//! engine::error
//!
//! Errors raised while executing a pipeline.

use thiserror::Error;

use super::history::ResultHistory;
use super::json_patch::PatchError;
use super::ops::OperationKind;
use crate::forge::ForgeError;

/// Failure of a single pipeline step.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The step's inputs could not be made usable. Raised before any
    /// network call for the step.
    #[error("invalid step input: {0}")]
    Build(String),

    /// The remote rejected a call.
    #[error(transparent)]
    Forge(#[from] ForgeError),

    /// A JSON patch could not be applied to the file at `path`.
    #[error("json patch failed for '{path}': {source}")]
    Patch {
        path: String,
        #[source]
        source: PatchError,
    },

    /// Existing or produced content at `path` is unusable.
    #[error("invalid content at '{path}': {message}")]
    Content { path: String, message: String },

    /// A rename source resolved to a directory.
    #[error("cannot rename '{0}': it is a directory")]
    RenameDirectory(String),

    /// Failure raised by a caller-supplied function.
    #[error("{0}")]
    Custom(String),
}

impl PipelineError {
    /// Convenience constructor for caller-supplied functions.
    pub fn custom(message: impl std::fmt::Display) -> Self {
        PipelineError::Custom(message.to_string())
    }

    /// Whether this wraps a remote not-found response.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::Forge(e) if e.is_not_found())
    }
}

/// A pipeline run stopped at `step`.
///
/// Steps before `step` completed and their remote effects are in place;
/// `completed` holds their outputs. Nothing is rolled back.
#[derive(Debug, Error)]
#[error("step {step} ({kind}) failed: {source}")]
pub struct RunError {
    /// Index of the failing step
    pub step: usize,
    /// Kind of the failing step
    pub kind: OperationKind,
    /// Underlying failure
    #[source]
    pub source: PipelineError,
    /// Outputs of steps `0..step`
    pub completed: ResultHistory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forge_errors_convert() {
        let err: PipelineError = ForgeError::NotFound("branch".into()).into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: branch");
    }

    #[test]
    fn run_error_display_names_step() {
        let err = RunError {
            step: 2,
            kind: OperationKind::CreateOrUpdateBranch,
            source: PipelineError::Build("parent ref is undefined".into()),
            completed: ResultHistory::new(),
        };
        assert_eq!(
            err.to_string(),
            "step 2 (create_or_update_branch) failed: invalid step input: parent ref is undefined"
        );
    }
}
