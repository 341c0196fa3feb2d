//! engine
//!
//! Operation pipeline and tree reconciliation.
//!
//! # Architecture
//!
//! A caller appends operations to a [`Pipeline`]; `run` executes them in
//! order against a [`crate::forge::Forge`]:
//!
//! ```text
//! Pipeline::run
//!   for each operation:
//!     resolve Deferred payload against ResultHistory
//!     dispatch:  CreateTree          -> tree::build_tree (keeps a TreeRecipe)
//!                CreateCommit        -> pipeline::create_commit
//!                *Branch / *Pr       -> reconcile::*
//!     append StepOutput to ResultHistory
//! ```
//!
//! # Modules
//!
//! - [`deferred`] - Values computed from earlier outputs
//! - [`history`] - Append-only step outputs and typed step handles
//! - [`ops`] - Operation kinds and desired-state payloads
//! - [`tree`] - Per-path intents to one tree-creation call
//! - [`json_patch`] - RFC 6902 patches for JSON files
//! - [`reconcile`] - Create-or-update for branches and pull requests
//! - [`pipeline`] - The queue and its sequential executor
//!
//! # Invariants
//!
//! - After a successful run, `history.len()` equals the number of appended
//!   operations and entry `i` is operation `i`'s output
//! - A step never observes the output of itself or any later step
//! - Nothing is rolled back; a failed run reports the completed prefix

pub mod deferred;
pub mod error;
pub mod history;
pub mod json_patch;
pub mod ops;
pub mod pipeline;
pub mod reconcile;
pub mod tree;

pub use deferred::{Content, Deferred, Prepared};
pub use error::{PipelineError, RunError};
pub use history::{
    BranchAction, BranchOutput, CommitOutput, PrOutput, ResultHistory, Step, StepId, StepKind,
    StepOutput, TreeOutput,
};
pub use json_patch::{PatchError, PatchOperation};
pub use ops::{
    BranchOptions, CommitOptions, FileIntent, Operation, OperationKind, PrOptions, PrQuery,
    TreeOptions,
};
pub use pipeline::Pipeline;
pub use tree::{TreeRecipe, TreeRecipes};
