//! forgepipe - Declarative pipelines of repository mutations against a forge
//!
//! forgepipe builds an ordered list of remote operations (create a tree,
//! commit it, point a branch at it, open or update a pull request) and
//! executes them against a hosting API without a local clone. Later steps
//! read the outputs of earlier ones through deferred values.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Operation pipeline, tree reconciler, branch/PR reconciler
//! - [`core`] - Domain types, ref naming, configuration, pipeline files
//! - [`forge`] - Remote API abstraction with GitHub and in-memory backends
//!
//! # Guarantees
//!
//! 1. Operations execute strictly in the order they were appended
//! 2. A step only observes outputs of steps before it
//! 3. Nothing is rolled back; a failure reports the completed prefix

pub mod cli;
pub mod core;
pub mod engine;
pub mod forge;
