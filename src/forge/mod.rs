//! forge
//!
//! Abstraction for the remote forge a pipeline mutates.
//!
//! # Architecture
//!
//! The `Forge` trait defines the read and write primitives the pipeline
//! engine needs. The engine holds an `Arc<dyn Forge>` and never names a
//! concrete implementation.
//!
//! # Modules
//!
//! - `traits`: Core `Forge` trait and request/response types
//! - [`github`]: GitHub implementation using the REST and Git Data APIs
//! - [`mock`]: In-memory implementation for deterministic testing
//! - `factory`: Forge construction from configuration
//!
//! # Example
//!
//! ```ignore
//! use forgepipe::forge::{create_forge, Forge};
//!
//! let forge = create_forge(&settings)?;
//! let branch = forge.get_branch("main").await?;
//! println!("main is at {}", branch.commit_sha);
//! ```

mod factory;
pub mod github;
pub mod mock;
mod traits;

pub use factory::create_forge;
pub use traits::*;
