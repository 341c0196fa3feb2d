//! engine::deferred
//!
//! Values that may depend on the outputs of earlier steps.
//!
//! # Design
//!
//! A [`Deferred`] is either a literal or a function of the
//! [`ResultHistory`] accumulated so far. Resolution happens once, when the
//! owning step executes. The closures are `FnOnce`, so a deferred value
//! cannot be resolved twice.
//!
//! [`Content`] extends this for file contents: besides a deferred value it
//! can hold an edit function that receives the file's current content.
//! Edits are `Fn`, so a tree can be rebuilt against another base and the
//! edit re-run on that base's content.
//!
//! # Example
//!
//! ```
//! use forgepipe::engine::{Deferred, ResultHistory};
//!
//! let value: Deferred<u32> = Deferred::from_fn(|history| Ok(history.len() as u32 + 1));
//! let resolved = futures::executor::block_on(value.resolve(&ResultHistory::new())).unwrap();
//! assert_eq!(resolved, 1);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::error::PipelineError;
use super::history::ResultHistory;

type ComputeFn<T> = Box<dyn FnOnce(&ResultHistory) -> Result<T, PipelineError> + Send>;
type AsyncFn<T> =
    Box<dyn FnOnce(ResultHistory) -> BoxFuture<'static, Result<T, PipelineError>> + Send>;
type EditFn<T> =
    Arc<dyn Fn(T, ResultHistory) -> BoxFuture<'static, Result<T, PipelineError>> + Send + Sync>;

/// A step input resolved at execution time.
pub enum Deferred<T> {
    /// A value known up front.
    Literal(T),
    /// Computed synchronously from prior outputs.
    Computed(ComputeFn<T>),
    /// Computed asynchronously from prior outputs; may perform I/O.
    Async(AsyncFn<T>),
}

impl<T> Deferred<T> {
    pub fn literal(value: T) -> Self {
        Deferred::Literal(value)
    }

    /// Compute the value from the history when the step runs.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce(&ResultHistory) -> Result<T, PipelineError> + Send + 'static,
    {
        Deferred::Computed(Box::new(f))
    }

    /// Compute the value asynchronously from a snapshot of the history.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: FnOnce(ResultHistory) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, PipelineError>> + Send + 'static,
        T: 'static,
    {
        Deferred::Async(Box::new(move |history| f(history).boxed()))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Deferred::Literal(_))
    }

    /// Resolve against the outputs of the steps executed so far.
    pub async fn resolve(self, history: &ResultHistory) -> Result<T, PipelineError> {
        match self {
            Deferred::Literal(value) => Ok(value),
            Deferred::Computed(f) => f(history),
            Deferred::Async(f) => f(history.clone()).await,
        }
    }
}

impl<T: Send + 'static> Deferred<T> {
    /// Transform the resolved value.
    pub fn map<U, F>(self, f: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            Deferred::Literal(value) => Deferred::Literal(f(value)),
            Deferred::Computed(g) => Deferred::Computed(Box::new(move |h| g(h).map(f))),
            Deferred::Async(g) => {
                Deferred::Async(Box::new(move |h| g(h).map(|r| r.map(f)).boxed()))
            }
        }
    }
}

impl<T> From<T> for Deferred<T> {
    fn from(value: T) -> Self {
        Deferred::Literal(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deferred::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Deferred::Computed(_) => f.write_str("Computed(..)"),
            Deferred::Async(_) => f.write_str("Async(..)"),
        }
    }
}

/// File content: a deferred value, or an edit of the existing content.
pub enum Content<T> {
    /// Replace the content outright.
    Value(Deferred<T>),
    /// Derive the content from what is currently stored. A missing file
    /// is presented as empty.
    Edit(EditFn<T>),
}

impl<T> Content<T> {
    pub fn value(value: impl Into<Deferred<T>>) -> Self {
        Content::Value(value.into())
    }

    /// Edit the existing content synchronously.
    pub fn edit<F>(f: F) -> Self
    where
        F: Fn(T, &ResultHistory) -> Result<T, PipelineError> + Send + Sync + 'static,
        T: Send + 'static,
    {
        Content::Edit(Arc::new(move |existing, history| {
            futures::future::ready(f(existing, &history)).boxed()
        }))
    }

    /// Edit the existing content asynchronously.
    pub fn edit_async<F, Fut>(f: F) -> Self
    where
        F: Fn(T, ResultHistory) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, PipelineError>> + Send + 'static,
        T: Send + 'static,
    {
        Content::Edit(Arc::new(move |existing, history| f(existing, history).boxed()))
    }

    /// Whether resolving needs the existing content.
    pub fn needs_existing(&self) -> bool {
        matches!(self, Content::Edit(_))
    }

    /// Resolve, given the existing content when this is an edit.
    pub async fn resolve(
        self,
        existing: Option<T>,
        history: &ResultHistory,
    ) -> Result<T, PipelineError>
    where
        T: Default,
    {
        match self {
            Content::Value(deferred) => deferred.resolve(history).await,
            Content::Edit(f) => f(existing.unwrap_or_default(), history.clone()).await,
        }
    }

    /// Resolve a deferred value now; an edit is kept for later.
    pub async fn prepare(self, history: &ResultHistory) -> Result<Prepared<T>, PipelineError> {
        match self {
            Content::Value(deferred) => Ok(Prepared::Value(deferred.resolve(history).await?)),
            Content::Edit(f) => Ok(Prepared::Edit(f)),
        }
    }
}

/// Content whose deferred inputs are resolved. Can be applied any number
/// of times.
#[derive(Clone)]
pub enum Prepared<T> {
    Value(T),
    Edit(EditFn<T>),
}

impl<T: Clone + Default> Prepared<T> {
    pub fn needs_existing(&self) -> bool {
        matches!(self, Prepared::Edit(_))
    }

    /// Produce the content, given the existing content when this is an edit.
    pub async fn apply(
        &self,
        existing: Option<T>,
        history: &ResultHistory,
    ) -> Result<T, PipelineError> {
        match self {
            Prepared::Value(value) => Ok(value.clone()),
            Prepared::Edit(f) => f(existing.unwrap_or_default(), history.clone()).await,
        }
    }
}

impl<T> fmt::Debug for Prepared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prepared::Value(_) => f.write_str("Value(..)"),
            Prepared::Edit(_) => f.write_str("Edit(..)"),
        }
    }
}

impl<T> From<Deferred<T>> for Content<T> {
    fn from(deferred: Deferred<T>) -> Self {
        Content::Value(deferred)
    }
}

impl From<String> for Content<String> {
    fn from(value: String) -> Self {
        Content::Value(Deferred::Literal(value))
    }
}

impl From<&str> for Content<String> {
    fn from(value: &str) -> Self {
        Content::Value(Deferred::Literal(value.to_string()))
    }
}

impl From<Vec<u8>> for Content<Vec<u8>> {
    fn from(value: Vec<u8>) -> Self {
        Content::Value(Deferred::Literal(value))
    }
}

impl From<&[u8]> for Content<Vec<u8>> {
    fn from(value: &[u8]) -> Self {
        Content::Value(Deferred::Literal(value.to_vec()))
    }
}

impl<const N: usize> From<&[u8; N]> for Content<Vec<u8>> {
    fn from(value: &[u8; N]) -> Self {
        Content::Value(Deferred::Literal(value.to_vec()))
    }
}

impl From<&str> for Content<Vec<u8>> {
    fn from(value: &str) -> Self {
        Content::Value(Deferred::Literal(value.as_bytes().to_vec()))
    }
}

impl<T> fmt::Debug for Content<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Value(Deferred::Literal(_)) => f.write_str("Value(Literal)"),
            Content::Value(Deferred::Computed(_)) => f.write_str("Value(Computed)"),
            Content::Value(Deferred::Async(_)) => f.write_str("Value(Async)"),
            Content::Edit(_) => f.write_str("Edit(..)"),
        }
    }
}
