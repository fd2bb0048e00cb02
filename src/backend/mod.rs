//! Storage backend port and the bundled backends.
//!
//! A backend is anything that can atomically insert a saga instance keyed by
//! its correlation id, load it back, and write or remove an instance the
//! caller already holds. Secondary lookups are a separate capability
//! ([`SagaQueryBackend`]) so stores without indexes never have to fake them.

use crate::core::{Result, Saga, SagaError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub mod file;
pub mod memory;
pub mod table;

pub use file::FileSagaBackend;
pub use memory::InMemorySagaBackend;
pub use table::{
    ConstPartitionKeyFormatter, HashedPartitionKeyFormatter, SagaKeyFormatter, TableKey,
    TableSagaBackend,
};

/// Required operations of a saga store.
///
/// Writes are awaited to completion even after the message is cancelled or
/// the operation times out; the token is the only stop signal they get. A
/// write may return [`SagaError::Cancelled`] only if it stopped before its
/// commit point, and must leave `instance` untouched when it did not commit.
#[async_trait]
pub trait SagaBackend<S: Saga>: Send + Sync {
    /// Label used in log fields and error messages.
    fn name(&self) -> &'static str;

    /// Atomically creates the instance.
    ///
    /// Fails with [`SagaError::Conflict`] when the correlation id is taken.
    async fn insert(&self, instance: &mut S, cancel: &CancellationToken) -> Result<()>;

    /// Returns `Ok(None)` when no instance exists for the id.
    async fn load(&self, correlation_id: Uuid, cancel: &CancellationToken) -> Result<Option<S>>;

    /// First physical write of an instance that was only registered.
    async fn add(&self, instance: &mut S, cancel: &CancellationToken) -> Result<()>;

    /// Writes back a mutated instance.
    async fn update(&self, instance: &mut S, cancel: &CancellationToken) -> Result<()>;

    async fn delete(&self, instance: &S, cancel: &CancellationToken) -> Result<()>;

    /// The query capability of this backend, if it has one.
    fn as_queryable(&self) -> Option<&dyn SagaQueryBackend<S>> {
        None
    }

    fn supports_query(&self) -> bool {
        self.as_queryable().is_some()
    }
}

/// Optional secondary-lookup capability.
#[async_trait]
pub trait SagaQueryBackend<S: Saga>: SagaBackend<S> {
    /// Correlation ids of every instance matching the query.
    async fn query(&self, query: &SagaQuery<S>, cancel: &CancellationToken) -> Result<Vec<Uuid>>;
}

/// A predicate over saga instances.
pub struct SagaQuery<S> {
    predicate: Arc<dyn Fn(&S) -> bool + Send + Sync>,
}

impl<S> SagaQuery<S> {
    pub fn new(predicate: impl Fn(&S) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Matches every instance.
    pub fn all() -> Self {
        Self::new(|_| true)
    }

    pub fn matches(&self, instance: &S) -> bool {
        (self.predicate)(instance)
    }
}

impl<S> Clone for SagaQuery<S> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
        }
    }
}

impl<S> fmt::Debug for SagaQuery<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SagaQuery").finish_non_exhaustive()
    }
}

pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(SagaError::Cancelled);
    }
    Ok(())
}

pub(crate) fn check_version(correlation_id: Uuid, expected: u64, actual: u64) -> Result<()> {
    if expected != actual {
        return Err(SagaError::ConcurrencyViolation {
            correlation_id,
            expected,
            actual,
        });
    }
    Ok(())
}
