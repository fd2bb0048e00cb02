use super::guarded;
use crate::backend::{SagaBackend, SagaQuery};
use crate::config::SagaRepositoryOptions;
use crate::core::{Result, Saga, SagaError};
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};
use uuid::Uuid;

/// Message-independent access to a backend, scoped to a cancellation token.
pub struct SagaQueryRepositoryContext<'a, S, B: ?Sized> {
    backend: &'a B,
    cancel: CancellationToken,
    options: &'a SagaRepositoryOptions,
    marker: PhantomData<fn() -> S>,
}

impl<'a, S, B> SagaQueryRepositoryContext<'a, S, B>
where
    S: Saga,
    B: SagaBackend<S> + ?Sized,
{
    pub fn new(backend: &'a B, cancel: CancellationToken, options: &'a SagaRepositoryOptions) -> Self {
        Self {
            backend,
            cancel,
            options,
            marker: PhantomData,
        }
    }

    /// Runs the query against the backend's query capability.
    ///
    /// Backends without one fail with [`SagaError::NotImplementedByDesign`]
    /// before any I/O happens.
    pub async fn query(&self, query: &SagaQuery<S>) -> Result<SagaRepositoryQueryContext<'a, S, B>> {
        let backend = self.backend;
        let Some(queryable) = backend.as_queryable() else {
            event!(
                Level::DEBUG,
                backend = backend.name(),
                saga = S::saga_type(),
                "saga query rejected"
            );
            return Err(SagaError::NotImplementedByDesign(format!(
                "{} saga backend does not support queries",
                backend.name()
            )));
        };

        let ids = guarded(&self.cancel, self.options, queryable.query(query, &self.cancel)).await?;
        Ok(SagaRepositoryQueryContext {
            backend,
            cancel: self.cancel.clone(),
            options: self.options,
            ids,
            marker: PhantomData,
        })
    }

    pub async fn load(&self, correlation_id: Uuid) -> Result<Option<S>> {
        guarded(
            &self.cancel,
            self.options,
            self.backend.load(correlation_id, &self.cancel),
        )
        .await
    }
}

/// Correlation ids matched by a query, loadable one at a time.
pub struct SagaRepositoryQueryContext<'a, S, B: ?Sized> {
    backend: &'a B,
    cancel: CancellationToken,
    options: &'a SagaRepositoryOptions,
    ids: Vec<Uuid>,
    marker: PhantomData<fn() -> S>,
}

impl<'a, S, B> SagaRepositoryQueryContext<'a, S, B>
where
    S: Saga,
    B: SagaBackend<S> + ?Sized,
{
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn correlation_ids(&self) -> &[Uuid] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.ids.iter().copied()
    }

    pub fn into_ids(self) -> Vec<Uuid> {
        self.ids
    }

    /// Loads a matched instance; it may have been removed since the query ran.
    pub async fn load(&self, correlation_id: Uuid) -> Result<Option<S>> {
        guarded(
            &self.cancel,
            self.options,
            self.backend.load(correlation_id, &self.cancel),
        )
        .await
    }
}
