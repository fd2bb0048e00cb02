//! Saga repository and its message-scoped contexts.

use crate::backend::SagaBackend;
use crate::config::SagaRepositoryOptions;
use crate::context::ConsumeContext;
use crate::core::{Result, Saga, SagaError};
use crate::factory::{DefaultSagaConsumeContextFactory, SagaConsumeContextFactory};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod context;
pub mod query;

pub use context::SagaRepositoryContext;
pub use query::{SagaQueryRepositoryContext, SagaRepositoryQueryContext};

/// Long-lived owner of a backend and a context factory.
///
/// Cheap to clone; every message being processed asks it for its own
/// [`SagaRepositoryContext`], which borrows the message and therefore cannot
/// outlive it.
pub struct SagaRepository<S, B: ?Sized, F = DefaultSagaConsumeContextFactory> {
    backend: Arc<B>,
    factory: Arc<F>,
    options: SagaRepositoryOptions,
    marker: PhantomData<fn() -> S>,
}

impl<S, B: ?Sized, F> Clone for SagaRepository<S, B, F> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            factory: self.factory.clone(),
            options: self.options.clone(),
            marker: PhantomData,
        }
    }
}

impl<S: Saga, B: SagaBackend<S>> SagaRepository<S, B> {
    pub fn new(backend: B) -> Self {
        Self::from_shared(Arc::new(backend))
    }
}

impl<S: Saga, B: SagaBackend<S> + ?Sized> SagaRepository<S, B> {
    /// Wraps a backend that is shared with other components.
    pub fn from_shared(backend: Arc<B>) -> Self {
        Self {
            backend,
            factory: Arc::new(DefaultSagaConsumeContextFactory),
            options: SagaRepositoryOptions::default(),
            marker: PhantomData,
        }
    }
}

impl<S, B, F> SagaRepository<S, B, F>
where
    S: Saga,
    B: SagaBackend<S> + ?Sized,
    F: SagaConsumeContextFactory<B, S>,
{
    pub fn with_factory<G>(self, factory: G) -> SagaRepository<S, B, G>
    where
        G: SagaConsumeContextFactory<B, S>,
    {
        SagaRepository {
            backend: self.backend,
            factory: Arc::new(factory),
            options: self.options,
            marker: PhantomData,
        }
    }

    pub fn with_options(mut self, options: SagaRepositoryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn options(&self) -> &SagaRepositoryOptions {
        &self.options
    }

    /// Opens the repository context for one inbound message.
    pub fn context<'a, M>(
        &'a self,
        consume: &'a ConsumeContext<M>,
    ) -> SagaRepositoryContext<'a, S, M, B, F> {
        SagaRepositoryContext::new(&*self.backend, &*self.factory, consume, &self.options)
    }

    /// Opens a message-independent context for queries and point loads.
    pub fn query_context(&self, cancel: CancellationToken) -> SagaQueryRepositoryContext<'_, S, B> {
        SagaQueryRepositoryContext::new(&*self.backend, cancel, &self.options)
    }
}

/// Runs one read-only backend call under the scope's cancellation token and
/// the configured timeout. The call is dropped when either fires.
pub(crate) async fn guarded<T, Fut>(
    cancel: &CancellationToken,
    options: &SagaRepositoryOptions,
    call: Fut,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(SagaError::Cancelled);
    }

    let bounded = async {
        match options.operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(SagaError::Timeout(limit)),
            },
            None => call.await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SagaError::Cancelled),
        result = bounded => result,
    }
}

/// Runs one backend write that was handed `scope`, a child of `cancel`.
///
/// A write is never dropped once it has started. Cancellation and timeout
/// cancel `scope` instead, and the backend either stops before its commit
/// point or reports the write it completed.
pub(crate) async fn guarded_write<Fut>(
    cancel: &CancellationToken,
    scope: &CancellationToken,
    options: &SagaRepositoryOptions,
    call: Fut,
) -> Result<()>
where
    Fut: Future<Output = Result<()>>,
{
    if cancel.is_cancelled() {
        return Err(SagaError::Cancelled);
    }

    let deadline = async {
        match options.operation_timeout {
            Some(limit) => {
                tokio::time::sleep(limit).await;
                limit
            }
            None => std::future::pending().await,
        }
    };
    tokio::pin!(call);

    let timed_out = tokio::select! {
        biased;
        result = &mut call => return result,
        _ = scope.cancelled() => None,
        limit = deadline => {
            scope.cancel();
            Some(limit)
        }
    };

    match call.await {
        Err(SagaError::Cancelled) => Err(timed_out.map_or(SagaError::Cancelled, SagaError::Timeout)),
        outcome => outcome,
    }
}
