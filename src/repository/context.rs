use super::{guarded, guarded_write};
use crate::backend::SagaBackend;
use crate::config::SagaRepositoryOptions;
use crate::context::{ConsumeContext, SagaConsumeContext, SagaConsumeContextMode};
use crate::core::{Result, Saga};
use crate::factory::SagaConsumeContextFactory;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

/// Saga persistence gateway for one inbound message.
///
/// Holds no state of its own: every call goes straight to the backend and
/// every instance it returns is wrapped by the factory, whichever path
/// produced it.
pub struct SagaRepositoryContext<'a, S, M, B: ?Sized, F> {
    backend: &'a B,
    factory: &'a F,
    consume: &'a ConsumeContext<M>,
    options: &'a SagaRepositoryOptions,
    marker: PhantomData<fn() -> S>,
}

impl<'a, S, M, B, F> SagaRepositoryContext<'a, S, M, B, F>
where
    S: Saga,
    B: SagaBackend<S> + ?Sized,
    F: SagaConsumeContextFactory<B, S>,
{
    pub fn new(
        backend: &'a B,
        factory: &'a F,
        consume: &'a ConsumeContext<M>,
        options: &'a SagaRepositoryOptions,
    ) -> Self {
        Self {
            backend,
            factory,
            consume,
            options,
            marker: PhantomData,
        }
    }

    pub fn consume_context(&self) -> &'a ConsumeContext<M> {
        self.consume
    }

    pub fn cancellation_token(&self) -> &'a CancellationToken {
        self.consume.cancellation_token()
    }

    /// Registers an instance whose first write is deferred to [`save`](Self::save).
    pub fn add(&self, instance: S) -> SagaConsumeContext<S, M> {
        self.factory.create_saga_consume_context(
            self.backend,
            self.consume,
            instance,
            SagaConsumeContextMode::Add,
        )
    }

    /// Attempts to create the instance.
    ///
    /// Returns `None` when the backend refused or failed the insert; the
    /// error is reported through a single `saga insert fault` event and never
    /// returned. A conflict usually means another message created the
    /// instance first and the caller should fall back to [`load`](Self::load).
    pub async fn insert(&self, mut instance: S) -> Option<SagaConsumeContext<S, M>> {
        let correlation_id = instance.correlation_id();
        let cancel = self.cancellation_token();
        let span = info_span!(
            "saga.insert",
            correlation_id = %correlation_id,
            saga = S::saga_type(),
            message_type = self.consume.message_type(),
            backend = self.backend.name()
        );

        let scope = cancel.child_token();
        let outcome = guarded_write(
            cancel,
            &scope,
            self.options,
            self.backend.insert(&mut instance, &scope),
        )
        .instrument(span.clone())
        .await;

        match outcome {
            Ok(()) => {
                span.in_scope(|| event!(Level::INFO, "saga inserted"));
                Some(self.factory.create_saga_consume_context(
                    self.backend,
                    self.consume,
                    instance,
                    SagaConsumeContextMode::Insert,
                ))
            }
            Err(err) if err.is_conflict() => {
                span.in_scope(|| {
                    event!(Level::DEBUG, error = %err, conflict = true, "saga insert fault")
                });
                None
            }
            Err(err) => {
                span.in_scope(|| {
                    event!(Level::ERROR, error = %err, conflict = false, "saga insert fault")
                });
                None
            }
        }
    }

    /// Loads the instance, `Ok(None)` when it does not exist.
    pub async fn load(&self, correlation_id: Uuid) -> Result<Option<SagaConsumeContext<S, M>>> {
        let cancel = self.cancellation_token();
        let loaded = guarded(
            cancel,
            self.options,
            self.backend.load(correlation_id, cancel),
        )
        .await?;

        let Some(instance) = loaded else {
            return Ok(None);
        };
        event!(
            Level::TRACE,
            correlation_id = %correlation_id,
            saga = S::saga_type(),
            message_type = self.consume.message_type(),
            "saga loaded"
        );
        Ok(Some(self.factory.create_saga_consume_context(
            self.backend,
            self.consume,
            instance,
            SagaConsumeContextMode::Load,
        )))
    }

    /// Insert, falling back to a load when the insert produced nothing.
    pub async fn insert_or_load(&self, instance: S) -> Result<Option<SagaConsumeContext<S, M>>> {
        let correlation_id = instance.correlation_id();
        if let Some(inserted) = self.insert(instance).await {
            return Ok(Some(inserted));
        }
        self.load(correlation_id).await
    }

    /// First physical write of an instance registered with [`add`](Self::add).
    pub async fn save<T>(&self, context: &mut SagaConsumeContext<S, T>) -> Result<()> {
        let cancel = self.cancellation_token();
        let scope = cancel.child_token();
        guarded_write(
            cancel,
            &scope,
            self.options,
            self.backend.add(context.saga_mut(), &scope),
        )
        .await
    }

    pub async fn update<T>(&self, context: &mut SagaConsumeContext<S, T>) -> Result<()> {
        let cancel = self.cancellation_token();
        let scope = cancel.child_token();
        guarded_write(
            cancel,
            &scope,
            self.options,
            self.backend.update(context.saga_mut(), &scope),
        )
        .await
    }

    pub async fn delete<T>(&self, context: &SagaConsumeContext<S, T>) -> Result<()> {
        let cancel = self.cancellation_token();
        let scope = cancel.child_token();
        guarded_write(
            cancel,
            &scope,
            self.options,
            self.backend.delete(context.saga(), &scope),
        )
        .await
    }

    /// Abandons the instance without writing anything.
    pub fn discard<T>(&self, context: &SagaConsumeContext<S, T>) -> Result<()> {
        event!(
            Level::TRACE,
            correlation_id = %context.correlation_id(),
            mode = %context.mode(),
            "saga discarded"
        );
        Ok(())
    }

    /// Wraps an instance for another message of the same causal chain.
    pub fn create_saga_consume_context<T>(
        &self,
        consume: &ConsumeContext<T>,
        instance: S,
        mode: SagaConsumeContextMode,
    ) -> SagaConsumeContext<S, T> {
        self.factory
            .create_saga_consume_context(self.backend, consume, instance, mode)
    }
}
