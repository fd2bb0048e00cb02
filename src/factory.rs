use crate::context::{ConsumeContext, SagaConsumeContext, SagaConsumeContextMode};

/// Builds the combined (message, saga, mode) context handed to behavior code.
///
/// Implementations compose only: they never touch the backend and cannot
/// fail. The backend reference is passed so a factory can attach
/// backend-aware hooks (transaction scopes, audit wrappers) without every
/// repository context duplicating that logic.
pub trait SagaConsumeContextFactory<B: ?Sized, S>: Send + Sync {
    fn create_saga_consume_context<M>(
        &self,
        backend: &B,
        consume: &ConsumeContext<M>,
        instance: S,
        mode: SagaConsumeContextMode,
    ) -> SagaConsumeContext<S, M>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSagaConsumeContextFactory;

impl<B: ?Sized, S> SagaConsumeContextFactory<B, S> for DefaultSagaConsumeContextFactory {
    fn create_saga_consume_context<M>(
        &self,
        _backend: &B,
        consume: &ConsumeContext<M>,
        instance: S,
        mode: SagaConsumeContextMode,
    ) -> SagaConsumeContext<S, M> {
        SagaConsumeContext::new(consume.clone(), instance, mode)
    }
}
