use super::{ConsumeContext, SagaConsumeContextMode};
use crate::core::Saga;
use std::fmt;
use uuid::Uuid;

/// A message consumption scope joined with the saga instance it targets.
pub struct SagaConsumeContext<S, M> {
    consume: ConsumeContext<M>,
    saga: S,
    mode: SagaConsumeContextMode,
    completed: bool,
}

impl<S, M> SagaConsumeContext<S, M> {
    pub fn new(consume: ConsumeContext<M>, saga: S, mode: SagaConsumeContextMode) -> Self {
        Self {
            consume,
            saga,
            mode,
            completed: false,
        }
    }

    pub fn saga(&self) -> &S {
        &self.saga
    }

    pub fn saga_mut(&mut self) -> &mut S {
        &mut self.saga
    }

    pub fn into_saga(self) -> S {
        self.saga
    }

    pub fn mode(&self) -> SagaConsumeContextMode {
        self.mode
    }

    pub fn consume_context(&self) -> &ConsumeContext<M> {
        &self.consume
    }

    pub fn message(&self) -> &M {
        self.consume.message()
    }

    /// Marks the saga as finished; the pipeline should delete it rather
    /// than write it back.
    pub fn set_completed(&mut self) {
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl<S: Saga, M> SagaConsumeContext<S, M> {
    pub fn correlation_id(&self) -> Uuid {
        self.saga.correlation_id()
    }
}

impl<S: fmt::Debug, M> fmt::Debug for SagaConsumeContext<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SagaConsumeContext")
            .field("message_type", &self.consume.message_type())
            .field("mode", &self.mode)
            .field("completed", &self.completed)
            .field("saga", &self.saga)
            .finish()
    }
}
