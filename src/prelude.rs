//! Recommended imports grouped by role.
//!
//! `consumer` is what message-handling code needs. `backend` is for crates
//! implementing a new store.

pub mod consumer {
    //! Repository, contexts and the saga contracts.
    pub use crate::{
        CancellationToken, ConsumeContext, Saga, SagaConsumeContext, SagaConsumeContextMode,
        SagaError, SagaRepository, SagaRepositoryOptions, VersionedSaga,
    };
}

pub mod backend {
    //! Storage port traits.
    pub use crate::{Result, SagaBackend, SagaError, SagaQuery, SagaQueryBackend, VersionedSaga};
    pub use async_trait::async_trait;
}
