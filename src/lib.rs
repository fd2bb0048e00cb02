// ============================================================================
// sagarepo Library
// ============================================================================

pub mod backend;
pub mod config;
pub mod context;
pub mod core;
pub mod factory;
pub mod prelude;
pub mod repository;

// Re-export main types for convenience
pub use backend::{
    ConstPartitionKeyFormatter, FileSagaBackend, HashedPartitionKeyFormatter,
    InMemorySagaBackend, SagaBackend, SagaKeyFormatter, SagaQuery, SagaQueryBackend, TableKey,
    TableSagaBackend,
};
pub use config::{
    FileBackendConfig, InMemoryBackendConfig, SagaRepositoryOptions, TableBackendConfig,
    TablePartitionStrategy,
};
pub use context::{ConsumeContext, SagaConsumeContext, SagaConsumeContextMode};
pub use core::{Result, Saga, SagaError, VersionedSaga};
pub use factory::{DefaultSagaConsumeContextFactory, SagaConsumeContextFactory};
pub use repository::{
    SagaQueryRepositoryContext, SagaRepository, SagaRepositoryContext,
    SagaRepositoryQueryContext,
};

// Re-exported so backends and callers share one token type.
pub use tokio_util::sync::CancellationToken;
