pub mod error;
pub mod saga;

pub use error::{Result, SagaError};
pub use saga::{Saga, VersionedSaga};
