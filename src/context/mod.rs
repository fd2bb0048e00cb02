pub mod consume;
pub mod mode;
pub mod saga_context;

pub use consume::ConsumeContext;
pub use mode::SagaConsumeContextMode;
pub use saga_context::SagaConsumeContext;
