use std::fmt;

/// How a saga instance entered the current message scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaConsumeContextMode {
    /// Registered by the pipeline, not yet written to the backend.
    Add,
    /// Created by this message through an atomic backend insert.
    Insert,
    /// Read from the backend by correlation id.
    Load,
}

impl SagaConsumeContextMode {
    /// True when the instance did not exist before this message.
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Add | Self::Insert)
    }
}

impl fmt::Display for SagaConsumeContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Add => "add",
            Self::Insert => "insert",
            Self::Load => "load",
        };
        write!(f, "{label}")
    }
}
