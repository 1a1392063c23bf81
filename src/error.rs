use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SeaFormerError {
    /// A model was described with values that cannot be wired together.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Raw image data handed to an inference helper does not match its description.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SeaFormerError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub(crate) fn input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

pub type Result<T, E = SeaFormerError> = std::result::Result<T, E>;
