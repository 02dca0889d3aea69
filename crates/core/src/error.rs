use crate::types::OptionId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown option id: {0}")]
    UnknownOption(OptionId),

    #[error("Validation failed: {0}")]
    Validation(String),
}
