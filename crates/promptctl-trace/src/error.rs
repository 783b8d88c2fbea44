use thiserror::Error;

/// Errors raised while persisting trace events or loading pricing data.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid trace line {line}: {reason}")]
    InvalidLine { line: usize, reason: String },
}

impl From<TraceError> for promptctl_core::error::PromptctlError {
    fn from(e: TraceError) -> Self {
        promptctl_core::error::PromptctlError::Other(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TraceError>;
