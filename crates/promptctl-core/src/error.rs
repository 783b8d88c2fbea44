use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the promptctl engine.
#[derive(Debug, Error)]
pub enum PromptctlError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failures reported by a language-model provider.
///
/// The `Display` text of each variant is the message recorded on a failed
/// test (`Provider error: <message>`).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API request failed: {0}")]
    ApiRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("{0}")]
    Timeout(String),
}

/// Malformed prompt or test-set sources. Always fatal, raised before any
/// provider call.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse test file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Test file {0} must contain a JSON array")]
    NotAnArray(String),

    #[error("Test case missing \"id\" (index {index})")]
    MissingId { index: usize },

    #[error("Test case has an empty \"id\" (index {index})")]
    EmptyId { index: usize },

    #[error("Test case missing \"input\" (id {id})")]
    MissingInput { id: String },

    #[error("Duplicate test case id: {0}")]
    DuplicateId(String),

    #[error("Invalid test case {id}: {reason}")]
    InvalidTestCase { id: String, reason: String },

    #[error("Invalid prompt front matter: {0}")]
    Frontmatter(String),
}

impl PromptctlError {
    /// Message recorded for a failed provider call.
    ///
    /// Provider errors yield the inner message without the `Provider error:`
    /// prefix, so callers can add their own.
    pub fn provider_message(&self) -> String {
        match self {
            PromptctlError::Provider(inner) => inner.to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PromptctlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_display() {
        let err = ProviderError::ApiRequest("connection reset".into());
        assert_eq!(err.to_string(), "API request failed: connection reset");
    }

    #[test]
    fn provider_error_rate_limited_display() {
        let err = ProviderError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert_eq!(err.to_string(), "Rate limited: retry after Some(30)s");
    }

    #[test]
    fn timeout_message_is_bare() {
        let err: PromptctlError = ProviderError::Timeout("timeout".into()).into();
        assert_eq!(err.provider_message(), "timeout");
        assert_eq!(err.to_string(), "Provider error: timeout");
    }

    #[test]
    fn other_error_message() {
        let err = PromptctlError::Other("boom".into());
        assert_eq!(err.provider_message(), "boom");
    }

    #[test]
    fn load_error_display() {
        let err = LoadError::MissingId { index: 2 };
        assert_eq!(err.to_string(), "Test case missing \"id\" (index 2)");

        let err = LoadError::DuplicateId("t1".into());
        assert_eq!(err.to_string(), "Duplicate test case id: t1");
    }

    #[test]
    fn promptctl_error_from_load_error() {
        let err: PromptctlError = LoadError::NotAnArray("tests.json".into()).into();
        assert!(matches!(err, PromptctlError::Load(LoadError::NotAnArray(_))));
        assert!(err.to_string().contains("must contain a JSON array"));
    }

    #[test]
    fn promptctl_error_from_serde() {
        let err: PromptctlError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("Serialization error"));
    }
}
