use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{Message, UsageMetadata};

/// A single generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Model identifier passed through to the provider.
    pub model: String,

    /// Ordered conversation, typically `[system, user]`.
    pub messages: Vec<Message>,

    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_output_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: Option<u32>) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// Provider-reported metadata about one call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub provider: String,
    pub latency_ms: u64,
}

/// Result of a successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub output_text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,

    pub meta: ResponseMeta,
}

impl LlmResponse {
    pub fn new(output_text: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            output_text: output_text.into(),
            usage: None,
            meta: ResponseMeta {
                provider: provider.into(),
                latency_ms: 0,
            },
        }
    }

    pub fn with_usage(mut self, usage: UsageMetadata) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.meta.latency_ms = latency_ms;
        self
    }
}

/// A language-model backend.
///
/// Adapters own request formatting, transport and response parsing. Timeouts,
/// if any, belong to the adapter; the engine awaits each call to completion.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name used for pricing lookups and trace events.
    fn name(&self) -> &str;

    /// Generate a response for the given request.
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse>;
}
