pub mod config;
pub mod cost;
pub mod error;
pub mod message;
pub mod provider;
pub mod trace;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::EvalConfig;
    pub use crate::cost::{CostModel, NoPricing};
    pub use crate::error::{LoadError, PromptctlError, ProviderError, Result};
    pub use crate::message::{Message, TokenCounts, UsageMetadata};
    pub use crate::provider::{LlmRequest, LlmResponse, Provider, ResponseMeta};
    pub use crate::trace::{NoopTraceSink, RunHandle, TraceEvent, TraceSink};
}
