use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Identity of one evaluation run plus where its events are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: String,
    /// Opaque sink-specific location (a file path, a table name, ...).
    pub destination: String,
}

impl RunHandle {
    /// Allocate a handle with a fresh `run_<epoch-ms>_<7 hex>` identifier.
    pub fn allocate(destination: impl Into<String>) -> Self {
        Self {
            run_id: new_run_id(),
            destination: destination.into(),
        }
    }
}

/// Generate a process-unique run identifier.
pub fn new_run_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("run_{}_{}", Utc::now().timestamp_millis(), &suffix[..7])
}

/// One structured record per executed test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Milliseconds since the Unix epoch.
    pub ts: i64,
    pub run_id: String,
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Run-level tags from the eval config.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Config metadata overlaid with the test case's own metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Append-only destination for trace events.
///
/// The engine never reads events back; appends are fire-and-forget from its
/// point of view (errors are logged by the caller, not propagated).
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// Allocate a run handle before the first test executes.
    async fn create_run(&self) -> Result<RunHandle>;

    /// Append one event to the run's stream.
    async fn append_event(&self, run: &RunHandle, event: &TraceEvent) -> Result<()>;
}

/// Sink that allocates run ids and drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTraceSink;

#[async_trait]
impl TraceSink for NoopTraceSink {
    async fn create_run(&self) -> Result<RunHandle> {
        Ok(RunHandle::allocate(""))
    }

    async fn append_event(&self, _run: &RunHandle, _event: &TraceEvent) -> Result<()> {
        Ok(())
    }
}
