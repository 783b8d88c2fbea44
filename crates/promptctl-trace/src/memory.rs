use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use promptctl_core::error::Result;
use promptctl_core::trace::{RunHandle, TraceEvent, TraceSink};

/// In-memory trace store for testing and embedding.
///
/// Thread-safe via `RwLock`. All events are lost when the store is dropped.
pub struct MemoryTraceStore {
    /// Map: run_id → events in append order
    data: RwLock<HashMap<String, Vec<TraceEvent>>>,
}

impl MemoryTraceStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Events recorded for one run, in append order.
    pub fn events(&self, run_id: &str) -> Vec<TraceEvent> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        data.get(run_id).cloned().unwrap_or_default()
    }

    /// Ids of every run allocated by this store.
    pub fn run_ids(&self) -> Vec<String> {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = data.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for MemoryTraceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TraceSink for MemoryTraceStore {
    async fn create_run(&self) -> Result<RunHandle> {
        let run = RunHandle::allocate("memory");
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.insert(run.run_id.clone(), Vec::new());
        Ok(run)
    }

    async fn append_event(&self, run: &RunHandle, event: &TraceEvent) -> Result<()> {
        let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
        data.entry(run.run_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }
}
