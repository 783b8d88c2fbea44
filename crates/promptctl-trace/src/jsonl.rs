use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use promptctl_core::error::Result;
use promptctl_core::trace::{RunHandle, TraceEvent, TraceSink};

use crate::config::TraceConfig;
use crate::error::TraceError;

/// Writes each run to `<base_dir>/<run_id>.jsonl`, one compact JSON object
/// per line.
///
/// With a disabled config, run handles are still allocated (with an empty
/// destination) and every append is dropped.
pub struct JsonlTraceStore {
    config: TraceConfig,
}

impl JsonlTraceStore {
    pub fn new(config: TraceConfig) -> Self {
        Self { config }
    }

    /// Store rooted at `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(TraceConfig::default().with_base_dir(dir))
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    /// Path of the file holding a run's events.
    pub fn run_path(&self, run_id: &str) -> PathBuf {
        self.config.base_dir.join(format!("{run_id}.jsonl"))
    }

    async fn create_file(&self) -> std::result::Result<RunHandle, TraceError> {
        tokio::fs::create_dir_all(&self.config.base_dir).await?;
        let base = std::path::absolute(&self.config.base_dir)?;

        let mut run = RunHandle::allocate("");
        let path = base.join(format!("{}.jsonl", run.run_id));
        tokio::fs::write(&path, b"").await?;

        run.destination = path.display().to_string();
        Ok(run)
    }

    async fn append_line(
        &self,
        run: &RunHandle,
        event: &TraceEvent,
    ) -> std::result::Result<(), TraceError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&run.destination)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

impl Default for JsonlTraceStore {
    fn default() -> Self {
        Self::new(TraceConfig::default())
    }
}

#[async_trait]
impl TraceSink for JsonlTraceStore {
    async fn create_run(&self) -> Result<RunHandle> {
        if !self.config.enabled {
            return Ok(RunHandle::allocate(""));
        }
        let run = self.create_file().await?;
        tracing::debug!(run_id = %run.run_id, path = %run.destination, "created run file");
        Ok(run)
    }

    async fn append_event(&self, run: &RunHandle, event: &TraceEvent) -> Result<()> {
        if !self.config.enabled || run.destination.is_empty() {
            return Ok(());
        }
        Ok(self.append_line(run, event).await?)
    }
}

/// Read every event from a run file. Blank lines are skipped.
pub async fn read_events(path: impl AsRef<Path>) -> std::result::Result<Vec<TraceEvent>, TraceError> {
    let text = tokio::fs::read_to_string(path).await?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| TraceError::InvalidLine {
                line: i + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}
