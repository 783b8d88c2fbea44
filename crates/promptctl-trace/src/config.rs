use std::path::PathBuf;

/// Directory, relative to the working directory, where run files are written.
pub const DEFAULT_RUN_DIR: &str = ".promptctl/runs";

/// Configuration for trace persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    /// Directory holding one `<run_id>.jsonl` file per run.
    pub base_dir: PathBuf,
    /// When false, run ids are still allocated but nothing is written.
    pub enabled: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_RUN_DIR),
            enabled: true,
        }
    }
}

impl TraceConfig {
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
