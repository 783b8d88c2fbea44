use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Model used when neither an override nor the prompt names one.
pub const DEFAULT_MODEL: &str = "google-gemini-1.5-flash";

/// Resampling iterations for the paired bootstrap.
pub const DEFAULT_BOOTSTRAP_ITERATIONS: usize = 500;

fn default_model() -> String {
    DEFAULT_MODEL.into()
}

fn default_bootstrap_iterations() -> usize {
    DEFAULT_BOOTSTRAP_ITERATIONS
}

/// Configuration for evaluation runs and A/B comparisons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Fallback model name.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Takes precedence over the prompt's own model.
    #[serde(default)]
    pub model_override: Option<String>,

    /// Bootstrap iterations used by A/B comparisons.
    #[serde(default = "default_bootstrap_iterations")]
    pub bootstrap_iterations: usize,

    /// Seed for bootstrap resampling. `None` draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Tags for filtering and categorization.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Arbitrary metadata key-value pairs.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            model_override: None,
            bootstrap_iterations: DEFAULT_BOOTSTRAP_ITERATIONS,
            seed: None,
            tags: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

impl EvalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_model_override(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    pub fn with_bootstrap_iterations(mut self, iterations: usize) -> Self {
        self.bootstrap_iterations = iterations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Resolve the model for a run: override, then the prompt's model, then
    /// the configured default.
    pub fn resolve_model(&self, prompt_model: Option<&str>) -> String {
        self.model_override
            .as_deref()
            .or(prompt_model)
            .unwrap_or(&self.default_model)
            .to_string()
    }
}
