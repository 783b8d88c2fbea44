use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use promptctl_core::cost::CostModel;

use crate::error::Result;

/// Override file looked up relative to the working directory.
pub const DEFAULT_OVERRIDE_PATH: &str = ".promptctl/pricing.json";

/// USD per million tokens for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

impl ModelPrice {
    pub fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }

    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input
            + (output_tokens as f64 / 1_000_000.0) * self.output
    }
}

/// provider → model → price
pub type PricingMap = HashMap<String, HashMap<String, ModelPrice>>;

/// Provider/model price list implementing [`CostModel`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    providers: PricingMap,
}

impl PricingTable {
    /// An empty table; every lookup is unknown.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in prices for common hosted models.
    pub fn with_defaults() -> Self {
        let mut table = Self::empty();
        for (provider, model, input, output) in [
            ("google", "gemini-1.5-flash", 0.075, 0.30),
            ("google", "gemini-1.5-pro", 1.25, 5.00),
            ("google", "gemini-2.0-flash", 0.10, 0.40),
            ("openai", "gpt-4o-mini", 0.15, 0.60),
            ("openai", "gpt-4o", 2.50, 10.00),
            ("anthropic", "claude-3-5-sonnet", 3.00, 15.00),
        ] {
            table.insert(provider, model, ModelPrice::new(input, output));
        }
        table
    }

    /// Built-in prices merged with `.promptctl/pricing.json` when present.
    pub fn load() -> Self {
        let path = Path::new(DEFAULT_OVERRIDE_PATH);
        if path.exists() {
            Self::with_defaults().with_overrides_from(path)
        } else {
            Self::with_defaults()
        }
    }

    /// Parse a JSON pricing map of the same shape as the table.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn insert(&mut self, provider: impl Into<String>, model: impl Into<String>, price: ModelPrice) {
        self.providers
            .entry(provider.into())
            .or_default()
            .insert(model.into(), price);
    }

    /// Merge `other` into this table. Providers are merged model by model;
    /// entries in `other` win.
    pub fn merge(&mut self, other: PricingTable) {
        for (provider, models) in other.providers {
            self.providers.entry(provider).or_default().extend(models);
        }
    }

    /// Merge an override file. An unreadable or malformed file is logged and
    /// leaves the table unchanged.
    pub fn with_overrides_from(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let overrides = std::fs::read_to_string(path)
            .map_err(crate::error::TraceError::from)
            .and_then(|text| Self::from_json(&text));
        match overrides {
            Ok(overrides) => self.merge(overrides),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load pricing overrides");
            }
        }
        self
    }

    /// Look up a price. The provider is matched lower-cased; the model is
    /// tried lower-cased first, then as given.
    pub fn price(&self, provider: &str, model: &str) -> Option<ModelPrice> {
        let models = self.providers.get(&provider.to_lowercase())?;
        models
            .get(&model.to_lowercase())
            .or_else(|| models.get(model))
            .copied()
    }
}

impl CostModel for PricingTable {
    fn cost_usd(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Option<f64> {
        self.price(provider, model)
            .map(|p| p.cost(input_tokens, output_tokens))
    }
}
