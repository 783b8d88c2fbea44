/// Maps token usage to a USD cost.
///
/// `None` means no pricing is known for the provider/model pair; the engine
/// leaves the per-test cost unset and adds nothing to the run total.
pub trait CostModel: Send + Sync {
    fn cost_usd(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Option<f64>;
}

/// Cost model with no pricing data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPricing;

impl CostModel for NoPricing {
    fn cost_usd(&self, _provider: &str, _model: &str, _input: u64, _output: u64) -> Option<f64> {
        None
    }
}
