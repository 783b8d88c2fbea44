//! A/B comparison of two prompt variants with a paired bootstrap interval.
//!
//! Variant A (`demo/joke.md`) and variant B (`demo/joke_v2.md`) run over the
//! same tests. The scripted provider only names the topic when the prompt asks
//! for it, so B should come out ahead.
//!
//! ```bash
//! cargo run --example ab_compare
//! ```

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use promptctl_core::prelude::*;
use promptctl_eval::prelude::*;
use promptctl_trace::prelude::*;

const DEMO_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demo");

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promptctl=info".into()),
        )
        .init();

    let prompt_a = Prompt::load(format!("{DEMO_DIR}/joke.md"))?;
    let prompt_b = Prompt::load(format!("{DEMO_DIR}/joke_v2.md"))?;
    let tests = TestSet::load(format!("{DEMO_DIR}/tests.json"))?;

    let provider = MockProvider::from_fn(|req| {
        let system = req.messages[0].content();
        if system.contains("punchline") {
            MockReply::text(format!("Punchline about {system}"))
        } else {
            MockReply::text("Knock knock.")
        }
    })
    .with_name("google")
    .with_usage(UsageMetadata::new(80, 30, 110));

    let store = Arc::new(MemoryTraceStore::new());
    let runner = EvalRunner::new(Arc::new(provider))
        .with_cost_model(Arc::new(PricingTable::with_defaults()))
        .with_trace_sink(store.clone());

    let config = EvalConfig::default()
        .with_seed(42)
        .with_bootstrap_iterations(1000);
    let comparison = AbRunner::new(runner)
        .run(&prompt_a, &prompt_b, &tests.cases, &config)
        .await?;

    let [low, high] = comparison.confidence_interval;
    println!("=== {} vs {} ===\n", comparison.run_id_a, comparison.run_id_b);
    println!(
        "A: {}/{} passed (mean {:.2})",
        comparison.stats_a.passed, comparison.stats_a.total_tests, comparison.stats_a.mean_score
    );
    println!(
        "B: {}/{} passed (mean {:.2})",
        comparison.stats_b.passed, comparison.stats_b.total_tests, comparison.stats_b.mean_score
    );
    println!("Paired tests: {}", comparison.paired_count);
    println!(
        "Wins/losses/ties: {}/{}/{}",
        comparison.wins, comparison.losses, comparison.ties
    );
    println!("Mean delta:   {:+.3}", comparison.mean_delta);
    println!("Win rate:     {:.1}%", comparison.win_rate * 100.0);
    println!("95% CI:       [{low:+.3}, {high:+.3}]");
    println!("Verdict:      {:?}", comparison.significance());
    println!(
        "Trace events: {} + {}",
        store.events(&comparison.run_id_a).len(),
        store.events(&comparison.run_id_b).len()
    );

    println!("\n{}", serde_json::to_string_pretty(&comparison.stats_b.results[0])?);

    Ok(())
}
