//! Single-prompt evaluation against a scripted provider.
//!
//! Loads `demo/joke.md` and `demo/tests.json`, runs them through a
//! `MockProvider`, prices usage with the built-in pricing table and writes one
//! JSONL trace line per test under `.promptctl/runs/`.
//!
//! ```bash
//! RUST_LOG=promptctl=debug cargo run --example basic_eval
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

    let prompt = Prompt::load(format!("{DEMO_DIR}/joke.md"))?;
    let tests = TestSet::load(format!("{DEMO_DIR}/tests.json"))?;

    // Echo the topic back so most assertions pass.
    let provider = MockProvider::from_fn(|req| {
        let system = req.messages[0].content();
        if system.contains("robots") {
            MockReply::text(r#"{"setup": "Why did the robot cross the road?", "punchline": "It was programmed to."}"#)
        } else if system.contains("dogs") {
            MockReply::fail("upstream timed out")
        } else {
            MockReply::text(format!("A joke: {system}"))
        }
    })
    .with_name("google")
    .with_usage(UsageMetadata::new(120, 40, 160))
    .with_latency_ms(250);

    let runner = EvalRunner::new(Arc::new(provider))
        .with_cost_model(Arc::new(PricingTable::load()))
        .with_trace_sink(Arc::new(JsonlTraceStore::default()));

    let run = runner.run(&prompt, &tests.cases, &EvalConfig::default()).await?;
    tracing::info!(path = %run.destination, "trace written");

    println!("=== Run {} ===\n", run.run_id);
    for result in &run.results {
        let status = if result.pass { "PASS" } else { "FAIL" };
        match &result.reason {
            Some(reason) => println!("[{status}] {}: {reason}", result.test_id),
            None => println!("[{status}] {}", result.test_id),
        }
    }
    println!();
    println!("Passed:  {}/{}", run.passed, run.total_tests);
    println!("Mean:    {:.2}", run.mean_score);
    println!("Cost:    ${:.6}", run.total_cost_usd);
    println!("Latency: {} ms", run.total_latency_ms);
    println!(
        "Tokens:  {} in / {} out / {} total",
        run.total_tokens.input, run.total_tokens.output, run.total_tokens.total
    );
    println!("Trace:   {}", run.destination);

    Ok(())
}
