use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use promptctl_core::config::EvalConfig;
use promptctl_core::cost::{CostModel, NoPricing};
use promptctl_core::error::Result;
use promptctl_core::message::{Message, TokenCounts};
use promptctl_core::provider::{LlmRequest, LlmResponse, Provider};
use promptctl_core::trace::{NoopTraceSink, RunHandle, TraceEvent, TraceSink};

use crate::assertion::evaluate_assertion;
use crate::dataset::TestCase;
use crate::prompt::Prompt;

/// Outcome of one provider call.
#[derive(Debug, Clone)]
pub enum Generation {
    Completed(LlmResponse),
    /// The provider never produced a response.
    Failed { message: String },
}

impl Generation {
    pub fn output_text(&self) -> &str {
        match self {
            Generation::Completed(response) => &response.output_text,
            Generation::Failed { .. } => "",
        }
    }

    pub fn latency_ms(&self) -> u64 {
        match self {
            Generation::Completed(response) => response.meta.latency_ms,
            Generation::Failed { .. } => 0,
        }
    }

    pub fn tokens(&self) -> Option<TokenCounts> {
        match self {
            Generation::Completed(response) => response.usage.as_ref().map(|u| u.counts()),
            Generation::Failed { .. } => None,
        }
    }
}

/// Result of one test case within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: String,
    pub pass: bool,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub output_text: String,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenCounts>,
    /// Set iff the provider call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_error: Option<String>,
}

/// Summary of a complete evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    /// Where the run's trace events were written.
    pub destination: String,
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub mean_score: f64,
    pub total_cost_usd: f64,
    pub total_latency_ms: u64,
    pub total_tokens: TokenCounts,
    pub results: Vec<TestResult>,
}

impl RunResult {
    /// Fraction of tests that passed (0 for an empty run).
    pub fn pass_rate(&self) -> f64 {
        if self.total_tests == 0 {
            0.0
        } else {
            self.passed as f64 / self.total_tests as f64
        }
    }
}

/// Runs a prompt over a test set against one provider.
pub struct EvalRunner {
    provider: Arc<dyn Provider>,
    cost_model: Arc<dyn CostModel>,
    trace_sink: Arc<dyn TraceSink>,
}

impl EvalRunner {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            cost_model: Arc::new(NoPricing),
            trace_sink: Arc::new(NoopTraceSink),
        }
    }

    pub fn with_cost_model(mut self, cost_model: Arc<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn with_trace_sink(mut self, trace_sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = trace_sink;
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Execute every test case in order and aggregate the results.
    ///
    /// Only allocating the run handle can fail; provider failures become
    /// failed tests and trace sink errors are logged.
    pub async fn run(
        &self,
        prompt: &Prompt,
        tests: &[TestCase],
        config: &EvalConfig,
    ) -> Result<RunResult> {
        let model = config.resolve_model(prompt.model.as_deref());
        let provider_name = self.provider.name().to_string();
        let prompt_id = prompt.prompt_id();
        let run = self.trace_sink.create_run().await?;

        tracing::info!(
            run_id = %run.run_id,
            tests = tests.len(),
            provider = %provider_name,
            model = %model,
            "starting eval run"
        );

        let mut results = Vec::with_capacity(tests.len());
        let mut total_score = 0.0;
        let mut total_cost_usd = 0.0;
        let mut total_latency_ms = 0;
        let mut total_tokens = TokenCounts::default();

        for test in tests {
            let rendered = prompt.render(&test.input);
            let request = LlmRequest::new(
                model.clone(),
                vec![Message::system(rendered.system), Message::user(rendered.user)],
            )
            .with_temperature(prompt.temperature)
            .with_max_output_tokens(prompt.max_output_tokens);

            let generation = match self.provider.generate(&request).await {
                Ok(response) => Generation::Completed(response),
                Err(e) => {
                    let message = e.provider_message();
                    tracing::warn!(test_id = %test.id, error = %message, "provider call failed");
                    Generation::Failed { message }
                }
            };

            let result = score_test(test, &generation, |tokens| {
                self.cost_model
                    .cost_usd(&provider_name, &model, tokens.input, tokens.output)
            });

            total_score += result.score;
            total_cost_usd += result.cost_usd.unwrap_or(0.0);
            total_latency_ms += result.latency_ms;
            if let Some(tokens) = &result.tokens {
                total_tokens.add(tokens);
            }

            tracing::debug!(
                test_id = %result.test_id,
                pass = result.pass,
                latency_ms = result.latency_ms,
                "test finished"
            );

            let event = trace_event(
                &run,
                &provider_name,
                &model,
                prompt_id.clone(),
                config,
                test,
                &result,
            );
            if let Err(e) = self.trace_sink.append_event(&run, &event).await {
                tracing::warn!(run_id = %run.run_id, error = %e, "failed to append trace event");
            }

            results.push(result);
        }

        let total_tests = results.len();
        let passed = results.iter().filter(|r| r.pass).count();
        let mean_score = if total_tests == 0 {
            0.0
        } else {
            total_score / total_tests as f64
        };

        tracing::info!(
            run_id = %run.run_id,
            passed,
            total = total_tests,
            mean_score,
            "eval run complete"
        );

        Ok(RunResult {
            run_id: run.run_id,
            destination: run.destination,
            total_tests,
            passed,
            failed: total_tests - passed,
            mean_score,
            total_cost_usd,
            total_latency_ms,
            total_tokens,
            results,
        })
    }
}

/// Score one generation against the test's assertions.
fn score_test(
    test: &TestCase,
    generation: &Generation,
    price: impl FnOnce(&TokenCounts) -> Option<f64>,
) -> TestResult {
    let tokens = generation.tokens();
    let (pass, reason, provider_error, cost_usd) = match generation {
        Generation::Failed { message } => (
            false,
            Some(format!("Provider error: {message}")),
            Some(message.clone()),
            None,
        ),
        Generation::Completed(response) => {
            let failures: Vec<String> = test
                .assertions
                .iter()
                .map(|a| evaluate_assertion(&response.output_text, a))
                .filter(|r| !r.pass)
                .filter_map(|r| r.reason)
                .collect();
            let pass = failures.is_empty();
            let reason = (!pass).then(|| failures.join("; "));
            let cost = price(&tokens.unwrap_or_default());
            (pass, reason, None, cost)
        }
    };

    TestResult {
        test_id: test.id.clone(),
        pass,
        score: if pass { 1.0 } else { 0.0 },
        reason,
        output_text: generation.output_text().to_string(),
        latency_ms: generation.latency_ms(),
        cost_usd,
        tokens,
        provider_error,
    }
}

fn trace_event(
    run: &RunHandle,
    provider: &str,
    model: &str,
    prompt_id: Option<String>,
    config: &EvalConfig,
    test: &TestCase,
    result: &TestResult,
) -> TraceEvent {
    // Test metadata wins on key clashes.
    let mut metadata = config.metadata.clone();
    metadata.extend(test.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));

    TraceEvent {
        ts: Utc::now().timestamp_millis(),
        run_id: run.run_id.clone(),
        provider: provider.to_string(),
        model: model.to_string(),
        prompt_id,
        test_id: Some(result.test_id.clone()),
        latency_ms: result.latency_ms,
        input_tokens: result.tokens.map(|t| t.input),
        output_tokens: result.tokens.map(|t| t.output),
        total_tokens: result.tokens.map(|t| t.total),
        cost_usd: result.cost_usd,
        score: Some(result.score),
        ok: result.pass,
        error: result
            .provider_error
            .clone()
            .or_else(|| result.reason.clone()),
        tags: config.tags.clone(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::Assertion;
    use crate::mock::{MockProvider, MockReply};
    use async_trait::async_trait;
    use promptctl_core::error::PromptctlError;
    use promptctl_core::message::UsageMetadata;
    use serde_json::json;
    use std::sync::Mutex;

    struct Flat;

    impl CostModel for Flat {
        fn cost_usd(&self, _p: &str, _m: &str, input: u64, output: u64) -> Option<f64> {
            Some((input + output) as f64 * 0.001)
        }
    }

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<TraceEvent>>,
    }

    #[async_trait]
    impl TraceSink for Recording {
        async fn create_run(&self) -> Result<RunHandle> {
            Ok(RunHandle::allocate("memory"))
        }

        async fn append_event(&self, _run: &RunHandle, event: &TraceEvent) -> Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl TraceSink for Broken {
        async fn create_run(&self) -> Result<RunHandle> {
            Ok(RunHandle::allocate("broken"))
        }

        async fn append_event(&self, _run: &RunHandle, _event: &TraceEvent) -> Result<()> {
            Err(PromptctlError::Other("disk full".into()))
        }
    }

    fn joke_tests() -> Vec<TestCase> {
        vec![
            TestCase::with_variables("t1", json!({"topic": "cats"}))
                .with_assertion(Assertion::contains("cat")),
            TestCase::with_variables("t2", json!({"topic": "dogs"}))
                .with_assertion(Assertion::contains("dog")),
        ]
    }

    #[tokio::test]
    async fn aggregates_pass_counts_and_mean() {
        let provider = Arc::new(MockProvider::new(vec![
            MockReply::text("a cat walks in"),
            MockReply::text("no animals here"),
        ]));
        let runner = EvalRunner::new(provider);
        let prompt = Prompt::new("Tell me a joke about {{topic}}");

        let run = runner
            .run(&prompt, &joke_tests(), &EvalConfig::default())
            .await
            .unwrap();

        assert_eq!(run.total_tests, 2);
        assert_eq!(run.passed, 1);
        assert_eq!(run.failed, 1);
        assert_eq!(run.passed + run.failed, run.total_tests);
        assert!((run.mean_score - 0.5).abs() < 1e-10);
        assert_eq!(run.results[1].reason.as_deref(), Some("Expected to contain \"dog\""));
        assert!(run.run_id.starts_with("run_"));
    }

    #[tokio::test]
    async fn empty_test_set() {
        let runner = EvalRunner::new(Arc::new(MockProvider::with_response("x")));
        let run = runner
            .run(&Prompt::new("p"), &[], &EvalConfig::default())
            .await
            .unwrap();
        assert_eq!(run.total_tests, 0);
        assert_eq!(run.mean_score, 0.0);
        assert_eq!(run.pass_rate(), 0.0);
    }

    #[tokio::test]
    async fn request_carries_rendered_prompt_and_settings() {
        let provider = Arc::new(MockProvider::with_response("ok"));
        let runner = EvalRunner::new(provider.clone());
        let prompt = Prompt::new("About {{topic}}")
            .with_model("gemini-1.5-pro")
            .with_temperature(0.3)
            .with_max_output_tokens(128);

        runner
            .run(&prompt, &joke_tests()[..1], &EvalConfig::default())
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.model, "gemini-1.5-pro");
        assert_eq!(req.temperature, Some(0.3));
        assert_eq!(req.max_output_tokens, Some(128));
        assert_eq!(req.messages[0], Message::system("About cats"));
        assert_eq!(req.messages[1].role(), "user");
        assert!(req.messages[1].content().starts_with("INPUT:\n"));
    }

    #[tokio::test]
    async fn model_override_wins() {
        let provider = Arc::new(MockProvider::with_response("ok"));
        let runner = EvalRunner::new(provider.clone());
        let prompt = Prompt::new("x").with_model("from-prompt");
        let config = EvalConfig::new().with_model_override("forced");

        runner.run(&prompt, &joke_tests(), &config).await.unwrap();
        assert!(provider.requests().iter().all(|r| r.model == "forced"));
    }

    #[tokio::test]
    async fn no_assertions_pass_by_default() {
        let runner = EvalRunner::new(Arc::new(MockProvider::with_response("")));
        let tests = vec![TestCase::new("t1", "anything")];
        let run = runner
            .run(&Prompt::new("{{input}}"), &tests, &EvalConfig::default())
            .await
            .unwrap();
        assert!(run.results[0].pass);
        assert_eq!(run.results[0].score, 1.0);
        assert!(run.results[0].reason.is_none());
    }

    #[tokio::test]
    async fn multiple_failures_join_reasons() {
        let runner = EvalRunner::new(Arc::new(MockProvider::with_response("hello")));
        let tests = vec![
            TestCase::new("t1", "x")
                .with_assertion(Assertion::contains("a"))
                .with_assertion(Assertion::contains("hell"))
                .with_assertion(Assertion::equals("b")),
        ];
        let run = runner
            .run(&Prompt::new("p"), &tests, &EvalConfig::default())
            .await
            .unwrap();
        assert_eq!(
            run.results[0].reason.as_deref(),
            Some("Expected to contain \"a\"; Expected \"b\", got \"hello\"")
        );
        assert_eq!(run.results[0].score, 0.0);
    }

    #[tokio::test]
    async fn provider_failure_is_a_failed_test() {
        let provider = Arc::new(MockProvider::new(vec![
            MockReply::fail("timeout"),
            MockReply::text("a dog"),
        ]));
        let runner = EvalRunner::new(provider.clone()).with_cost_model(Arc::new(Flat));

        let run = runner
            .run(&Prompt::new("p"), &joke_tests(), &EvalConfig::default())
            .await
            .unwrap();

        assert_eq!(provider.call_count(), 2);
        let failed = &run.results[0];
        assert!(!failed.pass);
        assert_eq!(failed.reason.as_deref(), Some("Provider error: timeout"));
        assert_eq!(failed.provider_error.as_deref(), Some("timeout"));
        assert_eq!(failed.output_text, "");
        assert_eq!(failed.latency_ms, 0);
        assert!(failed.cost_usd.is_none());
        assert!(failed.tokens.is_none());

        assert!(run.results[1].pass);
        assert!(run.results[1].provider_error.is_none());
    }

    #[tokio::test]
    async fn accumulates_cost_latency_and_tokens() {
        let provider = Arc::new(
            MockProvider::with_response("cat dog")
                .with_usage(UsageMetadata::new(100, 50, 150))
                .with_latency_ms(40),
        );
        let runner = EvalRunner::new(provider).with_cost_model(Arc::new(Flat));

        let run = runner
            .run(&Prompt::new("p"), &joke_tests(), &EvalConfig::default())
            .await
            .unwrap();

        assert_eq!(run.total_latency_ms, 80);
        assert_eq!(
            run.total_tokens,
            TokenCounts {
                input: 200,
                output: 100,
                total: 300
            }
        );
        assert!((run.total_cost_usd - 0.3).abs() < 1e-9);
        assert!((run.results[0].cost_usd.unwrap() - 0.15).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unknown_pricing_leaves_cost_unset() {
        let provider =
            Arc::new(MockProvider::with_response("cat").with_usage(UsageMetadata::new(1, 1, 2)));
        let runner = EvalRunner::new(provider);
        let run = runner
            .run(&Prompt::new("p"), &joke_tests()[..1], &EvalConfig::default())
            .await
            .unwrap();
        assert!(run.results[0].cost_usd.is_none());
        assert_eq!(run.total_cost_usd, 0.0);
    }

    #[tokio::test]
    async fn emits_one_trace_event_per_test() {
        let sink = Arc::new(Recording::default());
        let provider = Arc::new(MockProvider::new(vec![
            MockReply::text("cat"),
            MockReply::fail("boom"),
        ]));
        let runner = EvalRunner::new(provider).with_trace_sink(sink.clone());
        let prompt = Prompt::new("p").with_name("jokes");

        let run = runner
            .run(&prompt, &joke_tests(), &EvalConfig::default())
            .await
            .unwrap();

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(run.destination, "memory");
        assert!(events.iter().all(|e| e.run_id == run.run_id));
        assert_eq!(events[0].prompt_id.as_deref(), Some("jokes"));
        assert_eq!(events[0].test_id.as_deref(), Some("t1"));
        assert!(events[0].ok);
        assert_eq!(events[0].model, "google-gemini-1.5-flash");
        assert_eq!(events[0].provider, "mock");
        assert!(!events[1].ok);
        assert_eq!(events[1].error.as_deref(), Some("boom"));
        assert_eq!(events[1].score, Some(0.0));
    }

    #[tokio::test]
    async fn trace_events_carry_tags_and_metadata() {
        let sink = Arc::new(Recording::default());
        let runner = EvalRunner::new(Arc::new(MockProvider::with_response("cat")))
            .with_trace_sink(sink.clone());
        let config = EvalConfig::new()
            .with_tag("nightly")
            .with_metadata("branch", json!("main"))
            .with_metadata("difficulty", json!("any"));
        let tests = vec![
            TestCase::new("t1", "x").with_metadata("difficulty", json!("hard")),
            TestCase::new("t2", "x"),
        ];

        runner.run(&Prompt::new("p"), &tests, &config).await.unwrap();

        let events = sink.events.lock().unwrap();
        assert!(events.iter().all(|e| e.tags == vec!["nightly"]));
        assert_eq!(events[0].metadata["branch"], json!("main"));
        assert_eq!(events[0].metadata["difficulty"], json!("hard"));
        assert_eq!(events[1].metadata["difficulty"], json!("any"));
    }

    #[tokio::test]
    async fn sink_failures_do_not_abort_the_run() {
        let runner = EvalRunner::new(Arc::new(MockProvider::with_response("cat")))
            .with_trace_sink(Arc::new(Broken));
        let run = runner
            .run(&Prompt::new("p"), &joke_tests(), &EvalConfig::default())
            .await
            .unwrap();
        assert_eq!(run.total_tests, 2);
    }

    #[tokio::test]
    async fn run_result_serializes() {
        let runner = EvalRunner::new(Arc::new(MockProvider::with_response("cat")));
        let run = runner
            .run(&Prompt::new("p"), &joke_tests(), &EvalConfig::default())
            .await
            .unwrap();
        let json = serde_json::to_string(&run).unwrap();
        assert!(json.contains("\"total_tests\":2"));
        let parsed: RunResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, run);
    }
}
