use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use promptctl_core::config::EvalConfig;
use promptctl_core::error::Result;

use crate::dataset::TestCase;
use crate::prompt::Prompt;
use crate::runner::{EvalRunner, RunResult, TestResult};

/// Direction of a comparison, read off the bootstrap interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    /// The interval lies entirely above zero.
    BetterB,
    /// The interval lies entirely below zero.
    WorseB,
    Inconclusive,
}

/// Paired comparison of two runs over the same test set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub run_id_a: String,
    pub run_id_b: String,
    /// Mean of `score_b - score_a` over paired tests.
    pub mean_delta: f64,
    /// Fraction of paired tests where B scored strictly higher.
    pub win_rate: f64,
    pub wins: usize,
    pub losses: usize,
    pub ties: usize,
    pub paired_count: usize,
    /// 95% bootstrap interval for `mean_delta`.
    pub confidence_interval: [f64; 2],
    pub stats_a: RunResult,
    pub stats_b: RunResult,
}

impl ComparisonResult {
    pub fn significance(&self) -> Significance {
        let [low, high] = self.confidence_interval;
        if low > 0.0 {
            Significance::BetterB
        } else if high < 0.0 {
            Significance::WorseB
        } else {
            Significance::Inconclusive
        }
    }
}

/// Pair results by test id, in order of first appearance in `a`. Ids present
/// in only one run are skipped; a duplicated id pairs its last result on
/// either side.
fn paired<'a>(a: &'a RunResult, b: &'a RunResult) -> Vec<(&'a TestResult, &'a TestResult)> {
    let by_id_b: HashMap<&str, &TestResult> =
        b.results.iter().map(|r| (r.test_id.as_str(), r)).collect();
    let mut by_id_a: HashMap<&str, &TestResult> = HashMap::new();
    let mut order = Vec::new();

    for ra in &a.results {
        if by_id_a.insert(ra.test_id.as_str(), ra).is_none() {
            order.push(ra.test_id.as_str());
        }
    }

    let mut pairs = Vec::with_capacity(order.len());
    for id in order {
        if let (Some(ra), Some(rb)) = (by_id_a.get(id), by_id_b.get(id)) {
            pairs.push((*ra, *rb));
        }
    }
    pairs
}

/// Compare two completed runs. `b` is the candidate: positive deltas favour B.
pub fn compare_runs<R: Rng + ?Sized>(
    a: &RunResult,
    b: &RunResult,
    iterations: usize,
    rng: &mut R,
) -> ComparisonResult {
    let pairs = paired(a, b);
    let mut deltas = Vec::with_capacity(pairs.len());
    let (mut wins, mut losses, mut ties) = (0, 0, 0);

    for (ra, rb) in &pairs {
        deltas.push(rb.score - ra.score);
        if rb.score > ra.score {
            wins += 1;
        } else if rb.score < ra.score {
            losses += 1;
        } else {
            ties += 1;
        }
    }

    let paired_count = deltas.len();
    let (mean_delta, win_rate) = if paired_count == 0 {
        (0.0, 0.0)
    } else {
        (
            deltas.iter().sum::<f64>() / paired_count as f64,
            wins as f64 / paired_count as f64,
        )
    };

    ComparisonResult {
        run_id_a: a.run_id.clone(),
        run_id_b: b.run_id.clone(),
        mean_delta,
        win_rate,
        wins,
        losses,
        ties,
        paired_count,
        confidence_interval: bootstrap_ci(&deltas, iterations, rng),
        stats_a: a.clone(),
        stats_b: b.clone(),
    }
}

/// 95% percentile bootstrap interval for the mean of `deltas`.
///
/// Returns `[0, 0]` when there is nothing to resample.
pub fn bootstrap_ci<R: Rng + ?Sized>(deltas: &[f64], iterations: usize, rng: &mut R) -> [f64; 2] {
    let n = deltas.len();
    if n == 0 || iterations == 0 {
        return [0.0, 0.0];
    }

    let mut means: Vec<f64> = (0..iterations)
        .map(|_| {
            let sum: f64 = (0..n).map(|_| deltas[rng.gen_range(0..n)]).sum();
            sum / n as f64
        })
        .collect();
    means.sort_by(f64::total_cmp);

    let lower = (0.025 * iterations as f64).floor() as usize;
    let upper = ((0.975 * iterations as f64).ceil() as usize).min(iterations - 1);
    [means[lower], means[upper]]
}

/// Runs two prompt variants over the same tests and compares them.
pub struct AbRunner {
    runner: EvalRunner,
}

impl AbRunner {
    pub fn new(runner: EvalRunner) -> Self {
        Self { runner }
    }

    /// Run A to completion, then B, then compare with
    /// `config.bootstrap_iterations` resamples.
    pub async fn run(
        &self,
        prompt_a: &Prompt,
        prompt_b: &Prompt,
        tests: &[TestCase],
        config: &EvalConfig,
    ) -> Result<ComparisonResult> {
        tracing::info!(variant = "A", "running eval");
        let stats_a = self.runner.run(prompt_a, tests, config).await?;

        tracing::info!(variant = "B", "running eval");
        let stats_b = self.runner.run(prompt_b, tests, config).await?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let comparison = compare_runs(&stats_a, &stats_b, config.bootstrap_iterations, &mut rng);

        tracing::info!(
            mean_delta = comparison.mean_delta,
            win_rate = comparison.win_rate,
            paired = comparison.paired_count,
            ci_low = comparison.confidence_interval[0],
            ci_high = comparison.confidence_interval[1],
            "comparison complete"
        );
        Ok(comparison)
    }
}
