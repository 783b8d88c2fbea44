pub mod assertion;
pub mod compare;
pub mod dataset;
pub mod mock;
pub mod prompt;
pub mod runner;

pub mod prelude {
    pub use crate::assertion::{evaluate_assertion, Assertion, AssertionResult};
    pub use crate::compare::{bootstrap_ci, compare_runs, AbRunner, ComparisonResult, Significance};
    pub use crate::dataset::{TestCase, TestInput, TestSet};
    pub use crate::mock::{MockProvider, MockReply};
    pub use crate::prompt::{render_prompt, Prompt, RenderedPrompt};
    pub use crate::runner::{EvalRunner, Generation, RunResult, TestResult};
}
