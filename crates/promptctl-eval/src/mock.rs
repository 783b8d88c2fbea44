use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use promptctl_core::error::{PromptctlError, Result};
use promptctl_core::message::UsageMetadata;
use promptctl_core::provider::{LlmRequest, LlmResponse, Provider};

/// A scripted provider outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Text(String),
    /// The call fails with this message.
    Fail(String),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        MockReply::Fail(message.into())
    }
}

type Responder = Box<dyn Fn(&LlmRequest) -> MockReply + Send + Sync>;

enum Script {
    Cycle(Vec<MockReply>),
    Respond(Responder),
}

/// A mock provider that returns preset replies and records every request.
pub struct MockProvider {
    name: String,
    script: Script,
    usage: Option<UsageMetadata>,
    latency_ms: u64,
    call_count: AtomicUsize,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockProvider {
    /// Create a `MockProvider` that cycles through the given replies.
    /// With no replies every call returns empty text.
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self::with_script(Script::Cycle(replies))
    }

    /// Create a `MockProvider` that always returns the same text.
    pub fn with_response(text: impl Into<String>) -> Self {
        Self::new(vec![MockReply::text(text)])
    }

    /// Create a `MockProvider` whose reply is computed from each request.
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&LlmRequest) -> MockReply + Send + Sync + 'static,
    {
        Self::with_script(Script::Respond(Box::new(responder)))
    }

    fn with_script(script: Script) -> Self {
        Self {
            name: "mock".into(),
            script,
            usage: None,
            latency_ms: 0,
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Usage reported on every successful reply.
    pub fn with_usage(mut self, usage: UsageMetadata) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Get the number of times this provider has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn next_reply(&self, idx: usize, request: &LlmRequest) -> MockReply {
        match &self.script {
            Script::Cycle(replies) if replies.is_empty() => MockReply::Text(String::new()),
            Script::Cycle(replies) => replies[idx % replies.len()].clone(),
            Script::Respond(responder) => responder(request),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        match self.next_reply(idx, request) {
            MockReply::Text(text) => {
                let mut response =
                    LlmResponse::new(text, self.name.clone()).with_latency_ms(self.latency_ms);
                response.usage = self.usage.clone();
                Ok(response)
            }
            MockReply::Fail(message) => Err(PromptctlError::Other(message)),
        }
    }
}
