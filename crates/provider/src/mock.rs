//! Scriptable in-process provider for tests and local development.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ProviderError;
use crate::types::{GenerationOutput, GenerationRequest};
use crate::GenerationProvider;

/// Default token counts reported for a successful mock call.
const DEFAULT_INPUT_TOKENS: u64 = 100;
const DEFAULT_OUTPUT_TOKENS: u64 = 400;

enum RuleOutcome {
    Fail(String),
    Tokens { input: u64, output: u64 },
}

struct Rule {
    prompt_contains: String,
    outcome: RuleOutcome,
}

/// A [`GenerationProvider`] that returns scripted outcomes.
///
/// With no scripting it succeeds on every call with fixed token counts.
/// Rules match on prompt substrings so tests can target specific terms.
#[derive(Default)]
pub struct MockProvider {
    calls: AtomicU32,
    /// Fail this many leading calls before succeeding (retry tests).
    fail_first: AtomicU32,
    rules: Mutex<Vec<Rule>>,
    /// Simulated per-call latency.
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate per-call latency (for pause/cancel timing tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the first `n` calls, then succeed.
    pub fn fail_first(self, n: u32) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    /// Always fail calls whose prompt contains `needle`.
    pub fn fail_when(self, needle: impl Into<String>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            prompt_contains: needle.into(),
            outcome: RuleOutcome::Fail("scripted failure".to_string()),
        });
        self
    }

    /// Report custom token counts for calls whose prompt contains `needle`.
    pub fn tokens_when(self, needle: impl Into<String>, input: u64, output: u64) -> Self {
        self.rules.lock().unwrap().push(Rule {
            prompt_contains: needle.into(),
            outcome: RuleOutcome::Tokens { input, output },
        });
        self
    }

    /// Total calls made so far.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl GenerationProvider for MockProvider {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        // Leading-failure budget is consumed before substring rules.
        loop {
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining == 0 {
                break;
            }
            if self
                .fail_first
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Err(ProviderError::UnusableOutput(
                    "scripted leading failure".to_string(),
                ));
            }
        }

        let (input_tokens, output_tokens) = {
            let rules = self.rules.lock().unwrap();
            let mut tokens = (DEFAULT_INPUT_TOKENS, DEFAULT_OUTPUT_TOKENS);
            for rule in rules.iter() {
                if request.prompt.contains(&rule.prompt_contains) {
                    match &rule.outcome {
                        RuleOutcome::Fail(msg) => {
                            return Err(ProviderError::UnusableOutput(msg.clone()));
                        }
                        RuleOutcome::Tokens { input, output } => {
                            tokens = (*input, *output);
                        }
                    }
                }
            }
            tokens
        };

        Ok(GenerationOutput {
            content: format!("Generated content for: {}", request.prompt),
            input_tokens,
            output_tokens,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
