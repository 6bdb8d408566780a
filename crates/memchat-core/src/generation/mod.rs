//! ============================================================================
//! Generation Module - Best-effort completions over several call shapes
//! ============================================================================
//! The provider's exact integration surface is not known up front, so the
//! invoker walks an ordered list of strategies. Only an unsupported call
//! shape moves on to the next one; the first text returned wins. If nothing
//! answers, a fixed placeholder is returned instead of an error.
//! ============================================================================

mod gemini;

pub use gemini::{gemini_strategies, GeminiRestStrategy, OpenAiCompatStrategy, GEMINI_BASE_URL};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{MemoryError, Result};

/// Shown to the user when no strategy produced a response
pub const PLACEHOLDER_RESPONSE: &str = "Sorry — I had trouble contacting the LLM.";

/// Why a single strategy did not produce text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    /// This call convention is not available on the provider
    #[error("unsupported call shape: {0}")]
    UnsupportedShape(String),

    /// The call was understood but failed (content, quota, auth, transport)
    #[error("generation failed: {0}")]
    Failed(String),
}

/// One way of asking the model for a completion
#[async_trait]
pub trait GenerationStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> std::result::Result<String, StrategyError>;
}

/// Text produced by a strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub strategy: String,
}

/// Tries strategies in order until one answers
pub struct GenerationInvoker {
    strategies: Vec<Box<dyn GenerationStrategy>>,
    placeholder: String,
}

impl GenerationInvoker {
    pub fn new(strategies: Vec<Box<dyn GenerationStrategy>>) -> Self {
        Self {
            strategies,
            placeholder: PLACEHOLDER_RESPONSE.to_string(),
        }
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Completion text, or the placeholder if every strategy failed
    pub async fn generate(&self, prompt: &str) -> String {
        match self.try_generate(prompt).await {
            Ok(generation) => generation.text,
            Err(e) => {
                warn!("LLM call failed, using placeholder response: {}", e);
                self.placeholder.clone()
            }
        }
    }

    /// Like `generate`, but reports `GenerationUnavailable` instead of masking it
    pub async fn try_generate(&self, prompt: &str) -> Result<Generation> {
        debug!("Generating completion for {} char prompt", prompt.len());

        let mut unsupported = Vec::new();

        for strategy in &self.strategies {
            match strategy.generate(prompt).await {
                Ok(text) => {
                    info!(strategy = strategy.name(), "Generation succeeded");
                    return Ok(Generation {
                        text,
                        strategy: strategy.name().to_string(),
                    });
                }
                Err(StrategyError::UnsupportedShape(reason)) => {
                    debug!(strategy = strategy.name(), "Call shape unsupported: {}", reason);
                    unsupported.push(format!("{}: {}", strategy.name(), reason));
                }
                Err(StrategyError::Failed(reason)) => {
                    return Err(MemoryError::GenerationUnavailable(format!(
                        "{}: {}",
                        strategy.name(),
                        reason
                    )));
                }
            }
        }

        if unsupported.is_empty() {
            return Err(MemoryError::GenerationUnavailable(
                "no generation strategies configured".into(),
            ));
        }

        Err(MemoryError::GenerationUnavailable(format!(
            "no supported call shape ({})",
            unsupported.join("; ")
        )))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Strategy that replays a fixed outcome and counts its calls
    pub(crate) struct ScriptedStrategy {
        name: String,
        outcome: std::result::Result<String, StrategyError>,
        pub(crate) calls: Arc<AtomicUsize>,
    }

    impl ScriptedStrategy {
        pub(crate) fn ok(name: &str, text: &str) -> Self {
            Self::with(name, Ok(text.to_string()))
        }

        pub(crate) fn unsupported(name: &str) -> Self {
            Self::with(name, Err(StrategyError::UnsupportedShape("404".into())))
        }

        pub(crate) fn failed(name: &str) -> Self {
            Self::with(name, Err(StrategyError::Failed("quota exceeded".into())))
        }

        fn with(name: &str, outcome: std::result::Result<String, StrategyError>) -> Self {
            Self {
                name: name.to_string(),
                outcome,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl GenerationStrategy for ScriptedStrategy {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(&self, _prompt: &str) -> std::result::Result<String, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let first = ScriptedStrategy::unsupported("model-object");
        let second = ScriptedStrategy::ok("module-level", "blue");
        let third = ScriptedStrategy::ok("alternate-client", "red");
        let counters = [
            first.calls.clone(),
            second.calls.clone(),
            third.calls.clone(),
        ];

        let invoker =
            GenerationInvoker::new(vec![Box::new(first), Box::new(second), Box::new(third)]);
        let generation = invoker.try_generate("prompt").await.unwrap();

        assert_eq!(generation.text, "blue");
        assert_eq!(generation.strategy, "module-level");
        let calls: Vec<usize> = counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        assert_eq!(calls, vec![1, 1, 0]);
    }

    #[tokio::test]
    async fn test_all_unsupported_returns_placeholder() {
        let invoker = GenerationInvoker::new(vec![
            Box::new(ScriptedStrategy::unsupported("a")),
            Box::new(ScriptedStrategy::unsupported("b")),
            Box::new(ScriptedStrategy::unsupported("c")),
        ]);

        assert_eq!(invoker.generate("prompt").await, PLACEHOLDER_RESPONSE);
        assert!(matches!(
            invoker.try_generate("prompt").await,
            Err(MemoryError::GenerationUnavailable(ref m)) if m.contains("a: ") && m.contains("c: ")
        ));
    }

    #[tokio::test]
    async fn test_failure_stops_iteration() {
        let failing = ScriptedStrategy::failed("a");
        let next = ScriptedStrategy::ok("b", "never");
        let next_calls = next.calls.clone();

        let invoker = GenerationInvoker::new(vec![Box::new(failing), Box::new(next)])
            .with_placeholder("offline");

        assert_eq!(invoker.generate("prompt").await, "offline");
        assert_eq!(next_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_strategies() {
        let invoker = GenerationInvoker::new(Vec::new());
        assert!(invoker.strategy_names().is_empty());
        assert_eq!(invoker.generate("prompt").await, PLACEHOLDER_RESPONSE);
    }
}
