//! Model-based safety verdict on the final answer

use super::{GuardrailStage, Verdict};
use crate::llm::TextGenerator;
use crate::metrics;
use crate::models::{AnswerEnvelope, Conversation};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Parsed reply of the safety classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyVerdict {
    Safe,
    Unsafe,
    Ambiguous,
}

impl SafetyVerdict {
    /// Case-insensitive. Any mention of `UNSAFE` is unsafe; only a bare
    /// `SAFE` (quotes and punctuation aside) is safe.
    pub fn parse(reply: &str) -> Self {
        let reply = reply.to_uppercase();
        let word = reply
            .trim()
            .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());

        if reply.contains("UNSAFE") {
            SafetyVerdict::Unsafe
        } else if word == "SAFE" {
            SafetyVerdict::Safe
        } else {
            SafetyVerdict::Ambiguous
        }
    }
}

/// Asks the model whether the answer is safe to return.
///
/// Fails closed: an unsafe verdict, an ambiguous reply, a timeout or an
/// unavailable model all replace the answer with the refusal.
pub struct ModelSafetyStage {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
    refusal: String,
}

impl ModelSafetyStage {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration, refusal: impl Into<String>) -> Self {
        Self {
            generator,
            timeout,
            refusal: refusal.into(),
        }
    }

    fn build_prompt(content: &str) -> String {
        format!(
            "You are a content safety classifier. Decide whether the following \
             assistant response is safe to show to a user. It is unsafe if it \
             contains harmful, abusive, illegal or sexual content, or instructions \
             for attacking systems.\n\n\
             Response:\n{}\n\n\
             Reply with only 'SAFE' or 'UNSAFE'.",
            content
        )
    }

    /// Returns the failure reason when the answer must be refused
    async fn check(&self, content: &str) -> Option<&'static str> {
        let prompt = Self::build_prompt(content);

        match self.generator.generate(&prompt, self.timeout).await {
            Ok(reply) => match SafetyVerdict::parse(&reply) {
                SafetyVerdict::Safe => None,
                SafetyVerdict::Unsafe => {
                    tracing::info!("Safety check flagged the answer");
                    Some("unsafe")
                }
                SafetyVerdict::Ambiguous => {
                    tracing::warn!(reply = %reply.trim(), "Ambiguous safety verdict, refusing");
                    metrics::record_safety_failure("ambiguous");
                    Some("ambiguous")
                }
            },
            Err(e) => {
                let reason = if e.is_timeout() { "timeout" } else { "unavailable" };
                tracing::warn!(error = %e, reason = reason, "Safety check failed, refusing");
                metrics::record_safety_failure(reason);
                Some(reason)
            }
        }
    }
}

#[async_trait]
impl GuardrailStage for ModelSafetyStage {
    fn name(&self) -> &'static str {
        "model_safety"
    }

    async fn after_core(&self, _conversation: &Conversation, answer: &mut AnswerEnvelope) -> Verdict {
        match self.check(&answer.answer.render()).await {
            None => Verdict::Continue,
            Some(_) => {
                *answer = AnswerEnvelope::text(self.refusal.clone());
                Verdict::Terminate(self.refusal.clone())
            }
        }
    }
}
