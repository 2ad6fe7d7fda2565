//! Guardrail pipeline
//!
//! An ordered chain of stages wrapped around an answering core:
//! - `ContentFilterStage`: deterministic banned-keyword block (before)
//! - `PiiRedactionStage`: pattern-based redaction (before and after)
//! - `ModelSafetyStage`: model verdict on the final answer (after)
//!
//! Cheap deterministic checks run first so blocked input never costs a model
//! call; the model-based check runs last.

mod content_filter;
mod pii;
mod pipeline;
mod safety;

pub use content_filter::ContentFilterStage;
pub use pii::{PiiCategory, PiiRedactionStage};
pub use pipeline::GuardrailPipeline;
pub use safety::{ModelSafetyStage, SafetyVerdict};

use crate::errors::Result;
use crate::models::{AnswerEnvelope, Conversation};
use async_trait::async_trait;

/// Outcome of a single guardrail hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Let the next stage run
    Continue,
    /// Stop the phase and answer with this content instead
    Terminate(String),
}

/// Pipeline phase a hook runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Before,
    After,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::After => "after",
        }
    }
}

/// A pluggable check or transform applied around the answering core.
///
/// Both hooks default to `Continue`, so a stage only implements the phases
/// it takes part in.
#[async_trait]
pub trait GuardrailStage: Send + Sync {
    /// Stable name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Inspect or rewrite the inbound conversation before the core runs
    async fn before_core(&self, _conversation: &mut Conversation) -> Verdict {
        Verdict::Continue
    }

    /// Inspect or rewrite the answer. `conversation` already ends with the
    /// assistant message holding the core's answer.
    async fn after_core(&self, _conversation: &Conversation, _answer: &mut AnswerEnvelope) -> Verdict {
        Verdict::Continue
    }
}

/// The answering step wrapped by the pipeline
#[async_trait]
pub trait AnswerCore: Send + Sync {
    async fn answer(&self, conversation: &Conversation) -> Result<AnswerEnvelope>;
}
