//! Ordered, short-circuiting stage chain

use super::{
    AnswerCore, ContentFilterStage, GuardrailStage, ModelSafetyStage, Phase, PiiRedactionStage,
    Verdict,
};
use crate::config::GuardrailConfig;
use crate::errors::Result;
use crate::llm::TextGenerator;
use crate::metrics;
use crate::models::{AnswerEnvelope, Conversation, Message};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Guardrail stages built once at start-up and shared by every request.
///
/// The pipeline holds no per-request state; each call to [`run`] works on
/// the caller's conversation only.
///
/// [`run`]: GuardrailPipeline::run
pub struct GuardrailPipeline {
    stages: Vec<Box<dyn GuardrailStage>>,
}

impl GuardrailPipeline {
    pub fn new(stages: Vec<Box<dyn GuardrailStage>>) -> Self {
        Self { stages }
    }

    /// Content filter, then PII redaction, then the model safety check.
    /// Stages with nothing configured are left out.
    pub fn from_config(
        config: &GuardrailConfig,
        generator: Arc<dyn TextGenerator>,
        safety_timeout: Duration,
    ) -> Result<Self> {
        let mut stages: Vec<Box<dyn GuardrailStage>> = Vec::new();

        if !config.banned_keywords.is_empty() {
            stages.push(Box::new(ContentFilterStage::new(
                &config.banned_keywords,
                config.content_refusal.clone(),
            )));
        }

        if !config.pii_categories.is_empty() {
            stages.push(Box::new(PiiRedactionStage::from_names(&config.pii_categories)?));
        }

        if config.safety_check_enabled {
            stages.push(Box::new(ModelSafetyStage::new(
                generator,
                safety_timeout,
                config.safety_refusal.clone(),
            )));
        }

        let pipeline = Self::new(stages);
        info!(stages = ?pipeline.stage_names(), "Guardrail pipeline configured");
        Ok(pipeline)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run the before hooks, the core, then the after hooks.
    ///
    /// A before-phase termination answers with the refusal and the core
    /// never runs. In the after phase the first termination replaces the
    /// answer and the remaining stages are skipped. Either way the
    /// conversation ends with an assistant message holding the final answer.
    /// Errors from the core are returned as is.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        core: &dyn AnswerCore,
    ) -> Result<AnswerEnvelope> {
        for stage in &self.stages {
            if let Verdict::Terminate(content) = stage.before_core(conversation).await {
                self.record_termination(stage.name(), Phase::Before);
                conversation.push(Message::assistant(content.clone()));
                return Ok(AnswerEnvelope::text(content));
            }
        }

        let mut answer = core.answer(conversation).await?;
        conversation.push(Message::assistant(answer.answer.render()));

        for stage in &self.stages {
            if let Verdict::Terminate(content) = stage.after_core(conversation, &mut answer).await {
                self.record_termination(stage.name(), Phase::After);
                answer = AnswerEnvelope::text(content);
                break;
            }
        }

        if let Some(message) = conversation.last_assistant_message_mut() {
            message.content = answer.answer.render();
        }

        debug!("Guardrail pipeline completed");
        Ok(answer)
    }

    fn record_termination(&self, stage: &str, phase: Phase) {
        info!(stage = stage, phase = phase.as_str(), "Guardrail terminated request");
        metrics::record_guardrail_termination(stage, phase.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::llm::MockGenerator;
    use crate::models::{Answer, Role};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Core that counts calls and answers with a fixed envelope
    struct SpyCore {
        answer: AnswerEnvelope,
        calls: AtomicUsize,
    }

    impl SpyCore {
        fn new(answer: AnswerEnvelope) -> Self {
            Self { answer, calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnswerCore for SpyCore {
        async fn answer(&self, _conversation: &Conversation) -> Result<AnswerEnvelope> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    /// After-only stage that always replaces the answer
    struct Replace(&'static str, Arc<AtomicUsize>);

    #[async_trait]
    impl GuardrailStage for Replace {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn after_core(&self, _c: &Conversation, _a: &mut AnswerEnvelope) -> Verdict {
            self.1.fetch_add(1, Ordering::SeqCst);
            Verdict::Terminate(format!("replaced by {}", self.0))
        }
    }

    fn config() -> GuardrailConfig {
        GuardrailConfig {
            banned_keywords: vec!["hack".into(), "exploit".into()],
            pii_categories: vec!["email".into(), "ip".into()],
            safety_check_enabled: true,
            ..GuardrailConfig::default()
        }
    }

    fn pipeline(safety_reply: &str) -> GuardrailPipeline {
        GuardrailPipeline::from_config(
            &config(),
            Arc::new(MockGenerator::new(safety_reply)),
            Duration::from_millis(100),
        )
        .unwrap()
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(
            pipeline("SAFE").stage_names(),
            vec!["content_filter", "pii_redaction", "model_safety"]
        );
    }

    #[tokio::test]
    async fn test_banned_keyword_never_reaches_core() {
        let core = SpyCore::new(AnswerEnvelope::text("should not be seen"));
        let mut conversation = Conversation::from_question("How do I HaCk the orders table?");

        let answer = pipeline("SAFE").run(&mut conversation, &core).await.unwrap();

        assert_eq!(core.calls(), 0);
        assert_eq!(answer, AnswerEnvelope::text(config().content_refusal));
        let last = conversation.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, config().content_refusal);
    }

    #[tokio::test]
    async fn test_unsafe_answer_is_replaced_by_refusal() {
        let core = SpyCore::new(AnswerEnvelope::new(
            Answer::Text("something harmful".into()),
            vec!["doc".into()],
        ));
        let mut conversation = Conversation::from_question("What is 2+2?");

        let answer = pipeline("UNSAFE").run(&mut conversation, &core).await.unwrap();

        assert_eq!(core.calls(), 1);
        assert_eq!(answer, AnswerEnvelope::text(config().safety_refusal));
        assert_eq!(
            conversation.last_assistant_message().unwrap().content,
            config().safety_refusal
        );
    }

    #[tokio::test]
    async fn test_pii_redacted_both_ways() {
        let core = SpyCore::new(AnswerEnvelope::text("Write to support@shop.example.com"));
        let mut conversation = Conversation::from_question("I am ada@example.com on 10.0.0.1");

        let answer = pipeline("SAFE").run(&mut conversation, &core).await.unwrap();

        assert_eq!(answer.answer.as_text(), Some("Write to [REDACTED_EMAIL]"));
        assert_eq!(
            conversation.question(),
            Some("I am [REDACTED_EMAIL] on [REDACTED_IP]")
        );
        assert_eq!(
            conversation.last_assistant_message().unwrap().content,
            "Write to [REDACTED_EMAIL]"
        );
    }

    #[tokio::test]
    async fn test_first_after_termination_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let pipeline = GuardrailPipeline::new(vec![
            Box::new(Replace("first", first.clone())),
            Box::new(Replace("second", second.clone())),
        ]);
        let core = SpyCore::new(AnswerEnvelope::text("original"));
        let mut conversation = Conversation::from_question("hi");

        let answer = pipeline.run(&mut conversation, &core).await.unwrap();

        assert_eq!(answer.answer.as_text(), Some("replaced by first"));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_core_error_propagates() {
        struct Failing;

        #[async_trait]
        impl AnswerCore for Failing {
            async fn answer(&self, _c: &Conversation) -> Result<AnswerEnvelope> {
                Err(AppError::NoDocumentsIndexed)
            }
        }

        let mut conversation = Conversation::from_question("What is 2+2?");
        let err = pipeline("SAFE").run(&mut conversation, &Failing).await.unwrap_err();
        assert!(matches!(err, AppError::NoDocumentsIndexed));
    }

    #[tokio::test]
    async fn test_empty_pipeline_passes_through() {
        let core = SpyCore::new(AnswerEnvelope::text("4"));
        let mut conversation = Conversation::from_question("What is 2+2?");
        let answer = GuardrailPipeline::new(Vec::new())
            .run(&mut conversation, &core)
            .await
            .unwrap();
        assert_eq!(answer, AnswerEnvelope::text("4"));
        assert_eq!(conversation.len(), 2);
    }
}
