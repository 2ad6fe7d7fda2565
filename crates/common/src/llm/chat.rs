//! Direct chat answering core

use super::TextGenerator;
use crate::errors::{AppError, Result};
use crate::guardrails::AnswerCore;
use crate::models::{AnswerEnvelope, Conversation, Role};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Answers a conversation straight from the model, with no retrieval.
/// This is the core behind the guardrailed chat endpoint.
pub struct ChatCore {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl ChatCore {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    fn build_prompt(conversation: &Conversation) -> String {
        let mut prompt = String::from("You are a helpful assistant. Continue the conversation.\n\n");
        for message in conversation.messages() {
            let speaker = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, message.content));
        }
        prompt.push_str("Assistant:");
        prompt
    }
}

#[async_trait]
impl AnswerCore for ChatCore {
    async fn answer(&self, conversation: &Conversation) -> Result<AnswerEnvelope> {
        if conversation.is_empty() {
            return Err(AppError::Validation {
                message: "conversation has no messages".to_string(),
                field: Some("messages".to_string()),
            });
        }

        let prompt = Self::build_prompt(conversation);
        let reply = self.generator.generate(&prompt, self.timeout).await?;
        Ok(AnswerEnvelope::text(reply.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockGenerator;
    use crate::models::{Answer, Message};

    #[tokio::test]
    async fn test_transcript_prompt() {
        let generator = Arc::new(MockGenerator::new(" 4 \n"));
        let core = ChatCore::new(generator.clone(), Duration::from_secs(1));

        let conversation = Conversation::from_messages(vec![
            Message::user("What is 2+2?"),
        ]);
        let envelope = core.answer(&conversation).await.unwrap();

        assert_eq!(envelope.answer, Answer::Text("4".to_string()));
        assert!(envelope.sources.is_empty());
        assert!(generator.prompts()[0].ends_with("User: What is 2+2?\nAssistant:"));
    }

    #[tokio::test]
    async fn test_empty_conversation_is_rejected() {
        let core = ChatCore::new(Arc::new(MockGenerator::new("x")), Duration::from_secs(1));
        let err = core.answer(&Conversation::new()).await.unwrap_err();
        assert!(err.is_client_error());
    }
}
