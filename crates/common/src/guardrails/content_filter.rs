//! Deterministic banned-keyword filter

use super::{GuardrailStage, Verdict};
use crate::models::Conversation;
use async_trait::async_trait;

/// Blocks a request whose first user message contains a banned substring.
///
/// Matching is case-insensitive substring matching, not word matching:
/// "hack" also blocks "hackathon".
pub struct ContentFilterStage {
    banned_keywords: Vec<String>,
    refusal: String,
}

impl ContentFilterStage {
    pub fn new(banned_keywords: &[String], refusal: impl Into<String>) -> Self {
        let banned_keywords = banned_keywords
            .iter()
            .map(|kw| kw.trim().to_lowercase())
            .filter(|kw| !kw.is_empty())
            .collect();

        Self {
            banned_keywords,
            refusal: refusal.into(),
        }
    }

    /// First banned keyword found in `text`
    pub fn find_banned(&self, text: &str) -> Option<&str> {
        let content = text.to_lowercase();
        self.banned_keywords
            .iter()
            .find(|kw| content.contains(kw.as_str()))
            .map(String::as_str)
    }
}

#[async_trait]
impl GuardrailStage for ContentFilterStage {
    fn name(&self) -> &'static str {
        "content_filter"
    }

    async fn before_core(&self, conversation: &mut Conversation) -> Verdict {
        let Some(message) = conversation.first_user_message() else {
            return Verdict::Continue;
        };

        match self.find_banned(&message.content) {
            Some(keyword) => {
                tracing::info!(keyword = keyword, "Banned keyword in request");
                Verdict::Terminate(self.refusal.clone())
            }
            None => Verdict::Continue,
        }
    }
}
