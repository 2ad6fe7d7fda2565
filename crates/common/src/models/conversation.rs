//! Conversation messages

use serde::{Deserialize, Serialize};

/// Author of a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single conversation turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Ordered, append-only sequence of messages.
///
/// Guardrails only look at the first user message and the last assistant
/// message. Messages are never removed or reordered; stages may rewrite the
/// content of those two messages in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a conversation from a single question
    pub fn from_question(question: impl Into<String>) -> Self {
        Self { messages: vec![Message::user(question)] }
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The first message, if it was written by the user
    pub fn first_user_message(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.role == Role::User)
    }

    pub fn first_user_message_mut(&mut self) -> Option<&mut Message> {
        self.messages.first_mut().filter(|m| m.role == Role::User)
    }

    /// The last message, if it was written by the assistant
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.last().filter(|m| m.role == Role::Assistant)
    }

    pub fn last_assistant_message_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut().filter(|m| m.role == Role::Assistant)
    }

    /// Content of the first user message, the question being answered
    pub fn question(&self) -> Option<&str> {
        self.first_user_message().map(|m| m.content.as_str())
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
