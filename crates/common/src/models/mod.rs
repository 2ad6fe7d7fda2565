//! Request-scoped data model
//!
//! Everything here is created fresh for a request and dropped once the
//! response is sent.

mod answer;
mod conversation;

pub use answer::{Answer, AnswerEnvelope, Row};
pub use conversation::{Conversation, Message, Role};
