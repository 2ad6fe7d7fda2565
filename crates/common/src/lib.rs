//! sqlrag Common Library
//!
//! The answering core shared by the sqlrag services:
//! - Guardrail pipeline and its stages
//! - Hybrid query router (documents or live SQL)
//! - Capability abstractions for the model, embeddings, document index
//!   and structured store
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod guardrails;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod resilience;
pub mod router;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{RawResult, StructuredStore};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use guardrails::{AnswerCore, GuardrailPipeline, GuardrailStage, Verdict};
pub use index::DocumentIndex;
pub use llm::TextGenerator;
pub use models::{Answer, AnswerEnvelope, Conversation, Message, Role};
pub use router::QueryRouter;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
