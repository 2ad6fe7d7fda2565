//! Document index abstraction
//!
//! The index holds the documentation chunks written by the ingestion job.
//! This crate only reads from it:
//! - Chroma over HTTP (the production index)
//! - An in-memory cosine index for development and tests

mod chroma;
mod memory;

pub use chroma::ChromaIndex;
pub use memory::InMemoryIndex;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Separator placed between retrieved documents in prompt context
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// A document returned by a similarity query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDocument {
    /// Document text
    pub text: String,

    /// Distance to the query vector (smaller is closer)
    pub distance: f32,
}

/// Common trait for document indexes
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Return up to `k` documents ordered by increasing distance.
    /// An empty result is valid and not an error.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedDocument>>;

    /// Check that the index is reachable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Join retrieved texts into the document context used by every prompt
pub fn document_context(documents: &[RetrievedDocument]) -> String {
    documents
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Create a document index based on configuration.
/// The in-memory index starts empty.
pub fn create_index(config: &AppConfig) -> Result<Arc<dyn DocumentIndex>> {
    match config.index.provider.as_str() {
        "chroma" => Ok(Arc::new(ChromaIndex::new(
            config.index_base_url(),
            config.index.tenant.clone(),
            config.index.database.clone(),
            config.index.collection.clone(),
        )?)),
        "memory" => Ok(Arc::new(InMemoryIndex::default())),
        other => Err(AppError::Configuration {
            message: format!("Unknown index provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_context_join() {
        let docs = vec![
            RetrievedDocument { text: "customers(id, name)".into(), distance: 0.1 },
            RetrievedDocument { text: "products(id, price)".into(), distance: 0.2 },
        ];
        assert_eq!(
            document_context(&docs),
            "customers(id, name)\n\n---\n\nproducts(id, price)"
        );
        assert_eq!(document_context(&[]), "");
    }
}
