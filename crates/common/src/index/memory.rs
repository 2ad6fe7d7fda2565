//! In-memory cosine index

use super::{DocumentIndex, RetrievedDocument};
use crate::embeddings::Embedder;
use crate::errors::Result;
use async_trait::async_trait;

/// Brute-force cosine distance index over a fixed document set
#[derive(Default)]
pub struct InMemoryIndex {
    documents: Vec<(String, Vec<f32>)>,
}

impl InMemoryIndex {
    pub fn new(documents: Vec<(String, Vec<f32>)>) -> Self {
        Self { documents }
    }

    /// Embed `texts` and index them
    pub async fn from_texts(embedder: &dyn Embedder, texts: &[String]) -> Result<Self> {
        let vectors = embedder.embed_batch(texts).await?;
        Ok(Self::new(texts.iter().cloned().zip(vectors).collect()))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// 1 - cosine similarity; zero vectors are maximally distant
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl DocumentIndex for InMemoryIndex {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedDocument>> {
        let mut scored: Vec<RetrievedDocument> = self
            .documents
            .iter()
            .map(|(text, embedding)| RetrievedDocument {
                text: text.clone(),
                distance: cosine_distance(vector, embedding),
            })
            .collect();

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbedder;

    #[tokio::test]
    async fn test_nearest_first() {
        let embedder = MockEmbedder::new(256);
        let texts = vec![
            "The customers table stores name email and country".to_string(),
            "The products table stores name and price".to_string(),
            "Orders reference customers by customer_id".to_string(),
        ];
        let index = InMemoryIndex::from_texts(&embedder, &texts).await.unwrap();

        let query = embedder.embed("price of products").await.unwrap();
        let results = index.query(&query, 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, texts[1]);
        assert!(results[0].distance <= results[1].distance);
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let index = InMemoryIndex::default();
        assert!(index.query(&[1.0, 0.0], 4).await.unwrap().is_empty());
    }

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
