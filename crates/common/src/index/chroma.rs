//! Chroma HTTP client

use super::{DocumentIndex, RetrievedDocument};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

/// Read-only client for one Chroma collection
pub struct ChromaIndex {
    client: reqwest::Client,
    base_url: String,
    tenant: String,
    database: String,
    collection: String,

    /// Collection id, resolved on first successful lookup
    collection_id: OnceCell<String>,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query_embeddings: Vec<&'a [f32]>,
    n_results: usize,
    include: [&'static str; 2],
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

fn index_error(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::IndexError {
        message: format!("{}: {}", context, e),
    }
}

impl ChromaIndex {
    pub fn new(base_url: String, tenant: String, database: String, collection: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            tenant,
            database,
            collection,
            collection_id: OnceCell::new(),
        })
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.base_url, self.tenant, self.database
        )
    }

    /// Look up the collection id. `None` means the collection does not
    /// exist yet, i.e. nothing has been ingested.
    async fn lookup_collection(&self) -> Result<Option<String>> {
        if let Some(id) = self.collection_id.get() {
            return Ok(Some(id.clone()));
        }

        let url = format!("{}/{}", self.collections_url(), self.collection);
        let response = self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| index_error("Collection lookup failed", e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Chroma reports a missing collection as a 400 on some versions
            if body.contains("does not exist") {
                return Ok(None);
            }
            return Err(index_error("Collection lookup error", format!("{} {}", status, body)));
        }

        let collection: CollectionResponse = response
            .json()
            .await
            .map_err(|e| index_error("Failed to parse collection", e))?;

        let id = self.collection_id.get_or_init(|| async { collection.id }).await;
        Ok(Some(id.clone()))
    }
}

/// Flatten the first row of Chroma's nested result lists
fn flatten(response: QueryResponse) -> Vec<RetrievedDocument> {
    let documents = response
        .documents
        .and_then(|rows| rows.into_iter().next())
        .unwrap_or_default();
    let distances = response
        .distances
        .and_then(|rows| rows.into_iter().next())
        .unwrap_or_default();

    documents
        .into_iter()
        .enumerate()
        .filter_map(|(i, text)| {
            text.map(|text| RetrievedDocument {
                text,
                distance: distances.get(i).copied().flatten().unwrap_or(f32::MAX),
            })
        })
        .collect()
}

#[async_trait]
impl DocumentIndex for ChromaIndex {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedDocument>> {
        let Some(collection_id) = self.lookup_collection().await? else {
            tracing::warn!(collection = %self.collection, "Collection does not exist");
            return Ok(Vec::new());
        };

        let url = format!("{}/{}/query", self.collections_url(), collection_id);
        let request = QueryRequest {
            query_embeddings: vec![vector],
            n_results: k,
            include: ["documents", "distances"],
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| index_error("Query failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(index_error("Query error", format!("{} {}", status, body)));
        }

        let result: QueryResponse = response
            .json()
            .await
            .map_err(|e| index_error("Failed to parse query response", e))?;

        Ok(flatten(result))
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/v2/heartbeat", self.base_url);
        let response = self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| index_error("Heartbeat failed", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(index_error("Heartbeat failed", response.status()))
        }
    }
}
