//! Hybrid query router
//!
//! Answers a question either from the documentation in the document index
//! or by generating and running a read-only query on the structured store.
//!
//! States, in order, with no way back:
//! 1. Retrieve: embed the question and fetch the top-k documents
//! 2. Classify: ask the model for `sql` or `rag`
//! 3. StructuredQuery: generate, validate, execute, normalize
//! 4. DocumentAnswer: answer from the retrieved documents only

mod classifier;
mod normalizer;
pub mod prompts;
mod query;

pub use classifier::ClassifierVerdict;
pub use normalizer::{normalize, normalize_key, AGGREGATE_WRAPPERS};
pub use query::{check_read_only, is_read_only, strip_fences, GeneratedQuery, QueryRejection, READ_ONLY_KEYWORD};

use crate::config::AppConfig;
use crate::db::{RawResult, StructuredStore};
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result};
use crate::guardrails::AnswerCore;
use crate::index::{document_context, DocumentIndex, RetrievedDocument};
use crate::llm::TextGenerator;
use crate::metrics;
use crate::models::{Answer, AnswerEnvelope, Conversation, Row};
use crate::resilience::with_deadline;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Deadlines for each external call the router makes
#[derive(Debug, Clone, Copy)]
pub struct RouterTimeouts {
    pub generation: Duration,
    pub embedding: Duration,
    pub index: Duration,
    pub query: Duration,
}

impl RouterTimeouts {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            generation: Duration::from_secs(config.llm.timeout_secs),
            embedding: Duration::from_secs(config.embedding.timeout_secs),
            index: Duration::from_secs(config.index.timeout_secs),
            query: Duration::from_secs(config.database.query_timeout_secs),
        }
    }
}

impl Default for RouterTimeouts {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// The answering core of the hybrid assistant.
///
/// Holds only shared handles and immutable settings, so one router serves
/// every request.
pub struct QueryRouter {
    generator: Arc<dyn TextGenerator>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn DocumentIndex>,
    store: Arc<dyn StructuredStore>,
    timeouts: RouterTimeouts,
    default_k: usize,
}

impl QueryRouter {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn DocumentIndex>,
        store: Arc<dyn StructuredStore>,
        timeouts: RouterTimeouts,
        default_k: usize,
    ) -> Self {
        Self {
            generator,
            embedder,
            index,
            store,
            timeouts,
            default_k: default_k.max(1),
        }
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Bind a per-request `k` for the pipeline to call
    pub fn with_k(&self, k: usize) -> RoutedRequest<'_> {
        RoutedRequest { router: self, k: k.max(1) }
    }

    /// Answer `question` using the `k` closest documents.
    ///
    /// Fails with `NoDocumentsIndexed` when retrieval finds nothing, before
    /// any model call. Rejected and failed queries are answers, not errors.
    #[instrument(skip(self, question))]
    pub async fn route(&self, question: &str, k: usize) -> Result<AnswerEnvelope> {
        let documents = self.retrieve(question, k).await?;
        let context = document_context(&documents);

        let verdict = self.classify(question, &context).await?;
        info!(route = verdict.as_str(), documents = documents.len(), "Question classified");
        metrics::record_route(verdict.as_str());

        match verdict {
            ClassifierVerdict::StructuredQuery => self.answer_structured(question, &context).await,
            ClassifierVerdict::DocumentAnswer => {
                self.answer_from_documents(question, &context, documents).await
            }
        }
    }

    async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        let vector = with_deadline("embedding", self.timeouts.embedding, self.embedder.embed(question)).await?;
        let documents = with_deadline("document_index", self.timeouts.index, self.index.query(&vector, k)).await?;

        if documents.is_empty() {
            warn!("Document index returned no documents");
            return Err(AppError::NoDocumentsIndexed);
        }

        debug!(documents = documents.len(), "Documents retrieved");
        Ok(documents)
    }

    async fn classify(&self, question: &str, context: &str) -> Result<ClassifierVerdict> {
        let prompt = prompts::classification(question, context);
        let output = self.generator.generate(&prompt, self.timeouts.generation).await?;
        Ok(ClassifierVerdict::parse_or_fallback(&output))
    }

    async fn answer_structured(&self, question: &str, context: &str) -> Result<AnswerEnvelope> {
        let prompt = prompts::query_generation(question, context);
        let output = self.generator.generate(&prompt, self.timeouts.generation).await?;
        let query = GeneratedQuery::from_model_output(&output);

        if let Some(rejection) = query.rejection {
            warn!(query = %query.text, reason = rejection.as_str(), "Rejected generated query");
            metrics::record_query_rejected();
            let message = AppError::QueryRejected {
                query: query.text.clone(),
                reason: rejection.as_str(),
            }
            .to_string();
            return Ok(AnswerEnvelope::new(Answer::Text(message), vec![query.text]));
        }

        let outcome = with_deadline(
            "structured_store",
            self.timeouts.query,
            self.store.execute(&query.text, &[]),
        )
        .await;

        let answer = match outcome {
            Ok(raw) => shape_result(raw),
            Err(e) => {
                warn!(query = %query.text, error = %e, "Generated query failed");
                metrics::record_query_failure();
                Answer::Text(execution_error_message(e))
            }
        };

        Ok(AnswerEnvelope::new(answer, vec![query.text]))
    }

    async fn answer_from_documents(
        &self,
        question: &str,
        context: &str,
        documents: Vec<RetrievedDocument>,
    ) -> Result<AnswerEnvelope> {
        let prompt = prompts::document_answer(question, context);
        let output = self.generator.generate(&prompt, self.timeouts.generation).await?;
        let sources = documents.into_iter().map(|d| d.text).collect();

        Ok(AnswerEnvelope::new(Answer::Text(output.trim().to_string()), sources))
    }

    async fn answer_conversation(&self, conversation: &Conversation, k: usize) -> Result<AnswerEnvelope> {
        let question = conversation.question().ok_or_else(|| AppError::Validation {
            message: "conversation must start with a user question".to_string(),
            field: Some("query".to_string()),
        })?;
        self.route(question, k).await
    }
}

/// Many rows pass through unchanged, a single row is normalized, no rows
/// is an empty list. Write statements report their affected count.
fn shape_result(raw: RawResult) -> Answer {
    match raw {
        RawResult::Rows(mut rows) => match rows.len() {
            0 => Answer::Rows(Vec::new()),
            1 => Answer::Row(normalize(&rows.remove(0))),
            _ => Answer::Rows(rows),
        },
        RawResult::Affected(count) => {
            let mut row = Row::new();
            row.insert("rows_affected".to_string(), Value::from(count));
            Answer::Row(row)
        }
    }
}

fn execution_error_message(e: AppError) -> String {
    match e {
        failed @ AppError::QueryExecutionFailed { .. } => failed.to_string(),
        other => format!("SQL error: {}", other),
    }
}

#[async_trait]
impl AnswerCore for QueryRouter {
    async fn answer(&self, conversation: &Conversation) -> Result<AnswerEnvelope> {
        self.answer_conversation(conversation, self.default_k).await
    }
}

/// A router call with a per-request `k`
pub struct RoutedRequest<'a> {
    router: &'a QueryRouter,
    k: usize,
}

#[async_trait]
impl<'a> AnswerCore for RoutedRequest<'a> {
    async fn answer(&self, conversation: &Conversation) -> Result<AnswerEnvelope> {
        self.router.answer_conversation(conversation, self.k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MockStore;
    use crate::embeddings::MockEmbedder;
    use crate::index::InMemoryIndex;
    use crate::llm::{MockGenerator, MockReply};
    use serde_json::json;

    const CLASSIFY: &str = "sql or rag";
    const GENERATE: &str = "SQL generator";
    const DOCUMENT: &str = "Use only the documentation";

    fn rows(value: Value) -> Vec<Row> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect()
    }

    async fn schema_index(embedder: &MockEmbedder) -> Arc<InMemoryIndex> {
        let texts = vec![
            "Table products: id, name, price".to_string(),
            "Table customers: id, name, email, country".to_string(),
            "Table orders: id, customer_id, product_id, quantity".to_string(),
        ];
        Arc::new(InMemoryIndex::from_texts(embedder, &texts).await.unwrap())
    }

    async fn router(generator: Arc<MockGenerator>, store: Arc<MockStore>) -> QueryRouter {
        let embedder = MockEmbedder::new(128);
        let index = schema_index(&embedder).await;
        QueryRouter::new(generator, Arc::new(embedder), index, store, RouterTimeouts::default(), 2)
    }

    fn sql_generator(query: &str) -> Arc<MockGenerator> {
        Arc::new(MockGenerator::new("unexpected").on(CLASSIFY, "sql").on(GENERATE, query))
    }

    #[tokio::test]
    async fn test_no_documents_stops_before_any_model_call() {
        let generator = Arc::new(MockGenerator::new("sql"));
        let store = Arc::new(MockStore::returning(RawResult::Rows(vec![])));
        let router = QueryRouter::new(
            generator.clone(),
            Arc::new(MockEmbedder::new(16)),
            Arc::new(InMemoryIndex::default()),
            store.clone(),
            RouterTimeouts::default(),
            4,
        );

        let err = router.route("What is the priciest product?", 4).await.unwrap_err();

        assert!(matches!(err, AppError::NoDocumentsIndexed));
        assert!(err.is_client_error());
        assert_eq!(generator.calls(), 0);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_select_is_rejected_without_execution() {
        let store = Arc::new(MockStore::returning(RawResult::Affected(1)));
        let router = router(sql_generator("DROP TABLE customers"), store.clone()).await;

        let envelope = router.route("Remove all customers", 2).await.unwrap();

        assert_eq!(store.calls(), 0);
        assert_eq!(
            envelope,
            AnswerEnvelope::new(
                Answer::Text("Rejected unsafe SQL (not SELECT): DROP TABLE customers".into()),
                vec!["DROP TABLE customers".into()],
            )
        );
    }

    #[tokio::test]
    async fn test_stacked_statement_is_rejected() {
        let store = Arc::new(MockStore::returning(RawResult::Rows(vec![])));
        let router = router(sql_generator("SELECT 1; DELETE FROM orders"), store.clone()).await;

        let envelope = router.route("How many orders?", 2).await.unwrap();
        assert_eq!(store.calls(), 0);
        assert_eq!(
            envelope.answer.as_text(),
            Some("Rejected unsafe SQL (multiple statements): SELECT 1; DELETE FROM orders")
        );
    }

    #[tokio::test]
    async fn test_single_aggregate_row_is_normalized() {
        let query = "SELECT MAX(price) AS p FROM products";
        let store = Arc::new(MockStore::returning(RawResult::Rows(rows(json!([{ "max(price)": 999 }])))));
        let generator = sql_generator(&format!("```sql\n{}\n```", query));
        let router = router(generator, store.clone()).await;

        let envelope = router.route("What is the highest product price?", 2).await.unwrap();

        assert_eq!(store.executed(), vec![query.to_string()]);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({ "answer": { "price": 999 }, "sources": [query] })
        );
    }

    #[tokio::test]
    async fn test_many_rows_returned_unmodified() {
        let result = rows(json!([
            { "Name": "Widget", "MAX(price)": 10 },
            { "Name": "Gadget", "MAX(price)": 20 },
            { "Name": "Deluxe Widget", "MAX(price)": 999 },
        ]));
        let store = Arc::new(MockStore::returning(RawResult::Rows(result.clone())));
        let router = router(sql_generator("SELECT name, MAX(price) FROM products GROUP BY name"), store).await;

        let envelope = router.route("Max price per product?", 2).await.unwrap();

        assert_eq!(envelope.answer, Answer::Rows(result));
        assert_eq!(envelope.sources, vec!["SELECT name, MAX(price) FROM products GROUP BY name"]);
    }

    #[tokio::test]
    async fn test_zero_rows_is_empty_list() {
        let store = Arc::new(MockStore::returning(RawResult::Rows(vec![])));
        let router = router(sql_generator("SELECT * FROM orders WHERE quantity > 1000"), store).await;

        let envelope = router.route("Any huge orders?", 2).await.unwrap();
        assert_eq!(envelope.answer, Answer::Rows(vec![]));
        assert_eq!(serde_json::to_value(&envelope).unwrap()["answer"], json!([]));
    }

    #[tokio::test]
    async fn test_execution_failure_is_an_answer() {
        let store = Arc::new(MockStore::failing("no such column: cost"));
        let router = router(sql_generator("SELECT cost FROM products"), store).await;

        let envelope = router.route("What does it cost?", 2).await.unwrap();

        assert_eq!(envelope.answer.as_text(), Some("SQL error: no such column: cost"));
        assert_eq!(envelope.sources, vec!["SELECT cost FROM products"]);
    }

    #[tokio::test]
    async fn test_document_branch_uses_retrieved_sources() {
        let generator = Arc::new(
            MockGenerator::new("unexpected")
                .on(CLASSIFY, "RAG")
                .on(DOCUMENT, " The products table stores price. "),
        );
        let store = Arc::new(MockStore::returning(RawResult::Rows(vec![])));
        let router = router(generator.clone(), store.clone()).await;

        let envelope = router.route("Which table stores price?", 2).await.unwrap();

        assert_eq!(envelope.answer.as_text(), Some("The products table stores price."));
        assert_eq!(envelope.sources.len(), 2);
        assert!(envelope.sources.iter().any(|s| s.contains("products")));
        assert_eq!(store.calls(), 0);
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_unrecognized_classification_falls_back_to_documents() {
        let generator = Arc::new(
            MockGenerator::new("unexpected")
                .on(CLASSIFY, "I would say sql")
                .on(DOCUMENT, "I don't know"),
        );
        let store = Arc::new(MockStore::returning(RawResult::Rows(vec![])));
        let router = router(generator, store.clone()).await;

        let envelope = router.route("What is the priciest product?", 2).await.unwrap();

        assert_eq!(envelope.answer.as_text(), Some("I don't know"));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_generation_timeout_is_typed() {
        let generator = Arc::new(MockGenerator::new("x").on_reply(CLASSIFY, MockReply::Hang));
        let store = Arc::new(MockStore::returning(RawResult::Rows(vec![])));
        let embedder = MockEmbedder::new(64);
        let index = schema_index(&embedder).await;
        let timeouts = RouterTimeouts {
            generation: Duration::from_millis(20),
            ..RouterTimeouts::default()
        };
        let router = QueryRouter::new(generator, Arc::new(embedder), index, store, timeouts, 2);

        let err = router.route("What is 2+2?", 2).await.unwrap_err();
        assert!(matches!(err, AppError::GenerationTimeout { timeout_ms: 20 }));
    }

    #[tokio::test]
    async fn test_core_uses_first_user_message_and_k() {
        let generator = Arc::new(MockGenerator::new("unexpected").on(CLASSIFY, "rag").on(DOCUMENT, "answer"));
        let store = Arc::new(MockStore::returning(RawResult::Rows(vec![])));
        let router = router(generator, store).await;
        let conversation = Conversation::from_question("Which tables exist?");

        let envelope = router.with_k(1).answer(&conversation).await.unwrap();
        assert_eq!(envelope.sources.len(), 1);

        let envelope = router.answer(&conversation).await.unwrap();
        assert_eq!(envelope.sources.len(), 2);

        let err = router.answer(&Conversation::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_affected_count_shape() {
        assert_eq!(
            serde_json::to_value(shape_result(RawResult::Affected(3))).unwrap(),
            json!({ "rows_affected": 3 })
        );
    }
}
