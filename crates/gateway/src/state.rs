//! Shared application state

use sqlrag_common::{
    config::AppConfig,
    db::{DbPool, SeaOrmStore, StructuredStore},
    embeddings::{create_embedder, Embedder},
    errors::Result,
    guardrails::GuardrailPipeline,
    index::{create_index, DocumentIndex},
    llm::{create_generator, ChatCore, TextGenerator},
    router::{QueryRouter, RouterTimeouts},
};
use std::sync::Arc;
use std::time::Duration;

/// Everything a handler needs, built once at start-up.
/// Cloning is cheap: every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<GuardrailPipeline>,
    pub router: Arc<QueryRouter>,
    pub chat: Arc<ChatCore>,
    pub store: Arc<dyn StructuredStore>,
    pub index: Arc<dyn DocumentIndex>,
}

impl AppState {
    /// Wire the pipeline and answering cores around the given capabilities
    pub fn new(
        config: AppConfig,
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn DocumentIndex>,
        store: Arc<dyn StructuredStore>,
    ) -> Result<Self> {
        let timeouts = RouterTimeouts::from_config(&config);

        let pipeline = GuardrailPipeline::from_config(
            &config.guardrails,
            generator.clone(),
            timeouts.generation,
        )?;

        let router = QueryRouter::new(
            generator.clone(),
            embedder,
            index.clone(),
            store.clone(),
            timeouts,
            config.router.default_k,
        );

        let chat = ChatCore::new(generator, Duration::from_secs(config.llm.timeout_secs));

        Ok(Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            router: Arc::new(router),
            chat: Arc::new(chat),
            store,
            index,
        })
    }

    /// Build the production capabilities from configuration
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let generator = create_generator(&config.llm)?;
        let embedder = create_embedder(&config.embedding)?;
        let index = create_index(&config)?;

        let pool = DbPool::new(&config.database).await?;
        let store: Arc<dyn StructuredStore> = Arc::new(SeaOrmStore::new(pool));

        Self::new(config, generator, embedder, index, store)
    }
}
