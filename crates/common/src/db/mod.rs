//! Structured store access for sqlrag
//!
//! Provides:
//! - The `StructuredStore` capability used by the query router
//! - A SeaORM-backed store over a pooled connection
//! - A scripted store for tests

mod store;

pub use store::SeaOrmStore;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use crate::models::Row;
use async_trait::async_trait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// Raw outcome of executing a statement
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    /// Rows returned by a read statement
    Rows(Vec<Row>),
    /// Number of rows touched by any other statement
    Affected(u64),
}

/// Execute statements against the transactional store.
///
/// Implementations are not required to enforce read-only access; the query
/// router validates every generated statement before it gets here.
#[async_trait]
pub trait StructuredStore: Send + Sync {
    /// Execute `query` with positional `params`.
    /// Fails with `QueryExecutionFailed` for malformed or rejected statements.
    async fn execute(&self, query: &str, params: &[serde_json::Value]) -> Result<RawResult>;

    /// Check that the store is reachable
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    connection: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to structured store...");

        let mut opts = ConnectOptions::new(&config.url);
        opts
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(true);

        let connection = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e)
            })?;

        info!("Structured store connection established");

        Ok(Self { connection })
    }

    /// Wrap an existing connection
    pub fn from_connection(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        use sea_orm::ConnectionTrait;

        self.connection
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }
}

/// Scripted outcome of the mock store
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Result(RawResult),
    Fail(String),
}

/// Mock store for testing. Returns the same outcome for every statement
/// and records what was executed.
pub struct MockStore {
    outcome: MockOutcome,
    executed: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockStore {
    pub fn returning(result: RawResult) -> Self {
        Self::with_outcome(MockOutcome::Result(result))
    }

    pub fn failing(detail: impl Into<String>) -> Self {
        Self::with_outcome(MockOutcome::Fail(detail.into()))
    }

    fn with_outcome(outcome: MockOutcome) -> Self {
        Self {
            outcome,
            executed: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of execute calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl StructuredStore for MockStore {
    async fn execute(&self, query: &str, _params: &[serde_json::Value]) -> Result<RawResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.to_string());

        match &self.outcome {
            MockOutcome::Result(result) => Ok(result.clone()),
            MockOutcome::Fail(detail) => Err(AppError::QueryExecutionFailed {
                query: query.to_string(),
                detail: detail.clone(),
            }),
        }
    }
}
