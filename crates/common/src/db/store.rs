//! SeaORM-backed structured store

use super::{DbPool, RawResult, StructuredStore};
use crate::errors::{AppError, Result};
use crate::models::Row;
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DbErr, JsonValue, QueryResult, Statement, Value};

/// Structured store over a pooled SeaORM connection.
///
/// The pool hands each in-flight request its own connection, so concurrent
/// requests never wait on a shared lock.
#[derive(Clone)]
pub struct SeaOrmStore {
    pool: DbPool,
}

impl SeaOrmStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Statements that produce rows rather than an affected count
fn returns_rows(query: &str) -> bool {
    let lowered = query.trim_start().to_lowercase();
    ["select", "with", "pragma", "explain"]
        .iter()
        .any(|keyword| lowered.starts_with(keyword))
}

fn to_db_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::String(None),
        JsonValue::Bool(b) => Value::from(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::from(i),
            None => Value::from(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) => Value::from(s.clone()),
        other => Value::from(other.to_string()),
    }
}

/// Decode a row column by column, in select order.
///
/// Aggregates and expressions carry no declared type on SQLite, so each
/// column is tried against the value types in turn. NULL and anything
/// undecodable become `null`.
fn decode_row(result: &QueryResult) -> Row {
    result
        .column_names()
        .into_iter()
        .map(|column| {
            let value = decode_column(result, &column);
            (column, value)
        })
        .collect()
}

fn decode_column(result: &QueryResult, column: &str) -> JsonValue {
    if let Ok(v) = result.try_get::<Option<i64>>("", column) {
        return v.map(JsonValue::from).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = result.try_get::<Option<i32>>("", column) {
        return v.map(JsonValue::from).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = result.try_get::<Option<f64>>("", column) {
        return v.map(JsonValue::from).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = result.try_get::<Option<f32>>("", column) {
        return v.map(JsonValue::from).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = result.try_get::<Option<String>>("", column) {
        return v.map(JsonValue::from).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = result.try_get::<Option<bool>>("", column) {
        return v.map(JsonValue::from).unwrap_or(JsonValue::Null);
    }
    JsonValue::Null
}

fn execution_failed(query: &str, e: DbErr) -> AppError {
    AppError::QueryExecutionFailed {
        query: query.to_string(),
        detail: e.to_string(),
    }
}

#[async_trait]
impl StructuredStore for SeaOrmStore {
    async fn execute(&self, query: &str, params: &[JsonValue]) -> Result<RawResult> {
        let conn = self.pool.connection();
        let statement = Statement::from_sql_and_values(
            conn.get_database_backend(),
            query,
            params.iter().map(to_db_value),
        );

        if returns_rows(query) {
            let results = conn
                .query_all(statement)
                .await
                .map_err(|e| execution_failed(query, e))?;

            let rows: Vec<Row> = results.iter().map(decode_row).collect();

            tracing::debug!(rows = rows.len(), "Read statement executed");
            Ok(RawResult::Rows(rows))
        } else {
            let result = conn
                .execute(statement)
                .await
                .map_err(|e| execution_failed(query, e))?;

            Ok(RawResult::Affected(result.rows_affected()))
        }
    }

    async fn health_check(&self) -> Result<()> {
        self.pool.ping().await
    }
}
