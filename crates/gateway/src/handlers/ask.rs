//! Hybrid assistant handler

use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use sqlrag_common::{
    errors::{AppError, Result},
    models::{AnswerEnvelope, Conversation},
};

/// Question for the hybrid assistant
#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 4000))]
    pub query: String,

    /// Number of documents to retrieve
    #[validate(range(min = 1))]
    pub k: Option<usize>,
}

/// Answer a question through the guardrail pipeline and the query router
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AnswerEnvelope>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let k = request.k.unwrap_or_else(|| state.router.default_k());
    if k > state.config.router.max_k {
        return Err(AppError::Validation {
            message: format!("k must be at most {}", state.config.router.max_k),
            field: Some("k".to_string()),
        });
    }

    tracing::info!(k = k, query_len = request.query.len(), "Answering question");

    let mut conversation = Conversation::from_question(request.query);
    let answer = state
        .pipeline
        .run(&mut conversation, &state.router.with_k(k))
        .await?;

    Ok(Json(answer))
}
