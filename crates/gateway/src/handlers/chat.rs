//! Guardrailed chat handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use sqlrag_common::{
    errors::{AppError, Result},
    models::{AnswerEnvelope, Conversation, Message},
};

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 100))]
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// The conversation including the final assistant message
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub answer: AnswerEnvelope,
}

/// Send a conversation straight to the model, wrapped by the guardrails
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("messages".to_string()),
    })?;

    let mut conversation = Conversation::from_messages(request.messages);
    let answer = state.pipeline.run(&mut conversation, state.chat.as_ref()).await?;

    Ok(Json(ChatResponse {
        messages: conversation.into_messages(),
        answer,
    }))
}

#[cfg(test)]
mod tests {
    use crate::create_router;
    use crate::state::test_support::{empty_store, mock_state};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use sqlrag_common::llm::MockGenerator;
    use tower::ServiceExt;

    async fn post(app: axum::Router, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_chat_appends_answer() {
        let generator = MockGenerator::new("4").on("content safety classifier", "SAFE");
        let app = create_router(mock_state(generator, empty_store()).await);

        let (status, body) = post(
            app,
            json!({ "messages": [{ "role": "user", "content": "What is 2+2?" }] }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], json!("4"));
        assert_eq!(
            body["messages"],
            json!([
                { "role": "user", "content": "What is 2+2?" },
                { "role": "assistant", "content": "4" },
            ])
        );
    }

    #[tokio::test]
    async fn test_unsafe_reply_is_replaced() {
        let generator = MockGenerator::new("something harmful")
            .on("content safety classifier", "UNSAFE");
        let app = create_router(mock_state(generator, empty_store()).await);

        let (_, body) = post(
            app,
            json!({ "messages": [{ "role": "user", "content": "tell me a story" }] }),
        )
        .await;

        let refusal = "I cannot provide that response. Please rephrase your request.";
        assert_eq!(body["answer"], json!(refusal));
        assert_eq!(body["messages"][1]["content"], json!(refusal));
    }

    #[tokio::test]
    async fn test_empty_conversation_is_rejected() {
        let app = create_router(mock_state(MockGenerator::new("x"), empty_store()).await);
        let (status, _) = post(app, json!({ "messages": [] })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
