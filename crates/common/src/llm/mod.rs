//! Text generation abstraction
//!
//! Provides a unified interface for the language model used by the router
//! and the safety guardrail:
//! - Ollama (llama3 and other local models)
//! - OpenAI-compatible chat completion endpoints
//! - A scripted mock for tests and offline development

mod chat;

pub use chat::ChatCore;

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::resilience::{retry_with_backoff, with_deadline};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Trait for prompt to text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`, giving up after `timeout`.
    ///
    /// Fails with `GenerationTimeout` or `GenerationUnavailable`.
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Apply the caller's deadline to a generation call
async fn generate_with_deadline<F>(timeout: Duration, fut: F) -> Result<String>
where
    F: std::future::Future<Output = Result<String>>,
{
    with_deadline("text_generator", timeout, fut)
        .await
        .map_err(|e| match e {
            AppError::ExternalTimeout { timeout_ms, .. } => AppError::GenerationTimeout { timeout_ms },
            other => other,
        })
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| AppError::Internal {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

fn unavailable(context: &str, e: impl std::fmt::Display) -> AppError {
    AppError::GenerationUnavailable {
        message: format!("{}: {}", context, e),
    }
}

// ============================================================================
// Ollama
// ============================================================================

/// Ollama `/api/generate` client
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl OllamaGenerator {
    pub fn new(base_url: Option<String>, model: String, max_retries: u32) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model,
            max_retries,
        })
    }

    async fn make_request(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: OllamaOptions { temperature: 0.0 },
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| unavailable("Request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable("Ollama error", format!("{} {}", status, body)));
        }

        let result: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| unavailable("Failed to parse response", e))?;

        Ok(result.response)
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String> {
        generate_with_deadline(
            timeout,
            retry_with_backoff("ollama_generate", self.max_retries, || self.make_request(prompt)),
        )
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// OpenAI-compatible chat completions
// ============================================================================

/// Chat completion client for OpenAI-compatible endpoints
pub struct OpenAIChatGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAIChatGenerator {
    pub fn new(api_key: String, model: String, base_url: Option<String>, max_retries: u32) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model,
            max_retries,
        })
    }

    async fn make_request(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: 0.0,
        };

        let response = self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| unavailable("LLM API request failed", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable("LLM API error", format!("{} {}", status, body)));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| unavailable("Failed to parse LLM response", e))?;

        chat_response.choices.into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| unavailable("LLM API error", "empty response"))
    }
}

#[async_trait]
impl TextGenerator for OpenAIChatGenerator {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String> {
        generate_with_deadline(
            timeout,
            retry_with_backoff("openai_chat", self.max_retries, || self.make_request(prompt)),
        )
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Mock
// ============================================================================

/// Scripted reply of the mock generator
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Unavailable,
    /// Never answers, so the caller's deadline fires
    Hang,
}

/// Mock generator for testing.
///
/// Replies with the first rule whose pattern occurs in the prompt, or with
/// the fallback. Every prompt is recorded.
pub struct MockGenerator {
    rules: Vec<(String, MockReply)>,
    fallback: MockReply,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockGenerator {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            fallback: MockReply::Text(fallback.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Reply with `text` whenever the prompt contains `pattern`
    pub fn on(self, pattern: &str, text: impl Into<String>) -> Self {
        self.on_reply(pattern, MockReply::Text(text.into()))
    }

    pub fn on_reply(mut self, pattern: &str, reply: MockReply) -> Self {
        self.rules.push((pattern.to_string(), reply));
        self
    }

    /// Number of generate calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn reply_for(&self, prompt: &str) -> MockReply {
        self.rules
            .iter()
            .find(|(pattern, _)| prompt.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        let reply = self.reply_for(prompt);
        generate_with_deadline(timeout, async move {
            match reply {
                MockReply::Text(text) => Ok(text),
                MockReply::Unavailable => Err(AppError::GenerationUnavailable {
                    message: "mock generator unavailable".to_string(),
                }),
                MockReply::Hang => {
                    std::future::pending::<()>().await;
                    Ok(String::new())
                }
            }
        })
        .await
    }

    fn model_name(&self) -> &str {
        "mock-generator"
    }
}

/// Create a text generator based on configuration
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaGenerator::new(
            config.api_base.clone(),
            config.model.clone(),
            config.max_retries,
        )?)),
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "llm.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAIChatGenerator::new(
                key,
                config.model.clone(),
                config.api_base.clone(),
                config.max_retries,
            )?))
        }
        "mock" => Ok(Arc::new(MockGenerator::new("rag"))),
        other => Err(AppError::Configuration {
            message: format!("Unknown llm provider: {}", other),
        }),
    }
}
