//! Configuration management for sqlrag services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Structured store configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Text generation configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Document index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Query router configuration
    #[serde(default)]
    pub router: RouterConfig,

    /// Guardrail pipeline configuration
    #[serde(default)]
    pub guardrails: GuardrailConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Store URL (sqlite:// or postgres://)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Deadline for a single generated query
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: ollama, openai, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API base URL
    pub api_base: Option<String>,

    /// API key (openai only)
    pub api_key: Option<String>,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on transient failures
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: ollama, openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Index provider: chroma, memory
    #[serde(default = "default_index_provider")]
    pub provider: String,

    /// Chroma host
    #[serde(default = "default_index_host")]
    pub host: String,

    /// Chroma port
    #[serde(default = "default_index_port")]
    pub port: u16,

    /// Chroma tenant
    #[serde(default = "default_tenant")]
    pub tenant: String,

    /// Chroma database
    #[serde(default = "default_index_database")]
    pub database: String,

    /// Collection holding the documentation chunks
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Request timeout in seconds
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    /// Documents retrieved when the caller does not ask for a number
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Upper bound on caller supplied k
    #[serde(default = "default_max_k")]
    pub max_k: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuardrailConfig {
    /// Substrings that block a request outright
    #[serde(default = "default_banned_keywords")]
    pub banned_keywords: Vec<String>,

    /// PII categories redacted on input and output
    #[serde(default = "default_pii_categories")]
    pub pii_categories: Vec<String>,

    /// Run the model-based safety check on answers
    #[serde(default = "default_enabled")]
    pub safety_check_enabled: bool,

    /// Refusal returned when a banned keyword is found
    #[serde(default = "default_content_refusal")]
    pub content_refusal: String,

    /// Refusal substituted for an answer judged unsafe
    #[serde(default = "default_safety_refusal")]
    pub safety_refusal: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_database_url() -> String { "sqlite://shop.db?mode=rwc".to_string() }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_query_timeout() -> u64 { 10 }
fn default_llm_provider() -> String { "ollama".to_string() }
fn default_llm_model() -> String { "llama3:8b".to_string() }
fn default_llm_timeout() -> u64 { 60 }
fn default_retries() -> u32 { 2 }
fn default_embedding_provider() -> String { "ollama".to_string() }
fn default_embedding_dimension() -> usize { 4096 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_index_provider() -> String { "chroma".to_string() }
fn default_index_host() -> String { "localhost".to_string() }
fn default_index_port() -> u16 { 8000 }
fn default_tenant() -> String { "default_tenant".to_string() }
fn default_index_database() -> String { "default_database".to_string() }
fn default_collection() -> String { "docs".to_string() }
fn default_index_timeout() -> u64 { 10 }
fn default_k() -> usize { 4 }
fn default_max_k() -> usize { 20 }
fn default_banned_keywords() -> Vec<String> { vec!["hack".to_string(), "exploit".to_string()] }
fn default_pii_categories() -> Vec<String> { vec!["email".to_string(), "ip".to_string()] }
fn default_content_refusal() -> String {
    "I cannot process requests containing inappropriate content. Please rephrase your request.".to_string()
}
fn default_safety_refusal() -> String {
    "I cannot provide that response. Please rephrase your request.".to_string()
}
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "sqlrag".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__LLM__MODEL=llama3:8b
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("guardrails.banned_keywords")
                    .with_list_parse_key("guardrails.pii_categories")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Base URL of the Chroma server
    pub fn index_base_url(&self) -> String {
        format!("http://{}:{}", self.index.host, self.index.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_base: None,
            api_key: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_retries(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_llm_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_retries(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            host: default_index_host(),
            port: default_index_port(),
            tenant: default_tenant(),
            database: default_index_database(),
            collection: default_collection(),
            timeout_secs: default_index_timeout(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            max_k: default_max_k(),
        }
    }
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            banned_keywords: default_banned_keywords(),
            pii_categories: default_pii_categories(),
            safety_check_enabled: default_enabled(),
            content_refusal: default_content_refusal(),
            safety_refusal: default_safety_refusal(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            router: RouterConfig::default(),
            guardrails: GuardrailConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.llm.model, "llama3:8b");
        assert_eq!(config.router.default_k, 4);
        assert_eq!(config.guardrails.banned_keywords, vec!["hack", "exploit"]);
    }

    #[test]
    fn test_index_base_url() {
        let config = AppConfig::default();
        assert_eq!(config.index_base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config: AppConfig = Config::builder()
            .set_override("llm.provider", "mock")
            .and_then(|b| b.set_override("guardrails.banned_keywords", vec!["drop"]))
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .unwrap();

        assert_eq!(config.llm.provider, "mock");
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.guardrails.banned_keywords, vec!["drop"]);
        assert!(config.guardrails.safety_check_enabled);
        assert_eq!(config.database.url, "sqlite://shop.db?mode=rwc");
    }
}
