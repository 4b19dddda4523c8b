//! Configuration management for ragstream services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
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

    /// Database configuration (pgvector backend and ingestion)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Generation (chat completion) service configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Per-connection query limits
    #[serde(default)]
    pub session: SessionConfig,

    /// Prompt template source
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Corpus import
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
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
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: nvidia, openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Input truncation policy sent to the provider (NONE, START, END)
    #[serde(default = "default_truncate")]
    pub truncate: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts for batch requests
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Generation provider: openai (any chat-completions compatible API), mock
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    /// API key for the completion service
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model identifier
    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Ask reasoning models to skip their thinking phase
    #[serde(default = "default_disable_thinking")]
    pub disable_thinking: bool,

    /// Connect timeout in seconds
    #[serde(default = "default_generation_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Deadline for a whole generation stream in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Index backend: pgvector, memory
    #[serde(default = "default_retrieval_backend")]
    pub backend: String,

    /// Number of passages requested per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Retrieval deadline in seconds
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,

    /// Cap on assembled context length in characters (0 = unbounded)
    #[serde(default)]
    pub max_context_chars: usize,

    /// Corpus file or directory for the memory backend
    #[serde(default = "default_corpus_path")]
    pub corpus_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Longest accepted query in characters
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    /// Queries allowed per connection per minute (0 disables the limit)
    #[serde(default = "default_queries_per_minute")]
    pub queries_per_minute: u32,

    /// Inbound queries buffered per connection while one is being answered
    #[serde(default = "default_pending_queries")]
    pub pending_queries: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PromptConfig {
    /// Template file; the built-in template is used when unset
    pub template_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Corpus file or directory to import
    #[serde(default = "default_corpus_path")]
    pub source_path: String,

    /// Passages inserted per embedding batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level or EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name attached to logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8090 }
fn default_database_url() -> String { "postgres://localhost/ragstream".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "nvidia".to_string() }
fn default_api_base() -> String { "https://integrate.api.nvidia.com/v1".to_string() }
fn default_embedding_model() -> String { "nvidia/llama-3.2-nemoretriever-300m-embed-v2".to_string() }
fn default_truncate() -> String { "END".to_string() }
fn default_embedding_dimension() -> usize { 2048 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 32 }
fn default_generation_provider() -> String { "openai".to_string() }
fn default_generation_model() -> String { "qwen/qwen3-235b-a22b".to_string() }
fn default_temperature() -> f32 { 0.2 }
fn default_top_p() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 512 }
fn default_disable_thinking() -> bool { true }
fn default_generation_connect_timeout() -> u64 { 10 }
fn default_generation_timeout() -> u64 { 120 }
fn default_retrieval_backend() -> String { "pgvector".to_string() }
fn default_top_k() -> usize { 15 }
fn default_retrieval_timeout() -> u64 { 10 }
fn default_corpus_path() -> String { "data/dataset.json".to_string() }
fn default_max_query_chars() -> usize { 2000 }
fn default_queries_per_minute() -> u32 { 30 }
fn default_pending_queries() -> usize { 4 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "ragstream".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__GENERATION__API_KEY=...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file
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

    /// Get retrieval deadline as Duration
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.timeout_secs)
    }

    /// Get generation deadline as Duration
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
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
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: default_api_base(),
            model: default_embedding_model(),
            truncate: default_truncate(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            api_key: None,
            api_base: default_api_base(),
            model: default_generation_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            disable_thinking: default_disable_thinking(),
            connect_timeout_secs: default_generation_connect_timeout(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: default_retrieval_backend(),
            top_k: default_top_k(),
            timeout_secs: default_retrieval_timeout(),
            max_context_chars: 0,
            corpus_path: default_corpus_path(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_query_chars: default_max_query_chars(),
            queries_per_minute: default_queries_per_minute(),
            pending_queries: default_pending_queries(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            source_path: default_corpus_path(),
            batch_size: default_batch_size(),
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            retrieval: RetrievalConfig::default(),
            session: SessionConfig::default(),
            prompt: PromptConfig::default(),
            ingestion: IngestionConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.retrieval.top_k, 15);
        assert_eq!(config.generation.model, "qwen/qwen3-235b-a22b");
        assert_eq!(config.generation.max_tokens, 512);
    }

    #[test]
    fn test_generation_defaults_match_fixed_parameters() {
        let config = GenerationConfig::default();
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert!((config.top_p - 0.7).abs() < f32::EPSILON);
        assert!(config.disable_thinking);
    }

    #[test]
    fn test_timeouts() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval_timeout(), Duration::from_secs(10));
        assert_eq!(config.generation_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_empty_sources_deserialize_to_defaults() {
        let config: AppConfig = Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.session.max_query_chars, 2000);
        assert_eq!(config.retrieval.backend, "pgvector");
    }
}
