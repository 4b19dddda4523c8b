//! Token-streaming answer generation
//!
//! A [`Generator`] turns one [`GenerationRequest`] into a lazy, finite,
//! ordered stream of text fragments. Dropping the stream abandons the
//! upstream request.

mod chat;
mod mock;

pub use chat::ChatCompletionsGenerator;
pub use mock::MockGenerator;

use crate::config::GenerationConfig;
use crate::errors::{AppError, Result};
use futures::stream::BoxStream;
use serde::Serialize;
use std::sync::Arc;

/// Ordered fragments of one answer. Items may be empty strings.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// A complete generation call. Only `prompt` varies between queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

/// The fixed part of every generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl GenerationParams {
    /// Request for one prompt, always streaming
    pub fn request(&self, prompt: String) -> GenerationRequest {
        GenerationRequest {
            model: self.model.clone(),
            prompt,
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stream: true,
        }
    }
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        }
    }
}

/// Streaming completion service. Shared read-only across connections.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    /// Start a completion; the returned stream yields fragments in order
    async fn stream_complete(&self, request: GenerationRequest) -> Result<FragmentStream>;

    /// Provider name for logs
    fn provider(&self) -> &'static str;
}

/// Create a generator based on configuration
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "openai" | "nvidia" => Ok(Arc::new(ChatCompletionsGenerator::new(config)?)),
        "mock" => Ok(Arc::new(MockGenerator::default())),
        other => Err(AppError::Configuration {
            message: format!("Unknown generation provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_build_streaming_request() {
        let params = GenerationParams::from(&GenerationConfig::default());
        let request = params.request("hello".to_string());
        assert_eq!(request.model, "qwen/qwen3-235b-a22b");
        assert_eq!(request.prompt, "hello");
        assert_eq!(request.max_tokens, 512);
        assert!(request.stream);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = GenerationConfig {
            provider: "oracle".to_string(),
            ..GenerationConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }
}
