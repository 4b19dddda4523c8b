//! OpenAI-compatible `/chat/completions` streaming client

use super::{FragmentStream, GenerationRequest, Generator};
use crate::config::GenerationConfig;
use crate::errors::{AppError, Result};
use async_openai::{config::OpenAIConfig, error::OpenAIError, Client};
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

/// Chunk stream as handed back by the client
type ChunkStream = Pin<Box<dyn Stream<Item = std::result::Result<ChatChunk, OpenAIError>> + Send>>;

/// Streaming chat-completions client
pub struct ChatCompletionsGenerator {
    client: Client<OpenAIConfig>,
    disable_thinking: bool,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_template_kwargs: Option<TemplateKwargs>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct TemplateKwargs {
    thinking: bool,
}

/// One streamed completion chunk. Providers may send an `error` object in
/// place of choices.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl ChatChunk {
    /// Content of the first choice, if the chunk carries any
    fn into_fragment(self) -> Result<Option<String>> {
        if let Some(error) = self.error {
            return Err(AppError::GenerationError {
                message: format!("Upstream error: {}", error),
            });
        }
        Ok(self
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content))
    }
}

impl ChatCompletionsGenerator {
    /// Create a client; the overall deadline is enforced by the caller
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create generation HTTP client: {}", e),
            })?;

        let mut openai = OpenAIConfig::new().with_api_base(config.api_base.trim_end_matches('/'));
        match &config.api_key {
            Some(key) => openai = openai.with_api_key(key),
            None => tracing::warn!(provider = %config.provider, "No generation API key configured"),
        }

        Ok(Self {
            client: Client::with_config(openai).with_http_client(http),
            disable_thinking: config.disable_thinking,
        })
    }

    fn body<'a>(&self, request: &'a GenerationRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &request.model,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            stream: request.stream,
            chat_template_kwargs: self
                .disable_thinking
                .then_some(TemplateKwargs { thinking: false }),
        }
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn stream_complete(&self, request: GenerationRequest) -> Result<FragmentStream> {
        let chunks: ChunkStream = self
            .client
            .chat()
            .create_stream_byot(self.body(&request))
            .await
            .map_err(|e| AppError::GenerationError {
                message: format!("Request failed: {}", e),
            })?;

        Ok(decode_fragments(chunks.map(|item| item.map_err(stream_error))))
    }

    fn provider(&self) -> &'static str {
        "chat-completions"
    }
}

/// Classify a client-side stream failure
fn stream_error(error: OpenAIError) -> AppError {
    match error {
        OpenAIError::JSONDeserialize(e) => AppError::MalformedStream {
            message: format!("Undecodable chunk: {}", e),
        },
        other => AppError::GenerationError {
            message: format!("Stream interrupted: {}", other),
        },
    }
}

/// Turn completion chunks into content fragments.
///
/// Chunks without content are skipped. The stream ends at the end of input
/// or right after the first error item.
pub(crate) fn decode_fragments<S>(chunks: S) -> FragmentStream
where
    S: Stream<Item = Result<ChatChunk>> + Send + 'static,
{
    stream::unfold((Box::pin(chunks), false), |(mut chunks, finished)| async move {
        if finished {
            return None;
        }
        loop {
            let item = match chunks.next().await? {
                Ok(chunk) => match chunk.into_fragment() {
                    Ok(Some(fragment)) => Ok(fragment),
                    Ok(None) => continue,
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            let failed = item.is_err();
            return Some((item, (chunks, failed)));
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(value: serde_json::Value) -> Result<ChatChunk> {
        Ok(serde_json::from_value(value).unwrap())
    }

    fn delta(content: &str) -> Result<ChatChunk> {
        chunk(json!({ "choices": [{ "delta": { "content": content } }] }))
    }

    async fn collect(items: Vec<Result<ChatChunk>>) -> Vec<Result<String>> {
        decode_fragments(stream::iter(items)).collect().await
    }

    #[tokio::test]
    async fn test_fragments_in_order() {
        let items = collect(vec![delta("The "), delta("office"), delta(" hours")]).await;

        let fragments: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(fragments, vec!["The ", "office", " hours"]);
    }

    #[tokio::test]
    async fn test_role_only_and_empty_deltas() {
        let items = collect(vec![
            chunk(json!({ "choices": [{ "delta": { "role": "assistant" } }] })),
            delta(""),
            chunk(json!({ "choices": [] })),
        ])
        .await;

        let fragments: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(fragments, vec![""]);
    }

    #[tokio::test]
    async fn test_malformed_chunk_ends_stream_with_error() {
        let bad = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let items = collect(vec![
            delta("a"),
            Err(stream_error(OpenAIError::JSONDeserialize(bad))),
            delta("b"),
        ])
        .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "a");
        assert!(matches!(items[1], Err(AppError::MalformedStream { .. })));
    }

    #[tokio::test]
    async fn test_upstream_error_object() {
        let items = collect(vec![
            chunk(json!({ "error": { "message": "overloaded" } })),
            delta("never"),
        ])
        .await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(AppError::GenerationError { .. })));
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream() {
        let items = collect(vec![
            delta("a"),
            Err(stream_error(OpenAIError::InvalidArgument("connection reset".to_string()))),
        ])
        .await;

        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(AppError::GenerationError { ref message }) if message.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_stream_end_without_content() {
        assert!(collect(vec![]).await.is_empty());
    }

    #[test]
    fn test_request_body_shape() {
        let generator = ChatCompletionsGenerator::new(&GenerationConfig::default()).unwrap();
        let request = super::super::GenerationParams::from(&GenerationConfig::default())
            .request("prompt text".to_string());
        let json = serde_json::to_value(generator.body(&request)).unwrap();

        assert_eq!(json["model"], "qwen/qwen3-235b-a22b");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "prompt text");
        assert_eq!(json["max_tokens"], 512);
        assert_eq!(json["stream"], true);
        assert_eq!(json["chat_template_kwargs"]["thinking"], false);
    }
}
