use super::{FragmentStream, GenerationRequest, Generator};
use crate::errors::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

/// Streams a fixed answer one word at a time, for local runs without a
/// completion service.
pub struct MockGenerator {
    answer: String,
}

impl MockGenerator {
    pub fn new(answer: impl Into<String>) -> Self {
        Self { answer: answer.into() }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new("This is a mock answer generated without a completion service.")
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn stream_complete(&self, _request: GenerationRequest) -> Result<FragmentStream> {
        let fragments: Vec<Result<String>> = self
            .answer
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(stream::iter(fragments).boxed())
    }

    fn provider(&self) -> &'static str {
        "mock"
    }
}
