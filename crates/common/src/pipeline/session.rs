//! One query end to end: retrieval, context, prompt, generation, relay
//!
//! Every path through [`QuerySession::run`] writes exactly one sentinel, after
//! the query's own fragments or canned text. Query-level failures come back as
//! [`QueryOutcome::Failed`]; only [`TransportClosed`] escapes as an error.

use super::FrameSink;
use crate::config::AppConfig;
use crate::context::{AssembledContext, ContextAssembler, ContextAssemblerConfig, PromptBuilder};
use crate::errors::{AppError, Result, TransportClosed};
use crate::generation::{FragmentStream, GenerationParams, Generator};
use crate::metrics;
use crate::retrieval::{RetrievedPassage, VectorIndex};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Marks the end of one answer on the wire
pub const END_SENTINEL: &str = "[END]";

/// Sent for empty queries and empty retrievals
pub const NO_ANSWER_MESSAGE: &str = "I'm sorry, I don't know the answer to that question";

/// Sent when processing a query failed
pub const APOLOGY_MESSAGE: &str = "I'm sorry, an error occurred while processing your request.";

/// Prompt prefix length written to the logs
const PROMPT_LOG_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoAnswerReason {
    EmptyQuery,
    NoPassages,
}

/// How one query ended. Exactly one sentinel was written for each.
#[derive(Debug)]
pub enum QueryOutcome {
    /// Generation ran to completion
    Answered { fragments: usize, answer: String },
    /// The canned "don't know" text was sent
    NoAnswer(NoAnswerReason),
    /// The apology was sent, possibly after some fragments
    Failed(AppError),
}

impl QueryOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Answered { .. } => "answered",
            Self::NoAnswer(NoAnswerReason::EmptyQuery) => "empty_query",
            Self::NoAnswer(NoAnswerReason::NoPassages) => "no_passages",
            Self::Failed(_) => "failed",
        }
    }

    /// Canned text owed to the client before the sentinel
    fn canned_text(&self) -> Option<&'static str> {
        match self {
            Self::Answered { .. } => None,
            Self::NoAnswer(_) => Some(NO_ANSWER_MESSAGE),
            Self::Failed(_) => Some(APOLOGY_MESSAGE),
        }
    }
}

/// Per-query bounds
#[derive(Debug, Clone)]
pub struct SessionLimits {
    pub top_k: usize,
    pub max_query_chars: usize,
    pub retrieval_timeout: Duration,
    pub generation_timeout: Duration,
}

impl From<&AppConfig> for SessionLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_query_chars: config.session.max_query_chars,
            retrieval_timeout: config.retrieval_timeout(),
            generation_timeout: config.generation_timeout(),
        }
    }
}

/// Query orchestration shared by every connection. Holds no per-query state.
pub struct QuerySession {
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    assembler: ContextAssembler,
    prompts: PromptBuilder,
    params: GenerationParams,
    limits: SessionLimits,
}

impl QuerySession {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
        prompts: PromptBuilder,
        params: GenerationParams,
        limits: SessionLimits,
    ) -> Self {
        Self {
            index,
            generator,
            assembler: ContextAssembler::default(),
            prompts,
            params,
            limits,
        }
    }

    /// Replace the default (unbounded) context assembler
    pub fn with_assembler(mut self, config: ContextAssemblerConfig) -> Self {
        self.assembler = ContextAssembler::new(config);
        self
    }

    /// Answer one query on `sink`, ending with the sentinel.
    ///
    /// Cancelling `cancel` stops retrieval or relay at the next suspension
    /// point and drops the in-flight generation.
    pub async fn run<S>(
        &self,
        query: &str,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> std::result::Result<QueryOutcome, TransportClosed>
    where
        S: FrameSink + ?Sized,
    {
        let outcome = self.answer(query, sink, cancel).await?;
        self.conclude(sink, outcome).await
    }

    /// Write any canned text the outcome calls for, then the sentinel
    pub async fn conclude<S>(
        &self,
        sink: &mut S,
        outcome: QueryOutcome,
    ) -> std::result::Result<QueryOutcome, TransportClosed>
    where
        S: FrameSink + ?Sized,
    {
        if let Some(text) = outcome.canned_text() {
            sink.send_frame(text).await?;
        }
        sink.send_frame(END_SENTINEL).await?;
        Ok(outcome)
    }

    /// Context and prompt for a query and its passages. Pure.
    pub fn build_prompt(&self, query: &str, passages: &[RetrievedPassage]) -> (AssembledContext, String) {
        let context = self.assembler.assemble(passages);
        let prompt = self.prompts.build(query, &context.text);
        (context, prompt)
    }

    async fn answer<S>(
        &self,
        query: &str,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> std::result::Result<QueryOutcome, TransportClosed>
    where
        S: FrameSink + ?Sized,
    {
        let started = Instant::now();
        let query = query.trim();
        if query.is_empty() {
            return Ok(QueryOutcome::NoAnswer(NoAnswerReason::EmptyQuery));
        }

        let size = query.chars().count();
        if size > self.limits.max_query_chars {
            return Ok(QueryOutcome::Failed(AppError::QueryTooLarge {
                size,
                limit: self.limits.max_query_chars,
            }));
        }

        let passages = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportClosed::new("client disconnected during retrieval")),
            result = self.retrieve(query) => match result {
                Ok(passages) => passages,
                Err(e) => return Ok(QueryOutcome::Failed(e)),
            },
        };

        info!(passages = passages.len(), backend = self.index.backend(), "Retrieved passages");
        if passages.is_empty() {
            return Ok(QueryOutcome::NoAnswer(NoAnswerReason::NoPassages));
        }

        let (context, prompt) = self.build_prompt(query, &passages);
        if context.truncated {
            debug!(
                passages_used = context.passages_used,
                passages = passages.len(),
                "Context capped"
            );
        }
        info!(prompt = %prompt_head(&prompt), "Final prompt (truncated)");

        self.relay(prompt, sink, cancel, started).await
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>> {
        let start = Instant::now();
        let search = self.index.search(query, self.limits.top_k);

        let mut passages = match timeout(self.limits.retrieval_timeout, search).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AppError::RetrievalTimeout {
                    timeout_ms: millis(self.limits.retrieval_timeout),
                })
            }
        };
        passages.truncate(self.limits.top_k);

        metrics::record_retrieval(start.elapsed().as_secs_f64(), passages.len());
        Ok(passages)
    }

    /// Forward fragments as they arrive, all under one generation deadline
    async fn relay<S>(
        &self,
        prompt: String,
        sink: &mut S,
        cancel: &CancellationToken,
        started: Instant,
    ) -> std::result::Result<QueryOutcome, TransportClosed>
    where
        S: FrameSink + ?Sized,
    {
        let deadline = Instant::now() + self.limits.generation_timeout;
        let timed_out = || {
            QueryOutcome::Failed(AppError::GenerationTimeout {
                timeout_ms: millis(self.limits.generation_timeout),
            })
        };

        let request = self.params.request(prompt);
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportClosed::new("client disconnected before generation")),
            opened = timeout_at(deadline, self.generator.stream_complete(request)) => opened,
        };
        let mut stream: FragmentStream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Ok(QueryOutcome::Failed(e)),
            Err(_) => return Ok(timed_out()),
        };

        let mut answer = String::new();
        let mut fragments = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(fragments, "Client disconnected mid-stream, cancelling generation");
                    return Err(TransportClosed::new("client disconnected mid-stream"));
                }
                next = timeout_at(deadline, stream.next()) => next,
            };

            let fragment = match next {
                Ok(Some(Ok(fragment))) => fragment,
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    warn!(fragments, error = %e, "Generation failed mid-stream");
                    return Ok(QueryOutcome::Failed(e));
                }
                Err(_) => {
                    warn!(fragments, "Generation deadline reached mid-stream");
                    return Ok(timed_out());
                }
            };
            if fragment.is_empty() {
                continue;
            }

            if fragments == 0 {
                metrics::record_first_fragment(started.elapsed().as_secs_f64());
            }
            sink.send_frame(&fragment).await?;
            metrics::record_fragment();
            fragments += 1;
            answer.push_str(&fragment);
        }

        Ok(QueryOutcome::Answered { fragments, answer })
    }
}

fn prompt_head(prompt: &str) -> String {
    let mut head: String = prompt.chars().take(PROMPT_LOG_CHARS).collect();
    if head.len() < prompt.len() {
        head.push_str("...");
    }
    head
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
