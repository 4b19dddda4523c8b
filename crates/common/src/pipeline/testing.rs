//! Test doubles for the pipeline: index, generator and transport

use super::FrameSink;
use crate::errors::{AppError, Result, TransportClosed};
use crate::generation::{FragmentStream, GenerationRequest, Generator};
use crate::retrieval::{RetrievedPassage, VectorIndex};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Index returning a fixed passage list and recording every search
pub struct RecordingIndex {
    passages: Vec<RetrievedPassage>,
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl RecordingIndex {
    pub fn new(passages: Vec<RetrievedPassage>) -> Self {
        Self {
            passages,
            delay: Duration::ZERO,
            fail: false,
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::new(vec![]) }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(AppError::RetrievalError {
                message: "index unreachable".to_string(),
            });
        }
        Ok(self.passages.iter().take(k).cloned().collect())
    }

    fn backend(&self) -> &'static str {
        "recording"
    }
}

/// Two passages, "Contact Info" ranked above "Working Hours"
pub fn office_hours_index() -> Arc<RecordingIndex> {
    Arc::new(RecordingIndex::new(vec![
        RetrievedPassage::new("Contact Info", "Call the front desk."),
        RetrievedPassage::new("Working Hours", "Open 10am to 5pm."),
    ]))
}

/// Generator replaying scripted fragments, with injectable delay and failure
pub struct ScriptedGenerator {
    fragments: Vec<String>,
    delay: Duration,
    slow_prompt: Option<(String, Duration)>,
    fail_after: Option<usize>,
    failing_calls: usize,
    refuse: bool,
    calls: AtomicUsize,
    yielded: Arc<AtomicUsize>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new<I, T>(fragments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            delay: Duration::ZERO,
            slow_prompt: None,
            fail_after: None,
            failing_calls: usize::MAX,
            refuse: false,
            calls: AtomicUsize::new(0),
            yielded: Arc::new(AtomicUsize::new(0)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before every fragment
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sleep before opening the stream when the prompt contains `marker`
    pub fn slow_for(mut self, marker: &str, delay: Duration) -> Self {
        self.slow_prompt = Some((marker.to_string(), delay));
        self
    }

    /// Fail after `n` fragments
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Only the first `calls` calls fail
    pub fn recovering_after(mut self, calls: usize) -> Self {
        self.failing_calls = calls;
        self
    }

    /// Reject the request before streaming
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fragments pulled from all streams so far
    pub fn yielded(&self) -> usize {
        self.yielded.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn stream_complete(&self, request: GenerationRequest) -> Result<FragmentStream> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());

        if let Some((marker, delay)) = &self.slow_prompt {
            if request.prompt.contains(marker.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }
        if self.refuse {
            return Err(AppError::GenerationError {
                message: "request rejected".to_string(),
            });
        }

        let mut items: Vec<Result<String>> = self.fragments.iter().cloned().map(Ok).collect();
        if let Some(n) = self.fail_after.filter(|_| call < self.failing_calls) {
            items.truncate(n);
            items.push(Err(AppError::GenerationError {
                message: "injected failure".to_string(),
            }));
        }

        let delay = self.delay;
        let yielded = self.yielded.clone();
        Ok(stream::iter(items)
            .then(move |item| {
                let yielded = yielded.clone();
                async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    yielded.fetch_add(1, Ordering::SeqCst);
                    item
                }
            })
            .boxed())
    }

    fn provider(&self) -> &'static str {
        "scripted"
    }
}

/// Sink keeping frames in memory; can simulate a peer that goes away
#[derive(Default)]
pub struct RecordingSink {
    pub frames: Vec<String>,
    closing_after: Option<usize>,
}

impl RecordingSink {
    /// Accept `n` frames, then fail every write
    pub fn closing_after(n: usize) -> Self {
        Self {
            frames: Vec::new(),
            closing_after: Some(n),
        }
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send_frame(&mut self, text: &str) -> std::result::Result<(), TransportClosed> {
        if self.closing_after.is_some_and(|n| self.frames.len() >= n) {
            return Err(TransportClosed::new("peer gone"));
        }
        self.frames.push(text.to_string());
        Ok(())
    }
}

/// Sink forwarding frames to a channel; dropping the receiver closes it
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

pub fn channel_sink() -> (ChannelSink, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, rx)
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send_frame(&mut self, text: &str) -> std::result::Result<(), TransportClosed> {
        self.tx
            .send(text.to_string())
            .map_err(|_| TransportClosed::new("receiver dropped"))
    }
}
