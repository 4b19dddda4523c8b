//! Connection handler: sequential query loop for one client

use super::session::{QueryOutcome, QuerySession};
use super::{FrameSink, QuerySource};
use crate::errors::{AppError, TransportClosed};
use crate::metrics::{self, ConnectionMetrics};
use async_trait::async_trait;
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Per-connection query limiter
pub type QueryRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Limiter allowing `queries_per_minute` with an equal burst; `None` when 0
pub fn create_rate_limiter(queries_per_minute: u32) -> Option<QueryRateLimiter> {
    NonZeroU32::new(queries_per_minute).map(|n| RateLimiter::direct(Quota::per_minute(n)))
}

/// Queries pushed by a transport reader task
pub struct ChannelQuerySource {
    rx: mpsc::Receiver<String>,
}

impl ChannelQuerySource {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl QuerySource for ChannelQuerySource {
    async fn next_query(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

/// What happened on one connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub queries: usize,
    pub failed: usize,
    /// The transport went away while a query was being answered
    pub disconnected_mid_query: bool,
}

/// Owns one client connection.
///
/// Queries are answered strictly one after another: `run` takes `self` and
/// awaits each session before pulling the next query.
pub struct ConnectionHandler<Q, S> {
    id: Uuid,
    session: Arc<QuerySession>,
    queries: Q,
    sink: S,
    cancel: CancellationToken,
    limiter: Option<QueryRateLimiter>,
    queries_per_minute: u32,
}

impl<Q, S> ConnectionHandler<Q, S>
where
    Q: QuerySource,
    S: FrameSink,
{
    /// `cancel` is fired by whoever observes the transport closing
    pub fn new(session: Arc<QuerySession>, queries: Q, sink: S, cancel: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            session,
            queries,
            sink,
            cancel,
            limiter: None,
            queries_per_minute: 0,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Limit queries per minute on this connection (0 disables)
    pub fn with_rate_limit(mut self, queries_per_minute: u32) -> Self {
        self.limiter = create_rate_limiter(queries_per_minute);
        self.queries_per_minute = queries_per_minute;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Serve queries until the client goes away
    #[instrument(skip_all, fields(connection_id = %self.id))]
    pub async fn run(mut self) -> ConnectionSummary {
        let connection = ConnectionMetrics::open();
        info!("Client connected");

        let mut summary = ConnectionSummary::default();
        loop {
            let query = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                query = self.queries.next_query() => match query {
                    Some(query) => query,
                    None => break,
                },
            };

            summary.queries += 1;
            match self.handle(query).await {
                Ok(QueryOutcome::Failed(_)) => summary.failed += 1,
                Ok(_) => {}
                Err(closed) => {
                    info!(reason = %closed.reason, "Transport closed mid-query");
                    summary.disconnected_mid_query = true;
                    break;
                }
            }
        }

        // Stops the transport reader if it is still running
        self.cancel.cancel();
        info!(
            queries = summary.queries,
            failed = summary.failed,
            duration_secs = connection.elapsed_secs(),
            "Client disconnected"
        );
        summary
    }

    async fn handle(&mut self, query: String) -> Result<QueryOutcome, TransportClosed> {
        let started = Instant::now();
        info!(query = %query.trim(), "Processing query");

        let outcome = if self.admit() {
            self.session.run(&query, &mut self.sink, &self.cancel).await?
        } else {
            warn!(limit = self.queries_per_minute, "Query rate limit exceeded");
            let limited = QueryOutcome::Failed(AppError::RateLimited {
                limit: self.queries_per_minute,
            });
            self.session.conclude(&mut self.sink, limited).await?
        };

        match &outcome {
            QueryOutcome::Answered { fragments, answer } => {
                info!(fragments = *fragments, answer = %answer.trim(), "Completed response")
            }
            QueryOutcome::NoAnswer(reason) => info!(?reason, "No answer"),
            QueryOutcome::Failed(e) => {
                error!(error = %e, code = e.code().as_code(), "Query failed")
            }
        }
        metrics::record_query(started.elapsed().as_secs_f64(), outcome.label());

        Ok(outcome)
    }

    fn admit(&self) -> bool {
        self.limiter
            .as_ref()
            .map_or(true, |limiter| limiter.check().is_ok())
    }
}
