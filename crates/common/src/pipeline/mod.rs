//! Streaming query pipeline
//!
//! [`ConnectionHandler`] owns one client connection and feeds its queries,
//! one at a time, through the shared [`QuerySession`]. The transport is
//! reached only through [`QuerySource`] and [`FrameSink`], so the gateway's
//! WebSocket and in-process test doubles plug in the same way.

mod connection;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{
    create_rate_limiter, ChannelQuerySource, ConnectionHandler, ConnectionSummary,
    QueryRateLimiter,
};
pub use session::{
    NoAnswerReason, QueryOutcome, QuerySession, SessionLimits, APOLOGY_MESSAGE, END_SENTINEL,
    NO_ANSWER_MESSAGE,
};

use crate::errors::TransportClosed;
use async_trait::async_trait;

/// Outbound half of a connection: one text frame per call
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, text: &str) -> Result<(), TransportClosed>;
}

/// Inbound half of a connection: `None` once the client is gone
#[async_trait]
pub trait QuerySource: Send {
    async fn next_query(&mut self) -> Option<String>;
}
