//! WebSocket query endpoint
//!
//! Each inbound text frame is one query. The answer goes out as one text
//! frame per generated fragment, then `[END]`.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use ragstream_common::{
    errors::TransportClosed,
    pipeline::{ChannelQuerySource, ConnectionHandler, FrameSink},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::AppState;

/// Outbound half of the socket
pub struct WsFrameSink {
    sender: SplitSink<WebSocket, Message>,
}

impl WsFrameSink {
    pub fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send_frame(&mut self, text: &str) -> Result<(), TransportClosed> {
        self.sender
            .send(Message::Text(text.to_owned().into()))
            .await
            .map_err(|e| TransportClosed::new(e.to_string()))
    }
}

/// Upgrade handler for `GET /`
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let (sender, receiver) = socket.split();
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(state.config.session.pending_queries.max(1));

    let reader = tokio::spawn(
        read_queries(receiver, tx, cancel.clone())
            .instrument(info_span!("ws_reader", connection_id = %connection_id)),
    );

    ConnectionHandler::new(
        state.session.clone(),
        ChannelQuerySource::new(rx),
        WsFrameSink::new(sender),
        cancel,
    )
    .with_id(connection_id)
    .with_rate_limit(state.config.session.queries_per_minute)
    .run()
    .await;

    if let Err(e) = reader.await {
        warn!(connection_id = %connection_id, error = %e, "WebSocket reader task failed");
    }
}

/// Feed text frames into the query queue until the client goes away, then
/// cancel the connection so an in-flight answer stops.
async fn read_queries(
    mut receiver: SplitStream<WebSocket>,
    queries: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = receiver.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                // A full queue holds the socket until the handler catches up
                let queued = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    queued = queries.send(text.as_str().to_owned()) => queued,
                };
                if queued.is_err() {
                    break;
                }
            }
            Some(Ok(Message::Binary(_))) => debug!("Ignoring binary frame"),
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "Client sent close");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "WebSocket read failed");
                break;
            }
            None => break,
        }
    }

    cancel.cancel();
}
