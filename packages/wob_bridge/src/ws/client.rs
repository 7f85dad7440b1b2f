//! Client WebSocket handler
//!
//! One phone per socket. Transport events are fed to the [`Bridge`]; the
//! bridge answers through [`WsTransport`], whose queue this handler drains.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use slot_session::{Bridge, ConnectionState, FrameOutcome, SessionError};
use std::sync::Arc;
use tracing::{debug, info};

use crate::metrics::ServerMetrics;
use crate::transport::WsTransport;

/// Handle one client connection from upgrade to close.
pub async fn handle_client_ws(
    socket: WebSocket,
    bridge: Arc<Bridge>,
    transport: Arc<WsTransport>,
    metrics: Arc<ServerMetrics>,
) {
    // Unique identity for this connection
    let conn = uuid::Uuid::new_v4().to_string();
    metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Register before opening so the ack has somewhere to go
    let mut rx = transport.register(&conn);

    let sender_task = async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    };

    if bridge.on_open(&conn).await == ConnectionState::Unassigned {
        metrics.session_rejected();
    }

    let input_task = async {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    metrics.message_received();
                    let outcome = bridge.on_text(&conn, &text).await;
                    record_outcome(&metrics, &outcome);
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(conn = %conn, "Client socket error: {}", e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = sender_task => {},
        _ = input_task => {},
    }

    transport.unregister(&conn);
    if bridge.on_close(&conn).await == ConnectionState::Unassigned {
        info!(conn = %conn, "Closed connection held no slot");
    }
    metrics.connection_closed();
}

pub(crate) fn record_outcome(metrics: &ServerMetrics, outcome: &FrameOutcome) {
    if outcome.recovered {
        metrics.session_recovered();
    }
    match &outcome.error {
        Some(SessionError::MalformedMessage(_)) => metrics.malformed_frame(),
        Some(SessionError::UnknownSender(_)) => metrics.unknown_sender(),
        _ => {}
    }
}
