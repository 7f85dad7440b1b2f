//! Outbound frame routing for client WebSockets.
//!
//! Each socket registers a bounded queue drained by its sender task. Sends
//! never block: a full or closed queue drops the frame and reports an error
//! to the caller, which only affects that one connection.

use parking_lot::RwLock;
use slot_session::{ClientTransport, Result, SessionError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::metrics::ServerMetrics;

pub struct WsTransport {
    clients: RwLock<HashMap<String, mpsc::Sender<String>>>,
    capacity: usize,
    metrics: Arc<ServerMetrics>,
}

impl WsTransport {
    pub fn new(capacity: usize, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            capacity,
            metrics,
        }
    }

    /// Open an outbound queue for `conn`. The receiver feeds the socket.
    pub fn register(&self, conn: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.clients.write().insert(conn.to_string(), tx);
        rx
    }

    pub fn unregister(&self, conn: &str) {
        self.clients.write().remove(conn);
    }

    pub fn connection_count(&self) -> usize {
        self.clients.read().len()
    }
}

impl ClientTransport for WsTransport {
    fn send_text(&self, conn: &str, text: String) -> Result<()> {
        let tx = self.clients.read().get(conn).cloned().ok_or_else(|| {
            SessionError::RelayUnavailable(format!("connection {} is not open", conn))
        })?;
        match tx.try_send(text) {
            Ok(()) => {
                self.metrics.message_sent();
                Ok(())
            }
            Err(e) => {
                self.metrics.message_dropped();
                debug!(conn = %conn, "Dropping outbound frame: {}", e);
                Err(SessionError::RelayUnavailable(format!(
                    "connection {} cannot take frames: {}",
                    conn, e
                )))
            }
        }
    }
}
