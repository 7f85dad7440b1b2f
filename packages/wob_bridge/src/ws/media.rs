//! Media host link
//!
//! The host media process attaches over `GET /api/media` and becomes the
//! bridge's [`MediaSession`]. Outbound calls are queued as JSON commands;
//! inbound host events drive the signaling relay's callbacks. One host is
//! attached at a time and a new attachment replaces the previous one.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use slot_session::{Bridge, MediaSession, Result, SdpKind, SessionError, SignalingRelay};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::metrics::ServerMetrics;

/// Bridge → media host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaCommand {
    Offer {
        connection_id: String,
        sdp: String,
    },
    Ice {
        connection_id: String,
        candidate: String,
        sdp_m_line_index: u32,
        sdp_mid: String,
    },
    SetLocalDescription {
        connection_id: String,
        kind: SdpKind,
        sdp: String,
    },
    Close {
        connection_id: String,
    },
}

/// Media host → bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    Offer {
        connection_id: String,
        sdp: String,
    },
    Answer {
        connection_id: String,
        sdp: String,
    },
    /// A missing or empty candidate ends the candidate list.
    Ice {
        connection_id: String,
        #[serde(default)]
        candidate: Option<String>,
        #[serde(default)]
        sdp_m_line_index: Option<u32>,
        #[serde(default)]
        sdp_mid: Option<String>,
    },
    ConnectionState {
        connection_id: String,
        state: String,
    },
    IceConnectionState {
        connection_id: String,
        state: String,
    },
}

struct Attachment {
    id: u64,
    tx: mpsc::Sender<String>,
}

pub struct MediaHostLink {
    current: Mutex<Option<Attachment>>,
    next_id: AtomicU64,
    capacity: usize,
    metrics: Arc<ServerMetrics>,
}

impl MediaHostLink {
    pub fn new(capacity: usize, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
            capacity,
            metrics,
        }
    }

    /// Attach a host, replacing any previous one. Returns the attachment id
    /// and the queue of commands for it.
    pub fn attach(&self) -> (u64, mpsc::Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        if let Some(previous) = self.current.lock().replace(Attachment { id, tx }) {
            info!(previous = previous.id, id, "Media host replaced");
        }
        (id, rx)
    }

    /// Detach `id` unless a newer host has already taken over.
    pub fn detach(&self, id: u64) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|a| a.id == id) {
            *current = None;
            info!(id, "Media host detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.current.lock().is_some()
    }

    fn dispatch(&self, command: MediaCommand) -> Result<()> {
        let tx = self
            .current
            .lock()
            .as_ref()
            .map(|a| a.tx.clone())
            .ok_or_else(|| SessionError::RelayUnavailable("no media host attached".into()))?;
        let json = serde_json::to_string(&command)
            .map_err(|e| SessionError::MalformedMessage(e.to_string()))?;
        tx.try_send(json)
            .map_err(|e| SessionError::RelayUnavailable(format!("media host queue: {}", e)))?;
        self.metrics.signaling_relayed();
        Ok(())
    }
}

impl MediaSession for MediaHostLink {
    fn offer(&self, connection_id: &str, sdp: &str) -> Result<()> {
        self.dispatch(MediaCommand::Offer {
            connection_id: connection_id.to_string(),
            sdp: sdp.to_string(),
        })
    }

    fn add_ice_candidate(
        &self,
        connection_id: &str,
        candidate: &str,
        line_index: u32,
        sdp_mid: &str,
    ) -> Result<()> {
        self.dispatch(MediaCommand::Ice {
            connection_id: connection_id.to_string(),
            candidate: candidate.to_string(),
            sdp_m_line_index: line_index,
            sdp_mid: sdp_mid.to_string(),
        })
    }

    fn set_local_description(&self, connection_id: &str, kind: SdpKind, sdp: &str) -> Result<()> {
        self.dispatch(MediaCommand::SetLocalDescription {
            connection_id: connection_id.to_string(),
            kind,
            sdp: sdp.to_string(),
        })
    }

    fn close(&self, connection_id: &str) -> Result<()> {
        self.dispatch(MediaCommand::Close {
            connection_id: connection_id.to_string(),
        })
    }
}

/// Feed one host event into the relay.
pub fn apply_host_event(relay: &SignalingRelay, event: HostEvent) -> Result<()> {
    match event {
        HostEvent::Offer { connection_id, sdp } => relay.on_offer(&connection_id, &sdp),
        HostEvent::Answer { connection_id, sdp } => relay.on_answer(&connection_id, &sdp),
        HostEvent::Ice {
            connection_id,
            candidate,
            sdp_m_line_index,
            sdp_mid,
        } => relay.on_ice_candidate(
            &connection_id,
            candidate.as_deref().unwrap_or_default(),
            sdp_m_line_index.unwrap_or(0),
            sdp_mid.as_deref().unwrap_or_default(),
        ),
        HostEvent::ConnectionState {
            connection_id,
            state,
        } => relay
            .on_connection_state_change(&connection_id, &state)
            .map(|_| ()),
        HostEvent::IceConnectionState {
            connection_id,
            state,
        } => {
            relay.on_ice_connection_state_change(&connection_id, &state);
            Ok(())
        }
    }
}

/// Run one media host connection until either side closes.
pub async fn handle_media_ws(
    socket: WebSocket,
    bridge: Arc<Bridge>,
    link: Arc<MediaHostLink>,
    metrics: Arc<ServerMetrics>,
) {
    let (id, mut rx) = link.attach();
    info!(id, "Media host attached");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let sender_task = async move {
        while let Some(json) = rx.recv().await {
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    let input_task = async {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let event = match serde_json::from_str::<HostEvent>(&text) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(id, "Ignoring malformed media host message: {}", e);
                            continue;
                        }
                    };
                    metrics.signaling_relayed();
                    if let Err(e) = apply_host_event(bridge.relay(), event) {
                        warn!(id, "Media host event not delivered: {}", e);
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(id, "Media host socket error: {}", e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = sender_task => {},
        _ = input_task => {},
    }

    link.detach(id);
}
