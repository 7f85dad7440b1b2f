//! Server metrics for observability

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently open client WebSockets
    pub active_connections: AtomicU64,
    /// Total client connections since server start
    pub total_connections: AtomicU64,

    // Session metrics
    /// Opens turned away because every slot was taken
    pub sessions_rejected: AtomicU64,
    /// Unbound senders given a slot on their next frame
    pub sessions_recovered: AtomicU64,

    // Message metrics
    /// Text frames received from clients
    pub messages_received: AtomicU64,
    /// Frames queued to clients
    pub messages_sent: AtomicU64,
    /// Frames dropped because the connection's queue was full or gone
    pub messages_dropped: AtomicU64,
    /// Frames that failed to decode
    pub malformed_frames: AtomicU64,
    /// Frames dropped because the sender had no slot and none was free
    pub unknown_senders: AtomicU64,

    // Signaling metrics
    /// Messages exchanged with the media host, both directions
    pub signaling_relayed: AtomicU64,

    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn session_rejected(&self) {
        self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_recovered(&self) {
        self.sessions_recovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_sender(&self) {
        self.unknown_senders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn signaling_relayed(&self) {
        self.signaling_relayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            sessions: SessionMetrics {
                rejected: self.sessions_rejected.load(Ordering::Relaxed),
                recovered: self.sessions_recovered.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                sent: self.messages_sent.load(Ordering::Relaxed),
                dropped: self.messages_dropped.load(Ordering::Relaxed),
                malformed: self.malformed_frames.load(Ordering::Relaxed),
                unknown_sender: self.unknown_senders.load(Ordering::Relaxed),
            },
            signaling_relayed: self.signaling_relayed.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub sessions: SessionMetrics,
    pub messages: MessageMetrics,
    pub signaling_relayed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub rejected: u64,
    pub recovered: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
    pub malformed: u64,
    pub unknown_sender: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub slots: SlotHealth,
    pub connections: u64,
    pub media_host_attached: bool,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotHealth {
    pub capacity: u16,
    pub bound: u64,
    pub free: u64,
}
