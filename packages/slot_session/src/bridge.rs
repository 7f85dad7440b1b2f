//! Connection Lifecycle Controller
//!
//! Drives the per-connection protocol state machine:
//!
//! ```text
//! UNASSIGNED ──open/bind ok──▶ ASSIGNED ──close──▶ RELEASED
//!     │  ▲                        ▲
//!     │  └─open/capacity──┘       │
//!     └──frame, free slot (recovery)
//! ```
//!
//! A connection's state is derived from the session table, not kept here,
//! so reinitializing the core in place leaves live connections where they
//! were.
//! No method returns an error to the transport: every failure is logged
//! and the event dropped.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::device::{DeviceStateStore, TabularSink};
use crate::error::{Result, SessionError};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session_table::SessionTable;
use crate::settings::{BridgeSettings, ConfigPayload};
use crate::signaling::SignalingRelay;
use crate::slot_pool::Slot;
use crate::store::StateStore;
use crate::transport::{ClientTransport, MediaSession};

/// Protocol state of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unassigned,
    Assigned(Slot),
    /// Terminal: the connection closed and handed this slot back.
    Released(Slot),
}

impl ConnectionState {
    pub fn slot(self) -> Option<Slot> {
        match self {
            Self::Assigned(slot) => Some(slot),
            _ => None,
        }
    }
}

/// What happened to one inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub state: ConnectionState,
    /// The sender had no slot and was bound by this frame.
    pub recovered: bool,
    /// Why the frame was dropped or only partly applied.
    pub error: Option<SessionError>,
}

impl FrameOutcome {
    fn dropped(state: ConnectionState, error: SessionError) -> Self {
        Self {
            state,
            recovered: false,
            error: Some(error),
        }
    }
}

/// The session core: slot pool, session table, device state and signaling.
pub struct Bridge {
    store: Arc<dyn StateStore>,
    table: SessionTable,
    device: DeviceStateStore,
    relay: SignalingRelay,
    transport: Arc<dyn ClientTransport>,
    settings: RwLock<BridgeSettings>,
}

impl Bridge {
    pub fn new(
        settings: BridgeSettings,
        store: Arc<dyn StateStore>,
        sink: Arc<dyn TabularSink>,
        transport: Arc<dyn ClientTransport>,
        media: Arc<dyn MediaSession>,
    ) -> Result<Self> {
        let table = SessionTable::open(store.clone(), settings.max_clients)?;
        info!(
            capacity = settings.max_clients,
            bound = store.slot_map().len(),
            "Session core ready"
        );
        Ok(Self {
            device: DeviceStateStore::new(sink, store.clone()),
            relay: SignalingRelay::new(store.clone(), transport.clone(), media),
            table,
            store,
            transport,
            settings: RwLock::new(settings),
        })
    }

    pub fn device(&self) -> &DeviceStateStore {
        &self.device
    }

    pub fn relay(&self) -> &SignalingRelay {
        &self.relay
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub async fn settings(&self) -> BridgeSettings {
        self.settings.read().await.clone()
    }

    pub async fn capacity(&self) -> u16 {
        self.table.capacity().await
    }

    /// Bound sessions ordered by slot.
    pub fn sessions(&self) -> Vec<(String, Slot)> {
        self.table.entries()
    }

    pub fn identity_of(&self, slot: Slot) -> Option<String> {
        self.table.identity_of(slot)
    }

    pub fn free_slots(&self) -> Vec<Slot> {
        self.table.free_slots()
    }

    pub fn state_of(&self, conn: &str) -> ConnectionState {
        match self.table.lookup(conn) {
            Ok(slot) => ConnectionState::Assigned(slot),
            Err(_) => ConnectionState::Unassigned,
        }
    }

    // ── transport events ───────────────────────────────────────────────

    /// A transport connection opened.
    pub async fn on_open(&self, conn: &str) -> ConnectionState {
        match self.assign(conn).await {
            Ok(slot) => {
                info!(conn = %conn, slot = %slot, "Client connected");
                ConnectionState::Assigned(slot)
            }
            Err(e @ SessionError::CapacityExceeded { .. }) => {
                warn!(conn = %conn, "Rejecting client: {}", e);
                self.send(
                    conn,
                    &ServerMessage::Rejected {
                        reason: e.to_string(),
                    },
                );
                ConnectionState::Unassigned
            }
            Err(e) => {
                warn!(conn = %conn, "Failed to bind client: {}", e);
                ConnectionState::Unassigned
            }
        }
    }

    /// A text frame arrived.
    pub async fn on_text(&self, conn: &str, text: &str) -> FrameOutcome {
        let msg = match ClientMessage::parse(text) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(conn = %conn, "Dropping frame: {}", e);
                return FrameOutcome::dropped(self.state_of(conn), e);
            }
        };

        let (slot, recovered) = match self.state_of(conn) {
            ConnectionState::Assigned(slot) => (slot, false),
            _ => match self.recover(conn).await {
                Ok(slot) => (slot, true),
                Err(e) => {
                    warn!(conn = %conn, "Dropping frame: {}", e);
                    return FrameOutcome::dropped(ConnectionState::Unassigned, e);
                }
            },
        };

        let error = self.dispatch(slot, conn, msg).err();
        if let Some(ref e) = error {
            warn!(conn = %conn, slot = %slot, "Frame not applied: {}", e);
        }
        FrameOutcome {
            state: ConnectionState::Assigned(slot),
            recovered,
            error,
        }
    }

    /// A transport connection closed. Returns `Released` with the freed slot,
    /// or `Unassigned` when the connection held none.
    pub async fn on_close(&self, conn: &str) -> ConnectionState {
        let Ok(slot) = self.table.lookup(conn) else {
            return ConnectionState::Unassigned;
        };

        // Clear the slot before handing it back so a new client never sees stale rows
        if let Err(e) = self.device.reset(slot) {
            warn!(slot = %slot, "Failed to reset device state: {}", e);
        }
        match self.relay.clear(slot) {
            Ok(true) => debug!(slot = %slot, "Signaling session cleared"),
            Ok(false) => {}
            Err(e) => warn!(slot = %slot, "Failed to clear signaling session: {}", e),
        }
        if let Err(e) = self.table.unbind(conn).await {
            warn!(conn = %conn, slot = %slot, "Failed to release slot: {}", e);
            return ConnectionState::Assigned(slot);
        }

        info!(conn = %conn, slot = %slot, "Client disconnected");
        ConnectionState::Released(slot)
    }

    /// Release every bound session. For process start, when no connection
    /// from a previous run can still be open.
    pub async fn release_all(&self) -> usize {
        let mut released = 0;
        for (conn, _) in self.sessions() {
            if matches!(self.on_close(&conn).await, ConnectionState::Released(_)) {
                released += 1;
            }
        }
        released
    }

    // ── transitions ────────────────────────────────────────────────────

    /// UNASSIGNED → ASSIGNED: bind, publish the row, greet the client.
    async fn assign(&self, conn: &str) -> Result<Slot> {
        let binding = self.table.bind(conn).await?;
        if binding.newly_bound {
            if let Err(e) = self.device.connect(binding.slot) {
                warn!(slot = %binding.slot, "Failed to publish connected row: {}", e);
            }
        }
        self.send(conn, &ServerMessage::Ack { slot: binding.slot });
        let config = ConfigPayload::from(&*self.settings.read().await);
        self.send(conn, &ServerMessage::Config(config));
        Ok(binding.slot)
    }

    /// Frame from an identity with no slot, e.g. after the mapping was lost
    /// while the transport kept the connection open.
    async fn recover(&self, conn: &str) -> Result<Slot> {
        match self.assign(conn).await {
            Ok(slot) => {
                info!(conn = %conn, slot = %slot, "Recovered session for unknown sender");
                Ok(slot)
            }
            Err(SessionError::CapacityExceeded { .. }) => {
                Err(SessionError::UnknownSender(conn.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    fn dispatch(&self, slot: Slot, conn: &str, msg: ClientMessage) -> Result<()> {
        match msg {
            ClientMessage::Sensor(fields) => {
                self.device.upsert(slot, fields)?;
            }
            ClientMessage::Touch { points } => {
                self.device.upsert_touch(slot, points)?;
            }
            ClientMessage::Trigger => {
                self.device.set_trigger(slot)?;
                debug!(slot = %slot, "Trigger armed");
            }
            ClientMessage::Hello => {
                info!(slot = %slot, conn = %conn, "Hello from client");
            }
            ClientMessage::WebrtcOffer { sdp } => {
                self.relay.forward_offer(slot, conn, &sdp)?;
            }
            ClientMessage::WebrtcIce {
                candidate,
                sdp_m_line_index,
                sdp_mid,
            } => {
                self.relay
                    .forward_ice_candidate(slot, &candidate, sdp_m_line_index, &sdp_mid)?;
            }
            ClientMessage::Unknown(kind) => {
                debug!(slot = %slot, kind = %kind, "Ignoring unknown message type");
            }
        }
        Ok(())
    }

    // ── configuration ──────────────────────────────────────────────────

    /// Replace the settings and push the new `config` frame to every session.
    /// Returns the number of sessions reached.
    pub async fn apply_settings(&self, settings: BridgeSettings) -> usize {
        let capacity = self.capacity().await;
        if settings.max_clients != capacity {
            warn!(
                current = capacity,
                requested = settings.max_clients,
                "Slot capacity changes apply on the next core reinitialization"
            );
        }
        *self.settings.write().await = settings;
        self.broadcast_config().await
    }

    pub async fn broadcast_config(&self) -> usize {
        let config = ConfigPayload::from(&*self.settings.read().await);
        let msg = ServerMessage::Config(config);
        let mut reached = 0;
        for (conn, _) in self.sessions() {
            if self.send(&conn, &msg) {
                reached += 1;
            }
        }
        info!(sessions = reached, "Config pushed");
        reached
    }

    /// Reload the session table in place from the durable store, picking up
    /// a new capacity. Binds and unbinds already in flight finish first.
    /// Live connections are not touched.
    pub async fn reinitialize(&self, settings: BridgeSettings) -> Result<()> {
        let capacity = settings.max_clients;
        self.table.reopen(capacity).await?;
        *self.settings.write().await = settings;
        let bound = self.sessions().len();
        info!(capacity, bound, "Session core reinitialized");
        Ok(())
    }

    fn send(&self, conn: &str, msg: &ServerMessage) -> bool {
        let json = match msg.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize message: {}", e);
                return false;
            }
        };
        match self.transport.send_text(conn, json) {
            Ok(()) => true,
            Err(e) => {
                debug!(conn = %conn, "Send failed: {}", e);
                false
            }
        }
    }
}
