//! Signaling Relay
//!
//! Translates between the client's JSON signaling frames and the media
//! subsystem's session API. The media side addresses sessions by connection
//! id (the slot number as a string); the client that owns a slot for relay
//! purposes is recorded when its first offer arrives.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::protocol::ServerMessage;
use crate::slot_pool::Slot;
use crate::store::{StateStore, keys};
use crate::transport::{ClientTransport, MediaSession, SdpKind};

/// Connection states worth telling the client about.
pub const TERMINAL_STATES: [&str; 3] = ["failed", "closed", "disconnected"];

pub struct SignalingRelay {
    store: Arc<dyn StateStore>,
    transport: Arc<dyn ClientTransport>,
    media: Arc<dyn MediaSession>,
}

impl SignalingRelay {
    pub fn new(
        store: Arc<dyn StateStore>,
        transport: Arc<dyn ClientTransport>,
        media: Arc<dyn MediaSession>,
    ) -> Self {
        Self {
            store,
            transport,
            media,
        }
    }

    // ── client → media ─────────────────────────────────────────────────

    /// Bind `conn` as the signaling peer of `slot` and hand the offer to the media subsystem.
    pub fn forward_offer(&self, slot: Slot, conn: &str, sdp: &str) -> Result<()> {
        self.store.put(&keys::signaling_conn(slot), &conn)?;
        self.media.offer(&slot.connection_id(), sdp)?;
        info!(slot = %slot, conn = %conn, "Offer forwarded to media subsystem");
        Ok(())
    }

    pub fn forward_ice_candidate(
        &self,
        slot: Slot,
        candidate: &str,
        line_index: u32,
        sdp_mid: &str,
    ) -> Result<()> {
        self.media
            .add_ice_candidate(&slot.connection_id(), candidate, line_index, sdp_mid)?;
        debug!(slot = %slot, line_index, "ICE candidate forwarded to media subsystem");
        Ok(())
    }

    /// Drop the signaling session of a released slot. Returns whether one existed.
    pub fn clear(&self, slot: Slot) -> Result<bool> {
        let key = keys::signaling_conn(slot);
        if self.store.get(&key).is_none() {
            return Ok(false);
        }
        self.store.remove(&key)?;
        if let Err(e) = self.media.close(&slot.connection_id()) {
            debug!(slot = %slot, "Media session close skipped: {}", e);
        }
        Ok(true)
    }

    /// Identity recorded for `slot` at offer time.
    pub fn peer_of(&self, slot: Slot) -> Option<String> {
        self.store.fetch(&keys::signaling_conn(slot))
    }

    // ── media → client ─────────────────────────────────────────────────

    /// Host-initiated offer.
    pub fn on_offer(&self, connection_id: &str, sdp: &str) -> Result<()> {
        self.media
            .set_local_description(connection_id, SdpKind::Offer, sdp)?;
        self.send(
            connection_id,
            &ServerMessage::WebrtcOffer {
                sdp: sdp.to_string(),
            },
        )
    }

    pub fn on_answer(&self, connection_id: &str, sdp: &str) -> Result<()> {
        self.media
            .set_local_description(connection_id, SdpKind::Answer, sdp)?;
        self.send(
            connection_id,
            &ServerMessage::WebrtcAnswer {
                sdp: sdp.to_string(),
            },
        )?;
        info!(connection_id, "Answer sent to client");
        Ok(())
    }

    /// Forward a host ICE candidate. An empty candidate ends the candidate list.
    pub fn on_ice_candidate(
        &self,
        connection_id: &str,
        candidate: &str,
        line_index: u32,
        sdp_mid: &str,
    ) -> Result<()> {
        let msg = if candidate.is_empty() {
            ServerMessage::end_of_candidates()
        } else {
            ServerMessage::WebrtcIce {
                candidate: Some(candidate.to_string()),
                sdp_m_line_index: Some(line_index),
                sdp_mid: Some(sdp_mid.to_string()),
            }
        };
        self.send(connection_id, &msg)
    }

    /// Returns whether the state was forwarded to the client.
    pub fn on_connection_state_change(&self, connection_id: &str, state: &str) -> Result<bool> {
        info!(connection_id, state, "Media connection state changed");
        if !TERMINAL_STATES.contains(&state) {
            return Ok(false);
        }
        self.send(
            connection_id,
            &ServerMessage::WebrtcState {
                state: state.to_string(),
            },
        )?;
        Ok(true)
    }

    pub fn on_ice_connection_state_change(&self, connection_id: &str, state: &str) {
        info!(connection_id, ice_state = state, "Media ICE connection state changed");
    }

    fn send(&self, connection_id: &str, msg: &ServerMessage) -> Result<()> {
        let slot = Slot::from_connection_id(connection_id).ok_or_else(|| {
            SessionError::RelayUnavailable(format!("invalid connection id {:?}", connection_id))
        })?;
        let conn = self.peer_of(slot).ok_or_else(|| {
            SessionError::RelayUnavailable(format!("no client bound for connection id {}", slot))
        })?;
        let json = msg
            .to_json()
            .map_err(|e| SessionError::MalformedMessage(e.to_string()))?;
        self.transport.send_text(&conn, json).inspect_err(|e| {
            warn!(slot = %slot, conn = %conn, "Relay send failed: {}", e);
        })
    }
}
