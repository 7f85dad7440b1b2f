//! Recording fakes for the transport and media capabilities.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Result, SessionError};
use crate::transport::{ClientTransport, MediaSession, SdpKind};

#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<(String, Value)>>,
    closed: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames sent to `conn`, decoded.
    pub fn sent_to(&self, conn: &str) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|(c, _)| c == conn)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn all(&self) -> Vec<(String, Value)> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// Make further sends to `conn` fail.
    pub fn close(&self, conn: &str) {
        self.closed.lock().insert(conn.to_string());
    }
}

impl ClientTransport for RecordingTransport {
    fn send_text(&self, conn: &str, text: String) -> Result<()> {
        if self.closed.lock().contains(conn) {
            return Err(SessionError::RelayUnavailable(format!("{} closed", conn)));
        }
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| SessionError::MalformedMessage(e.to_string()))?;
        self.sent.lock().push((conn.to_string(), value));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MediaCall {
    Offer(String, String),
    Ice(String, String, u32, String),
    LocalDescription(String, SdpKind, String),
    Close(String),
}

#[derive(Default)]
pub(crate) struct RecordingMedia {
    calls: Mutex<Vec<MediaCall>>,
    failing: AtomicBool,
}

impl RecordingMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn record(&self, call: MediaCall) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SessionError::RelayUnavailable("media subsystem down".into()));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl MediaSession for RecordingMedia {
    fn offer(&self, connection_id: &str, sdp: &str) -> Result<()> {
        self.record(MediaCall::Offer(connection_id.into(), sdp.into()))
    }

    fn add_ice_candidate(
        &self,
        connection_id: &str,
        candidate: &str,
        line_index: u32,
        sdp_mid: &str,
    ) -> Result<()> {
        self.record(MediaCall::Ice(
            connection_id.into(),
            candidate.into(),
            line_index,
            sdp_mid.into(),
        ))
    }

    fn set_local_description(&self, connection_id: &str, kind: SdpKind, sdp: &str) -> Result<()> {
        self.record(MediaCall::LocalDescription(
            connection_id.into(),
            kind,
            sdp.into(),
        ))
    }

    fn close(&self, connection_id: &str) -> Result<()> {
        self.record(MediaCall::Close(connection_id.into()))
    }
}
