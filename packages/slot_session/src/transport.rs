use crate::error::Result;

/// Outbound half of the host transport: push one text frame to a connection.
///
/// Implementations must not block; a full or closed connection is reported
/// as an error and the frame is dropped.
pub trait ClientTransport: Send + Sync {
    fn send_text(&self, conn: &str, text: String) -> Result<()>;
}

/// Kind of session description handed to the media subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Native session API of the host media subsystem, keyed by connection id
/// (the slot number as a string). Every call is fire-and-forget.
pub trait MediaSession: Send + Sync {
    /// Apply a remote offer and start producing an answer.
    fn offer(&self, connection_id: &str, sdp: &str) -> Result<()>;
    fn add_ice_candidate(
        &self,
        connection_id: &str,
        candidate: &str,
        line_index: u32,
        sdp_mid: &str,
    ) -> Result<()>;
    fn set_local_description(&self, connection_id: &str, kind: SdpKind, sdp: &str) -> Result<()>;
    /// Tear down the media session for a released slot.
    fn close(&self, connection_id: &str) -> Result<()>;
}
