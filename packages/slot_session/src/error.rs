use crate::slot_pool::Slot;

/// Errors raised by the session core.
///
/// None of these are fatal: the bridge converts every one of them into a
/// log line at the boundary of the dispatch branch that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Every slot in the pool is assigned.
    #[error("capacity exceeded: all {capacity} slots in use")]
    CapacityExceeded { capacity: u16 },

    /// The connection identity has no slot.
    #[error("no slot bound to connection {0}")]
    NotFound(String),

    /// A text frame could not be decoded into a protocol message.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A frame arrived from an unbound identity and no slot was free.
    #[error("unknown sender {0} and no free slot")]
    UnknownSender(String),

    /// The tabular sink rejected or could not take a write.
    #[error("tabular sink unavailable: {0}")]
    SinkUnavailable(String),

    /// The media subsystem or the client link for a relay is missing.
    #[error("signaling relay unavailable: {0}")]
    RelayUnavailable(String),

    /// The durable state store failed to persist a value.
    #[error("state store error: {0}")]
    Store(String),

    /// A slot outside the pool was handed back.
    #[error("slot {0} is not part of this pool")]
    InvalidSlot(Slot),
}

pub type Result<T> = std::result::Result<T, SessionError>;
