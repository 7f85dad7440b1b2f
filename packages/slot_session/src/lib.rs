//! Slot Session - session core for slot-multiplexed mobile sensor bridges
//!
//! Each connected phone is bound to a small integer slot (1-based, smallest
//! free first). The slot keys everything downstream: one row in the sensor
//! table, a set of rows in the touch table, and one media signaling session.
//! All session state lives in a durable [`StateStore`], so the core can be
//! torn down and rebuilt without dropping live clients.
//!
//! The crate has no HTTP or WebSocket dependencies. The host supplies a
//! [`ClientTransport`] to push frames, a [`TabularSink`] for device rows and
//! a [`MediaSession`] for WebRTC, then feeds transport events into a
//! [`Bridge`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use slot_session::{Bridge, BridgeSettings, MemoryStore, MemoryTable};
//! # use slot_session::{ClientTransport, MediaSession, SdpKind, Result};
//! # struct Noop;
//! # impl ClientTransport for Noop {
//! #     fn send_text(&self, _: &str, _: String) -> Result<()> { Ok(()) }
//! # }
//! # impl MediaSession for Noop {
//! #     fn offer(&self, _: &str, _: &str) -> Result<()> { Ok(()) }
//! #     fn add_ice_candidate(&self, _: &str, _: &str, _: u32, _: &str) -> Result<()> { Ok(()) }
//! #     fn set_local_description(&self, _: &str, _: SdpKind, _: &str) -> Result<()> { Ok(()) }
//! #     fn close(&self, _: &str) -> Result<()> { Ok(()) }
//! # }
//!
//! #[tokio::main]
//! async fn main() {
//!     let bridge = Bridge::new(
//!         BridgeSettings::default(),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MemoryTable::new()),
//!         Arc::new(Noop),
//!         Arc::new(Noop),
//!     )
//!     .unwrap();
//!
//!     let state = bridge.on_open("conn-1").await;
//!     println!("conn-1 is {:?}", state);
//!
//!     bridge.on_text("conn-1", r#"{"type":"sensor","ax":0.4}"#).await;
//!     bridge.on_close("conn-1").await;
//! }
//! ```

mod bridge;
pub mod device;
mod error;
pub mod protocol;
mod session_table;
mod settings;
mod signaling;
mod slot_pool;
pub mod store;
mod transport;

#[cfg(test)]
mod test_helpers;

pub use bridge::{Bridge, ConnectionState, FrameOutcome};
pub use device::{DeviceStateStore, MemoryTable, SensorFields, SensorRow, TabularSink, TouchPoint};
pub use error::{Result, SessionError};
pub use protocol::{ClientMessage, MAX_TOUCH_POINTS, ServerMessage};
pub use session_table::{Binding, SessionTable};
pub use settings::{BridgeSettings, ConfigPayload};
pub use signaling::{SignalingRelay, TERMINAL_STATES};
pub use slot_pool::{DEFAULT_MAX_SLOTS, Slot, SlotPool};
pub use store::{JsonFileStore, MemoryStore, StateStore};
pub use transport::{ClientTransport, MediaSession, SdpKind};
