//! WebSocket endpoints: phones on one side, the media host on the other.

mod client;
pub(crate) mod media;

pub use client::handle_client_ws;
pub use media::{MediaHostLink, handle_media_ws};
