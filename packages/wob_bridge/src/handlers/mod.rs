pub mod admin;
pub mod health;
pub mod slots;
pub mod websocket;

// Re-export all handlers for easy route registration
pub use admin::{reinit_handler, reload_config_handler};
pub use health::{health_handler, health_live_handler, metrics_handler};
pub use slots::{get_slot, get_url, list_slots};
pub use websocket::{client_websocket_handler, media_websocket_handler};
