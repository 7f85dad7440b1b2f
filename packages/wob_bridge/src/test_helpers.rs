use slot_session::{Bridge, BridgeSettings, MemoryStore, MemoryTable};
use std::sync::Arc;

use crate::AppState;
use crate::config::WobConfig;
use crate::metrics::ServerMetrics;
use crate::transport::WsTransport;
use crate::ws::MediaHostLink;

/// Build a fully-wired `AppState` over in-memory state and sink, with
/// `max_clients` slots.
///
/// Returns `(AppState, TempDir)`; the `TempDir` is the data directory and
/// must outlive the test so config reloads can find `config.toml`.
pub async fn test_app_state(max_clients: u16) -> (AppState, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = WobConfig::new(Some(tmp.path().to_path_buf())).expect("config");

    let metrics = Arc::new(ServerMetrics::new());
    let transport = Arc::new(WsTransport::new(16, metrics.clone()));
    let media = Arc::new(MediaHostLink::new(16, metrics.clone()));
    let bridge = Bridge::new(
        BridgeSettings {
            max_clients,
            ..Default::default()
        },
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryTable::new()),
        transport.clone(),
        media.clone(),
    )
    .expect("bridge");

    let state = AppState {
        bridge: Arc::new(bridge),
        transport,
        media,
        config: Arc::new(config),
        metrics,
    };

    (state, tmp)
}
