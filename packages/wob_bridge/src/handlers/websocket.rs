use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::AppState;
use crate::ws;

/// GET /: One phone per socket. Phones dial the bare discovery URL.
pub async fn client_websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let bridge = state.bridge.clone();
    let transport = state.transport.clone();
    let metrics = state.metrics.clone();

    ws.on_upgrade(move |socket| ws::handle_client_ws(socket, bridge, transport, metrics))
}

/// GET /api/media: Attach the host media process.
pub async fn media_websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let bridge = state.bridge.clone();
    let link = state.media.clone();
    let metrics = state.metrics.clone();

    ws.on_upgrade(move |socket| ws::handle_media_ws(socket, bridge, link, metrics))
}
