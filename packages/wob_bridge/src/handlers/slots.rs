//! Read-only view of the device tables for downstream consumers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use slot_session::{SensorRow, Slot, TouchPoint, store::keys};

use crate::AppState;

/// GET /api/slots: Every sensor row, ordered by slot.
pub async fn list_slots(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bridge.device().sink().sensor_rows())
}

#[derive(Serialize)]
pub struct SlotDetail {
    #[serde(flatten)]
    pub row: SensorRow,
    /// Identity currently bound to the slot
    pub conn: Option<String>,
    pub touches: Vec<TouchPoint>,
}

/// GET /api/slots/{slot}
pub async fn get_slot(
    State(state): State<AppState>,
    Path(slot): Path<u16>,
) -> Result<impl IntoResponse, StatusCode> {
    if slot == 0 {
        return Err(StatusCode::BAD_REQUEST);
    }
    let slot = Slot(slot);
    let device = state.bridge.device();
    let conn = state.bridge.identity_of(slot);

    if slot.0 > state.bridge.capacity().await && conn.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(SlotDetail {
        row: device.snapshot(slot),
        conn,
        touches: device.touches(slot),
    }))
}

/// GET /api/url: Discovery URL phones should open.
pub async fn get_url(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let url: String = state
        .bridge
        .store()
        .fetch(keys::URL)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(serde_json::json!({ "url": url })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing};
    use tower::ServiceExt;

    async fn test_router(max_clients: u16) -> (Router, AppState, tempfile::TempDir) {
        let (state, tmp) = crate::test_helpers::test_app_state(max_clients).await;
        let router = Router::new()
            .route("/slots", routing::get(list_slots))
            .route("/slots/{slot}", routing::get(get_slot))
            .route("/url", routing::get(get_url))
            .with_state(state.clone());
        (router, state, tmp)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_list_slots_ordered() {
        let (app, state, _tmp) = test_router(4).await;
        for conn in ["a", "b", "c"] {
            state.bridge.on_open(conn).await;
        }
        state.bridge.on_close("b").await;

        let (status, json) = get(app, "/slots").await;
        assert_eq!(status, StatusCode::OK);
        let slots: Vec<u64> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["slot"].as_u64().unwrap())
            .collect();
        assert_eq!(slots, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_get_slot_detail() {
        let (app, state, _tmp) = test_router(2).await;
        state.bridge.on_open("a").await;
        state
            .bridge
            .on_text("a", r#"{"type":"touch","count":1,"t0x":0.25,"t0y":0.75,"t0s":1}"#)
            .await;
        state
            .bridge
            .on_text("a", r#"{"type":"sensor","oa":90}"#)
            .await;

        let (status, json) = get(app, "/slots/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["conn"], "a");
        assert_eq!(json["connected"], true);
        assert_eq!(json["oa"], 90.0);
        assert_eq!(json["touch_count"], 1);
        assert_eq!(json["touches"][0]["x"], 0.25);
    }

    #[tokio::test]
    async fn test_get_slot_unbound_and_out_of_range() {
        let (app, _state, _tmp) = test_router(2).await;

        let (status, json) = get(app.clone(), "/slots/2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["connected"], false);
        assert!(json["conn"].is_null());

        let (status, _) = get(app.clone(), "/slots/9").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get(app, "/slots/0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_url() {
        let (app, state, _tmp) = test_router(2).await;
        let (status, _) = get(app.clone(), "/url").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        state
            .bridge
            .store()
            .put(keys::URL, &"http://10.0.0.2:9980")
            .unwrap();
        let (status, json) = get(app, "/url").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["url"], "http://10.0.0.2:9980");
    }
}
