use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;
use crate::metrics;

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let capacity = state.bridge.capacity().await;
    let bound = state.bridge.sessions().len() as u64;
    let free = state.bridge.free_slots().len() as u64;
    let metrics = state.metrics.snapshot();

    let status = if free > 0 { "healthy" } else { "full" };

    Json(metrics::HealthStatus {
        status: status.to_string(),
        slots: metrics::SlotHealth {
            capacity,
            bound,
            free,
        },
        connections: state.transport.connection_count() as u64,
        media_host_attached: state.media.is_attached(),
        uptime_secs: metrics.uptime_secs,
    })
}

/// Metrics endpoint - returns detailed server metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, http::StatusCode, routing::get};
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_slots() {
        let (state, _tmp) = crate::test_helpers::test_app_state(3).await;
        state.bridge.on_open("a").await;

        let app = Router::new()
            .route("/health", get(health_handler))
            .with_state(state);
        let json = get_json(app, "/health").await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["slots"]["capacity"], 3);
        assert_eq!(json["slots"]["bound"], 1);
        assert_eq!(json["slots"]["free"], 2);
        assert_eq!(json["media_host_attached"], false);
    }

    #[tokio::test]
    async fn test_health_full_when_no_slot_free() {
        let (state, _tmp) = crate::test_helpers::test_app_state(1).await;
        state.bridge.on_open("a").await;

        let app = Router::new()
            .route("/health", get(health_handler))
            .with_state(state);
        assert_eq!(get_json(app, "/health").await["status"], "full");
    }

    #[tokio::test]
    async fn test_live_and_metrics() {
        let (state, _tmp) = crate::test_helpers::test_app_state(2).await;
        state.metrics.connection_opened();

        let app = Router::new()
            .route("/health/live", get(health_live_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state);

        assert_eq!(get_json(app.clone(), "/health/live").await["status"], "alive");
        let json = get_json(app, "/metrics").await;
        assert_eq!(json["connections"]["active"], 1);
        assert_eq!(json["messages"]["dropped"], 0);
    }
}
