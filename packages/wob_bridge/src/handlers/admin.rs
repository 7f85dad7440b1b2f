use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{error, info};

use crate::AppState;
use crate::config::read_file_config;

/// POST /api/config/reload: Re-read config.toml and env, push the new
/// `config` message to every assigned session.
pub async fn reload_config_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    let fc = read_file_config(&state.config.data_dir).map_err(|e| {
        error!("Config reload failed: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    info!(
        "Config reload requested ({})",
        state.config.config_toml_path().display()
    );
    let sessions = state.bridge.apply_settings(fc.bridge).await;

    Ok(Json(serde_json::json!({
        "ok": true,
        "sessions": sessions,
    })))
}

/// POST /api/admin/reinit: Rebuild the session core over the same durable
/// state, picking up a new slot capacity. Open sockets stay open.
pub async fn reinit_handler(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let fc = read_file_config(&state.config.data_dir).map_err(|e| {
        error!("Config reload failed: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    info!("Core reinitialization requested");
    if let Err(e) = state.bridge.reinitialize(fc.bridge).await {
        error!("Core reinitialization failed: {}", e);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    Ok(Json(serde_json::json!({
        "ok": true,
        "capacity": state.bridge.capacity().await,
        "bound": state.bridge.sessions().len(),
    })))
}
