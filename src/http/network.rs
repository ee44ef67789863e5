//! `GET /api/network-info` — the advisory LAN address a presenter's QR
//! code or join link should point at, read once from `HOST_LAN_IP` at
//! startup since the process can't reliably discover its own LAN-facing
//! address from inside a container.

use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

pub async fn network_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "lan_ip": state.config.host_lan_ip.as_ref(),
    }))
}
