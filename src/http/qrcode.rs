//! `GET /api/sessions/{id}/qrcode` — a join link and its QR code, the Rust
//! equivalent of the Python reference's `services/qrcode.py` collaborator.

use crate::error::EngineError;
use crate::repo;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageEncoder, Luma};
use qrcode::QrCode;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct QrCodeQuery {
    pub base_url: Option<String>,
}

pub async fn session_qrcode(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<QrCodeQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let session = repo::get_session(&state.pool, &session_id)
        .await?
        .ok_or_else(|| EngineError::NotFound("session not found".to_owned()))?;

    let base_url = query.base_url.as_deref().unwrap_or(state.config.base_url.as_str());
    let join_url = format!("{base_url}/join/{}", session.join_code);

    let code = QrCode::new(join_url.as_bytes())
        .map_err(|e| EngineError::Validation(format!("failed to encode QR code: {e}")))?;
    let image = code.render::<Luma<u8>>().build();

    let mut png_bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut png_bytes)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::L8,
        )
        .map_err(|e| EngineError::Validation(format!("failed to render QR PNG: {e}")))?;

    let png_base64 = STANDARD.encode(&png_bytes);

    Ok(Json(serde_json::json!({
        "code": session.join_code,
        "join_url": join_url,
        "qr_base64": png_base64,
    })))
}
