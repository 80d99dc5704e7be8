use axum::{body::Bytes, extract::State, response::Json};
use serde::Deserialize;
use serde_json::Value;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::{SosAlert, SosResponse};

/// POST /sos
pub async fn receive_sos(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SosResponse>, ApiError> {
    let alert = parse_body(&body).map_err(|e| {
        tracing::warn!("Rejected SOS body: {}", e);
        e
    })?;

    match SosAlert::deserialize(&alert) {
        Ok(typed) => tracing::info!(
            "SOS alert at lat={}, lng={} ({})",
            typed.location.lat,
            typed.location.lng,
            typed.timestamp
        ),
        Err(_) => tracing::warn!("SOS body does not match the alert shape; storing it as received"),
    }

    match state.store.write_sos(&alert).await {
        Ok(path) => {
            tracing::info!("Saved SOS alert {}", path.display());
            Ok(Json(SosResponse { success: true }))
        }
        Err(e) => {
            tracing::error!("Error saving SOS data: {}", e);
            Err(e.into())
        }
    }
}

/// An empty body stores as `{}`.
fn parse_body(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidJson(e.to_string()))
}
