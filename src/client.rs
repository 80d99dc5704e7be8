use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::capture::{CaptureSession, LocationError, LocationProvider, PendingMedia, GEOLOCATION_TIMEOUT};
use crate::models::{SosAlert, SosLocation, UploadResponse};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Rejected(String),
    #[error("Error getting location: {0}")]
    Location(#[from] LocationError),
}

/// Free-text part of a report; media and location come from the session.
#[derive(Debug, Clone, Default)]
pub struct ReportDetails {
    pub crime_type: String,
    pub description: String,
}

pub struct IngestClient {
    base_url: String,
    http: reqwest::Client,
}

impl IngestClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self::with_client(base_url, http))
    }

    pub fn with_client(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Posts the session's media and location to `/upload`. The session is
    /// reset only when the server reports success, so a failed submission
    /// can be retried as is.
    pub async fn submit_report(
        &self,
        session: &mut CaptureSession,
        details: &ReportDetails,
    ) -> Result<UploadResponse, ClientError> {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let form = report_form(session, details, &timestamp)?;

        tracing::info!(
            "Submitting report to {} ({} photos, video: {})",
            self.base_url,
            session.photos().len(),
            session.video().is_some()
        );
        let response = self
            .http
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;
        let body: Value = response.json().await?;
        check_success(&body, "Failed to upload files")?;

        let uploaded: UploadResponse = serde_json::from_value(body)
            .map_err(|e| ClientError::Rejected(format!("Unexpected upload response: {}", e)))?;
        session.reset();
        Ok(uploaded)
    }

    /// Takes a fresh position and posts it to `/sos`.
    pub async fn send_sos(&self, provider: &dyn LocationProvider) -> Result<SosAlert, ClientError> {
        let position = provider.current_position(GEOLOCATION_TIMEOUT)?;
        let alert = SosAlert {
            location: SosLocation {
                lat: position.latitude,
                lng: position.longitude,
            },
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        tracing::info!("Sending SOS to {}", self.base_url);
        let response = self
            .http
            .post(format!("{}/sos", self.base_url))
            .json(&alert)
            .send()
            .await?;
        let body: Value = response.json().await?;
        check_success(&body, "Failed to send SOS")?;
        Ok(alert)
    }
}

fn report_form(
    session: &CaptureSession,
    details: &ReportDetails,
    timestamp: &str,
) -> Result<Form, ClientError> {
    let position = session.location().position();
    let coordinate = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();

    let mut form = Form::new()
        .text("crime-type", details.crime_type.clone())
        .text("description", details.description.clone())
        .text("latitude", coordinate(position.map(|p| p.latitude)))
        .text("longitude", coordinate(position.map(|p| p.longitude)))
        .text("location", session.location().to_string())
        .text("timestamp", timestamp.to_string());

    for photo in session.photos() {
        form = form.part("photos", media_part(photo)?);
    }
    if let Some(video) = session.video() {
        form = form.part("video", media_part(video)?);
    }
    Ok(form)
}

fn media_part(media: &PendingMedia) -> Result<Part, ClientError> {
    Ok(Part::bytes(media.bytes.clone())
        .file_name(media.filename.clone())
        .mime_str(&media.content_type)?)
}

fn check_success(body: &Value, fallback: &str) -> Result<(), ClientError> {
    if body.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    let message = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string();
    Err(ClientError::Rejected(message))
}

/// Content type for a media file, by extension.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "webm" => "video/webm",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}
