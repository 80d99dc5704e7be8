use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        Multipart, State,
    },
    http::{header, HeaderMap},
    response::Json,
};
use chrono::{SecondsFormat, Utc};

use crate::app_state::AppState;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{ReportForm, UploadResponse};
use crate::storage::{MediaWriter, StoredMedia};

pub const PHOTOS_FIELD: &str = "photos";
pub const VIDEO_FIELD: &str = "video";
const MAX_VIDEOS: usize = 1;
/// Cap on a single non-file form value.
pub const MAX_FIELD_BYTES: usize = 1024 * 1024;

/// POST /upload
///
/// Streams `photos` and `video` parts into the uploads directory, then writes
/// the report JSON referencing them.
pub async fn upload_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let result = match multipart {
        Ok(mut multipart) => receive_upload(&state, &headers, &mut multipart).await,
        Err(rejection) => Err(ApiError::Multipart(rejection.body_text())),
    };
    match result {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            tracing::error!("Error uploading files: {}", e);
            Err(e)
        }
    }
}

async fn receive_upload(
    state: &AppState,
    headers: &HeaderMap,
    multipart: &mut Multipart,
) -> Result<UploadResponse, ApiError> {
    let mut form = ReportForm::default();
    let mut photos: Vec<StoredMedia> = Vec::new();
    let mut video: Option<StoredMedia> = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();

        let Some(original_name) = field.file_name().map(str::to_string) else {
            let value = read_text(&name, &mut field).await?;
            if !form.set(&name, value) {
                tracing::debug!("Ignoring unknown form field '{}'", name);
            }
            continue;
        };

        match name.as_str() {
            PHOTOS_FIELD if photos.len() >= state.config.max_photos => {
                return Err(ApiError::TooManyFiles {
                    field: name.clone(),
                    max: state.config.max_photos,
                });
            }
            VIDEO_FIELD if video.is_some() => {
                return Err(ApiError::TooManyFiles {
                    field: name.clone(),
                    max: MAX_VIDEOS,
                });
            }
            PHOTOS_FIELD | VIDEO_FIELD => {}
            _ => return Err(ApiError::UnexpectedField(name.clone())),
        }

        let stored = save_file(state, &name, &original_name, &mut field).await?;
        tracing::debug!(
            "Stored {} '{}' as {} ({} bytes)",
            name,
            original_name,
            stored.filename,
            stored.size
        );
        if name == PHOTOS_FIELD {
            photos.push(stored);
        } else {
            video = Some(stored);
        }
    }

    let base = public_base_url(&state.config, headers);
    let photo_urls: Vec<String> = photos
        .iter()
        .map(|p| media_url(&base, &p.filename))
        .collect();
    let video_url = video.as_ref().map(|v| media_url(&base, &v.filename));

    let received_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let report = form.into_report(photo_urls, video_url, &received_at);
    let path = state.store.write_report(&report).await?;

    tracing::info!(
        "Saved report {} ({} photos, video: {})",
        path.display(),
        report.photo_urls.len(),
        report.video_url.is_some()
    );

    Ok(UploadResponse {
        success: true,
        photo_urls: report.photo_urls,
        video_url: report.video_url,
    })
}

async fn read_text(name: &str, field: &mut Field<'_>) -> Result<String, ApiError> {
    let mut value = Vec::new();
    while let Some(chunk) = field.chunk().await? {
        if value.len() + chunk.len() > MAX_FIELD_BYTES {
            return Err(ApiError::FieldTooLarge {
                name: name.to_string(),
                max: MAX_FIELD_BYTES,
            });
        }
        value.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&value).into_owned())
}

async fn save_file(
    state: &AppState,
    field_name: &str,
    original_name: &str,
    field: &mut Field<'_>,
) -> Result<StoredMedia, ApiError> {
    let max = state.config.max_file_bytes;
    let mut writer = state.store.create_media(field_name, original_name).await?;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                discard(writer).await;
                return Err(e.into());
            }
        };

        if writer.written() + chunk.len() as u64 > max {
            discard(writer).await;
            return Err(ApiError::FileTooLarge {
                name: original_name.to_string(),
                max,
            });
        }

        if let Err(e) = writer.write_chunk(&chunk).await {
            discard(writer).await;
            return Err(e.into());
        }
    }

    Ok(writer.finish().await?)
}

async fn discard(writer: MediaWriter) {
    let filename = writer.filename().to_string();
    if let Err(e) = writer.discard().await {
        tracing::warn!("Failed to remove partial upload {}: {}", filename, e);
    }
}

/// Base that stored media URLs hang off: the configured public URL, else the
/// scheme and host the client used.
pub fn public_base_url(config: &Config, headers: &HeaderMap) -> String {
    if let Some(base) = &config.public_base_url {
        return base.trim_end_matches('/').to_string();
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty());

    match host {
        Some(host) => {
            let scheme = headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .filter(|s| *s == "http" || *s == "https")
                .unwrap_or("http");
            format!("{}://{}", scheme, host)
        }
        None => format!("http://localhost:{}", config.port),
    }
}

pub fn media_url(base: &str, filename: &str) -> String {
    format!("{}/uploads/{}", base, filename)
}
