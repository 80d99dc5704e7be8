use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::ErrorResponse;
use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Failed to read multipart data: {0}")]
    Multipart(String),

    #[error("Too many files for field '{field}' (max {max})")]
    TooManyFiles { field: String, max: usize },

    #[error("Unexpected file field '{0}'")]
    UnexpectedField(String),

    #[error("File '{name}' exceeds the maximum size of {max} bytes")]
    FileTooLarge { name: String, max: u64 },

    #[error("Field '{name}' exceeds the maximum size of {max} bytes")]
    FieldTooLarge { name: String, max: usize },

    #[error("Request body too large: {0}")]
    RequestTooLarge(String),

    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Multipart(_)
            | ApiError::TooManyFiles { .. }
            | ApiError::UnexpectedField(_)
            | ApiError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            ApiError::FileTooLarge { .. }
            | ApiError::FieldTooLarge { .. }
            | ApiError::RequestTooLarge(_) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::Io(_) | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::RequestTooLarge(e.body_text())
        } else {
            ApiError::Multipart(e.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
