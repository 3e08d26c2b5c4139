use crate::{
    models::resize_request::{ParseError, html_escape},
    services::{image_service::ImageError, storage_service::StorageError},
};
use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A request-scoped failure: the status to answer with and a short message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Send `message` as `text/plain` instead of the JSON envelope.
    pub plain: bool,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            plain: false,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 504 when a pipeline stage runs out of time.
    pub fn timeout(stage: &str) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, format!("{stage} timed out"))
    }

    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.plain {
            return (
                self.status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                self.message,
            )
                .into_response();
        }

        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::MissingArguments { path } => Self {
                status: StatusCode::BAD_REQUEST,
                message: format!("Missing some arguments, {:?}", html_escape(&path)),
                plain: true,
            },
            other => AppError::new(StatusCode::BAD_REQUEST, other.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let status = match &err {
            StorageError::NotFound { .. } => StatusCode::NOT_FOUND,
            StorageError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            StorageError::Transient(_) | StorageError::Decompress(_) => StatusCode::BAD_GATEWAY,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        let status = match &err {
            ImageError::UnsupportedFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ImageError::TooLarge { .. } => StatusCode::BAD_REQUEST,
            ImageError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ImageError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}
