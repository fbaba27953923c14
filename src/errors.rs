use crate::services::{metadata_store::StoreError, upload_pipeline::PipelineError};
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use std::fmt;

/// HTTP-facing error: a status plus the JSON envelope `{error, details?, code?}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
    pub code: Option<String>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            details: None,
            code: None,
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
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
        let mut body = Map::new();
        body.insert("error".into(), json!(self.message));
        if let Some(details) = self.details {
            body.insert("details".into(), json!(details));
        }
        if let Some(code) = self.code {
            body.insert("code".into(), json!(code));
        }

        (self.status, Json(Value::Object(body))).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        if err.is_client_error() {
            return AppError::bad_request(err.to_string());
        }
        AppError::internal("Upload failed")
            .with_details(err.to_string())
            .with_code(err.code())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::internal("Database operation failed").with_details(err.to_string())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::bad_request(format!("Invalid upload form: {}", err.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_bad_request_without_code() {
        let err = AppError::from(PipelineError::MissingFile);
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "No file uploaded");
        assert!(err.code.is_none());
    }

    #[test]
    fn transfer_errors_carry_details_and_code() {
        let err = AppError::from(PipelineError::from(
            crate::services::transfer_client::TransferError::NotConnected,
        ));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Upload failed");
        assert_eq!(err.code.as_deref(), Some("NOT_CONNECTED"));
        assert!(err.details.unwrap().contains("no open transfer session"));
    }
}
