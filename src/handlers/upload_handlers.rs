//! HTTP handlers for publishing images.
//! Collects the multipart form and delegates every step to `UploadPipeline`.

use crate::{
    errors::AppError,
    models::remote::RemoteEntry,
    services::upload_pipeline::{UploadRequest, UploadedFile},
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::json;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub data: UploadData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    pub id: i64,
    pub title: String,
    pub filename: String,
    pub url: String,
    pub original_url: String,
    pub ftp_path: String,
    #[serde(rename = "type")]
    pub image_type: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectionCheckResponse {
    pub success: bool,
    pub message: String,
    pub path: String,
    pub files: Vec<RemoteEntry>,
}

/// `POST /upload` — multipart fields `image`, `title`, `description`,
/// `category`, `type`.
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let request = read_upload_form(multipart).await?;
    let published = state.pipeline.publish(request).await?;

    Ok(Json(UploadResponse {
        success: true,
        message: "Image uploaded successfully".into(),
        data: UploadData {
            id: published.id,
            title: published.title,
            filename: published.filename,
            url: published.url,
            original_url: published.original_url,
            ftp_path: published.remote_path,
            image_type: published.image_type,
            timestamp: published
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        },
    }))
}

/// `GET /upload` — open a session, list the uploads directory, close it.
pub async fn check_connection(State(state): State<AppState>) -> Response {
    let path = state.pipeline.remote_base().to_string();
    match state.pipeline.check_connection().await {
        Ok(files) => Json(ConnectionCheckResponse {
            success: true,
            message: "FTP connection successful".into(),
            path,
            files,
        })
        .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "ftp connection check failed");
            let body = json!({
                "success": false,
                "error": "FTP connection failed",
                "details": err.to_string(),
                "config": {
                    "host": state.ftp.host,
                    "user": state.ftp.user,
                    "port": state.ftp.port,
                },
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadRequest, AppError> {
    let mut request = UploadRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or(FALLBACK_CONTENT_TYPE)
                    .to_string();
                let bytes = field.bytes().await?;
                request.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            "title" => request.title = Some(field.text().await?),
            "description" => request.description = Some(field.text().await?),
            "category" => request.category = Some(field.text().await?),
            "type" => request.image_type = Some(field.text().await?),
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    Ok(request)
}
