//! HTTP handlers for listing and retiring published images.

use crate::{
    errors::AppError,
    models::image::{ImageFilter, ImageRecord},
    services::metadata_store::DEFAULT_LIST_LIMIT,
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

/// Query params accepted by `GET /images`. Empty values count as absent.
#[derive(Debug, Deserialize)]
pub struct ListImagesQuery {
    #[serde(rename = "type")]
    pub image_type: Option<String>,
    pub category: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListImagesResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<ImageRecord>,
}

#[derive(Debug, Serialize)]
pub struct DeleteImageResponse {
    pub success: bool,
    pub message: String,
}

/// GET `/images` — active images, newest first, supports ?type=&category=&limit=
pub async fn list_images(
    State(state): State<AppState>,
    Query(q): Query<ListImagesQuery>,
) -> Result<Json<ListImagesResponse>, AppError> {
    let filter = ImageFilter {
        image_type: q.image_type.filter(|v| !v.is_empty()),
        category: q.category.filter(|v| !v.is_empty()),
    };
    let limit = q
        .limit
        .as_deref()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_LIST_LIMIT);

    let images = state.store.query(&filter, limit).await.map_err(|err| {
        tracing::error!(error = %err, "failed to fetch images");
        AppError::internal("Failed to fetch images").with_details(err.to_string())
    })?;

    Ok(Json(ListImagesResponse {
        success: true,
        count: images.len(),
        data: images,
    }))
}

/// DELETE `/images/{id}` — soft-delete an image record.
pub async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteImageResponse>, AppError> {
    if !state.store.deactivate(id).await? {
        return Err(AppError::not_found(format!("Image {} not found", id)));
    }
    tracing::info!(id, "image deactivated");
    Ok(Json(DeleteImageResponse {
        success: true,
        message: format!("Image {} deleted", id),
    }))
}
