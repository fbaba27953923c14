//! Represents a published image and the row written for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of the `images` table.
///
/// A row is only written once both renditions (original and optimized) are on
/// the remote store. The pipeline never updates a row afterwards; the only
/// later mutation is a soft delete through `is_active`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ImageRecord {
    /// Store-assigned identifier.
    pub id: i64,

    /// Display title.
    pub title: String,

    pub description: String,

    /// Generated name of the original rendition.
    pub filename: String,

    /// Remote path of the optimized rendition.
    pub filepath: String,

    /// Public URL of the optimized rendition (what consumers display).
    pub url: String,

    /// Public URL of the unmodified original.
    pub original_url: String,

    /// Open label set, e.g. hero/service/product/client/general.
    pub category: String,

    /// Usage classification, e.g. hero/thumbnail/gallery.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub image_type: String,

    /// Only active rows are returned by listings.
    pub is_active: bool,

    /// When the row was created.
    pub uploaded_at: DateTime<Utc>,
}

/// Values supplied by the pipeline; `id`, `is_active` and `uploaded_at` are
/// assigned by the store.
#[derive(Clone, Debug)]
pub struct NewImageRecord {
    pub title: String,
    pub description: String,
    pub filename: String,
    pub filepath: String,
    pub url: String,
    pub original_url: String,
    pub category: String,
    pub image_type: String,
}

/// Optional exact-match filters for listings.
#[derive(Clone, Debug, Default)]
pub struct ImageFilter {
    pub image_type: Option<String>,
    pub category: Option<String>,
}
