//! src/services/upload_pipeline.rs
//!
//! UploadPipeline — publishes one uploaded image:
//!
//! `Received → Validated → Transformed → OriginalTransferred →
//! OptimizedTransferred → Recorded → Done`, or `Failed` from any step.
//!
//! Validation happens before any transfer session exists. Once a session is
//! opened it is closed on every path before the result is inspected, and the
//! metadata row is only written after both renditions are on the remote store.

use crate::{
    config::UrlConfig,
    models::{image::NewImageRecord, remote::RemoteEntry},
    services::{
        image_transform::{ImageOptimizer, OPTIMIZED_EXTENSION},
        metadata_store::{MetadataStore, StoreError},
        transfer_client::{TransferClient, TransferConnector, TransferError, join_remote},
    },
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Declared content types accepted for upload.
pub const ALLOWED_CONTENT_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
];

const ORIGINALS_DIR: &str = "originals";
const OPTIMIZED_DIR: &str = "optimized";
const DEFAULT_CATEGORY: &str = "general";
const DEFAULT_IMAGE_TYPE: &str = "hero";
const RANDOM_TOKEN_LEN: usize = 7;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No file uploaded")]
    MissingFile,
    #[error("Invalid file type: {0}. Only JPEG, PNG, WebP, GIF are allowed.")]
    UnsupportedType(String),
    #[error("File size {size} exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    #[error("remote store connection failed: {0}")]
    Connection(#[source] TransferError),
    #[error("remote store transfer failed: {0}")]
    Transfer(#[source] TransferError),
    #[error("failed to record image: {0}")]
    Persistence(#[from] StoreError),
}

impl PipelineError {
    /// True for errors caused by the request itself.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingFile | Self::UnsupportedType(_) | Self::TooLarge { .. }
        )
    }

    pub fn code(&self) -> String {
        match self {
            Self::MissingFile => "MISSING_FILE".into(),
            Self::UnsupportedType(_) => "UNSUPPORTED_TYPE".into(),
            Self::TooLarge { .. } => "TOO_LARGE".into(),
            Self::Connection(err) | Self::Transfer(err) => err.code(),
            Self::Persistence(_) => "PERSISTENCE_ERROR".into(),
        }
    }
}

impl From<TransferError> for PipelineError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Connection { .. } => Self::Connection(err),
            other => Self::Transfer(other),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// The file part of an upload request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Everything a client submits for one upload.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub file: Option<UploadedFile>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_type: Option<String>,
}

/// Generated names for both renditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionNames {
    /// Sanitized client file name, used for the default title.
    pub sanitized: String,
    pub original: String,
    pub optimized: String,
}

/// Storage-side and public URLs of one rendition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionUrls {
    pub storage: String,
    pub public: String,
}

/// Result of a successful publish.
#[derive(Debug, Clone)]
pub struct PublishedImage {
    pub id: i64,
    pub title: String,
    pub filename: String,
    pub url: String,
    pub original_url: String,
    pub remote_path: String,
    pub image_type: String,
    pub timestamp: DateTime<Utc>,
}

/// Settings fixed at startup.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_upload_bytes: usize,
    /// Remote directory holding `originals/` and `optimized/`.
    pub remote_base: String,
    pub urls: UrlConfig,
}

#[derive(Clone)]
pub struct UploadPipeline {
    connector: Arc<dyn TransferConnector>,
    store: MetadataStore,
    optimizer: ImageOptimizer,
    settings: Arc<PipelineSettings>,
}

impl UploadPipeline {
    pub fn new(
        connector: Arc<dyn TransferConnector>,
        store: MetadataStore,
        optimizer: ImageOptimizer,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            connector,
            store,
            optimizer,
            settings: Arc::new(settings),
        }
    }

    pub fn remote_base(&self) -> &str {
        &self.settings.remote_base
    }

    /// Validate, transform, transfer both renditions, then record the image.
    pub async fn publish(&self, request: UploadRequest) -> PipelineResult<PublishedImage> {
        let file = self.validate(request.file)?;
        debug!(stage = "validated", file = %file.file_name, size = file.bytes.len());

        let names = derive_names(&file.file_name, &file.content_type, Utc::now());
        let optimized = self.optimizer.optimize_blocking(file.bytes.clone()).await;
        debug!(
            stage = "transformed",
            converted = optimized.converted,
            size = optimized.bytes.len()
        );

        let originals_dir = join_remote(&self.settings.remote_base, ORIGINALS_DIR);
        let optimized_dir = join_remote(&self.settings.remote_base, OPTIMIZED_DIR);

        let mut session = self.connector.session();
        let transferred = transfer_renditions(
            session.as_mut(),
            [
                (originals_dir.as_str(), names.original.as_str(), file.bytes),
                (optimized_dir.as_str(), names.optimized.as_str(), optimized.bytes),
            ],
        )
        .await;
        session.close().await;

        let remote_path = match transferred {
            Ok([_, optimized_path]) => optimized_path,
            Err(err) => {
                error!(file = %names.original, error = %err, "publishing failed during transfer");
                return Err(err.into());
            }
        };

        let original_urls = self.rendition_urls(ORIGINALS_DIR, &names.original);
        let optimized_urls = self.rendition_urls(OPTIMIZED_DIR, &names.optimized);
        debug!(
            original_storage_url = %original_urls.storage,
            optimized_storage_url = %optimized_urls.storage,
            "derived storage urls"
        );

        let title = non_empty(request.title).unwrap_or_else(|| default_title(&names.sanitized));
        let image_type =
            non_empty(request.image_type).unwrap_or_else(|| DEFAULT_IMAGE_TYPE.to_string());
        let record = NewImageRecord {
            title: title.clone(),
            description: request.description.unwrap_or_default(),
            filename: names.original.clone(),
            filepath: remote_path.clone(),
            url: optimized_urls.public.clone(),
            original_url: original_urls.public.clone(),
            category: non_empty(request.category)
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            image_type: image_type.clone(),
        };

        let id = self.store.insert(&record).await.map_err(|err| {
            error!(file = %names.original, error = %err, "publishing failed while recording");
            PipelineError::from(err)
        })?;

        info!(id, filename = %names.original, remote_path = %remote_path, "image published");

        Ok(PublishedImage {
            id,
            title,
            filename: names.original,
            url: optimized_urls.public,
            original_url: original_urls.public,
            remote_path,
            image_type,
            timestamp: Utc::now(),
        })
    }

    /// Open a session and list the uploads directory.
    pub async fn check_connection(&self) -> Result<Vec<RemoteEntry>, TransferError> {
        let mut session = self.connector.session();
        let listing = match session.open().await {
            Ok(()) => session.list(&self.settings.remote_base).await,
            Err(err) => Err(err),
        };
        session.close().await;
        listing
    }

    fn validate(&self, file: Option<UploadedFile>) -> PipelineResult<UploadedFile> {
        let file = match file {
            Some(file) if !(file.file_name.is_empty() && file.bytes.is_empty()) => file,
            _ => return Err(PipelineError::MissingFile),
        };

        let content_type = file.content_type.to_ascii_lowercase();
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(PipelineError::UnsupportedType(file.content_type));
        }

        let size = file.bytes.len();
        if size > self.settings.max_upload_bytes {
            return Err(PipelineError::TooLarge {
                size,
                max: self.settings.max_upload_bytes,
            });
        }

        Ok(UploadedFile {
            content_type,
            ..file
        })
    }

    fn rendition_urls(&self, dir: &str, filename: &str) -> RenditionUrls {
        let urls = &self.settings.urls;
        let relative = format!("{}/{}", dir, filename);
        RenditionUrls {
            storage: join_url(&urls.storage_base_url, &relative),
            public: join_url(
                &join_url(&urls.public_base_url, &urls.public_uploads_path),
                &relative,
            ),
        }
    }
}

/// Open the session, ensure every target directory, and upload each rendition
/// in order. Returns the final remote paths. Does not close the session.
async fn transfer_renditions<const N: usize>(
    session: &mut dyn TransferClient,
    renditions: [(&str, &str, Bytes); N],
) -> Result<[String; N], TransferError> {
    session.open().await?;
    for (dir, _, _) in &renditions {
        session.ensure_directory(dir).await?;
    }

    let mut paths: [String; N] = std::array::from_fn(|_| String::new());
    for (slot, (dir, name, bytes)) in paths.iter_mut().zip(renditions) {
        *slot = session.put(bytes, dir, name).await?;
        debug!(stage = "transferred", path = %slot);
    }
    Ok(paths)
}

/// Build collision-resistant names from the client file name: a millisecond
/// timestamp plus a short random token, keeping the client's extension.
pub fn derive_names(file_name: &str, content_type: &str, now: DateTime<Utc>) -> RenditionNames {
    let sanitized = sanitize_file_name(file_name);
    let extension = sanitized
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| extension_for(content_type).to_string());

    let stem = format!("{}-{}", now.timestamp_millis(), random_token());

    RenditionNames {
        sanitized,
        original: format!("{}.{}", stem, extension),
        optimized: format!("optimized-{}.{}", stem, OPTIMIZED_EXTENSION),
    }
}

/// `RANDOM_TOKEN_LEN` base-36 digits (`[0-9a-z]`) drawn from a v4 UUID.
fn random_token() -> String {
    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut value = Uuid::new_v4().as_u128();
    (0..RANDOM_TOKEN_LEN)
        .map(|_| {
            let digit = ALPHABET[(value % 36) as usize] as char;
            value /= 36;
            digit
        })
        .collect()
}

/// Lowercase and replace everything outside `[a-z0-9.]` with `-`.
pub fn sanitize_file_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' => c,
            _ => '-',
        })
        .collect()
}

/// Title derived from a sanitized file name: dashes become spaces and the
/// extension is dropped.
fn default_title(sanitized: &str) -> String {
    let stem = match sanitized.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => sanitized,
    };
    stem.replace('-', " ")
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
