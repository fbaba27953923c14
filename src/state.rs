//! Shared state handed to every handler.

use crate::{
    config::FtpConfig,
    services::{metadata_store::MetadataStore, upload_pipeline::UploadPipeline},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: UploadPipeline,
    pub store: MetadataStore,
    /// Connection settings echoed by the diagnostic endpoint (never the password).
    pub ftp: Arc<FtpConfig>,
}
