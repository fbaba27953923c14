pub mod image_transform;
pub mod metadata_store;
pub mod transfer_client;
pub mod upload_pipeline;
