//! Core data models for the image publishing service.
//!
//! `ImageRecord` maps to the `images` table via `sqlx::FromRow`; both it and
//! `RemoteEntry` serialize as JSON via `serde` for the HTTP surface.

pub mod image;
pub mod remote;
