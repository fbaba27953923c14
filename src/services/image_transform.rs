//! Web rendition of an uploaded image.
//!
//! Cover-fits the image into a fixed box (center crop, no upscaling) and
//! re-encodes it as lossy WebP. Failure is never fatal: the caller gets the
//! original bytes back and publishing continues.

use anyhow::{Result, anyhow};
use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageReader, imageops::FilterType};
use std::io::Cursor;
use tokio::task;
use tracing::{debug, warn};

/// Extension of every optimized rendition.
pub const OPTIMIZED_EXTENSION: &str = "webp";

/// Outcome of an optimization attempt.
#[derive(Debug, Clone)]
pub struct Optimized {
    pub bytes: Bytes,
    /// `false` when the original bytes were passed through.
    pub converted: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageOptimizer {
    pub width: u32,
    pub height: u32,
    /// WebP quality, 0-100.
    pub quality: f32,
    /// libwebp compression method, 0 (fast) to 6 (smallest output).
    pub effort: i32,
}

impl Default for ImageOptimizer {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
            quality: 80.0,
            effort: 6,
        }
    }
}

impl ImageOptimizer {
    /// Produce the web rendition, falling back to `data` on any failure.
    pub fn optimize(&self, data: Bytes) -> Optimized {
        match self.encode(&data) {
            Ok(encoded) => {
                debug!(
                    original = data.len(),
                    optimized = encoded.len(),
                    "image optimized"
                );
                Optimized {
                    bytes: Bytes::from(encoded),
                    converted: true,
                }
            }
            Err(err) => {
                warn!(error = %err, "image optimization failed, using original");
                Optimized {
                    bytes: data,
                    converted: false,
                }
            }
        }
    }

    /// `optimize` on the blocking pool. A panicking encoder also falls back.
    pub async fn optimize_blocking(&self, data: Bytes) -> Optimized {
        let optimizer = *self;
        let fallback = data.clone();
        match task::spawn_blocking(move || optimizer.optimize(data)).await {
            Ok(optimized) => optimized,
            Err(err) => {
                warn!(error = %err, "image optimization task panicked, using original");
                Optimized {
                    bytes: fallback,
                    converted: false,
                }
            }
        }
    }

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let img = ImageReader::new(Cursor::new(data))
            .with_guessed_format()?
            .decode()?;
        let resized = self.fit(img);
        let (width, height) = resized.dimensions();
        let rgba = resized.to_rgba8();
        let mut config =
            webp::WebPConfig::new().map_err(|_| anyhow!("failed to initialize webp config"))?;
        config.quality = self.quality;
        config.method = self.effort;
        let encoded = webp::Encoder::from_rgba(&rgba, width, height)
            .encode_advanced(&config)
            .map_err(|err| anyhow!("webp encoding failed: {:?}", err))?;
        Ok(encoded.to_vec())
    }

    /// Cover-fit into the box, cropping around the center. The box is first
    /// clamped to the source size so the image is never enlarged.
    fn fit(&self, img: DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        if width <= self.width && height <= self.height {
            return img;
        }
        let target_w = self.width.min(width);
        let target_h = self.height.min(height);
        img.resize_to_fill(target_w, target_h, FilterType::Lanczos3)
    }
}
