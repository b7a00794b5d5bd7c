use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use super::{ImageIntakeError, ImageStrategy, SelectedFile};
use crate::posting::models::{Image, InlineImage};
use crate::storage::StorageError;

/// Largest size that fits in a `max` x `max` box, keeping the aspect ratio.
/// Images already inside the box are left alone.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    if width >= height {
        let scaled = (height as f64 * max as f64 / width as f64).round() as u32;
        (max, scaled.max(1))
    } else {
        let scaled = (width as f64 * max as f64 / height as f64).round() as u32;
        (scaled.max(1), max)
    }
}

fn compress(data: &[u8], max_dimension: u32, quality: u8) -> Result<Vec<u8>, ImageIntakeError> {
    let decoded =
        image::load_from_memory(data).map_err(|e| ImageIntakeError::Decode(e.to_string()))?;
    let (width, height) = fit_within(decoded.width(), decoded.height(), max_dimension);
    let resized = if (width, height) == (decoded.width(), decoded.height()) {
        decoded
    } else {
        decoded.resize_exact(width, height, FilterType::Triangle)
    };

    let rgb = resized.to_rgb8();
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality)
        .encode_image(&rgb)
        .map_err(|e| ImageIntakeError::Encode(e.to_string()))?;
    Ok(encoded)
}

/// Embeds images in the document as downscaled JPEG data URLs.
pub struct InlineStrategy {
    max_dimension: u32,
    quality: u8,
    max_bytes: Option<usize>,
}

impl InlineStrategy {
    pub fn new(max_dimension: u32, quality: u8, max_bytes: Option<usize>) -> Self {
        Self {
            max_dimension,
            quality,
            max_bytes,
        }
    }
}

#[async_trait::async_trait]
impl ImageStrategy for InlineStrategy {
    fn max_bytes(&self) -> Option<usize> {
        self.max_bytes
    }

    async fn transform(&self, file: SelectedFile, mime: String) -> Result<Image, ImageIntakeError> {
        let (max_dimension, quality) = (self.max_dimension, self.quality);
        let SelectedFile { filename, data, .. } = file;

        let encoded = tokio::task::spawn_blocking(move || compress(&data, max_dimension, quality))
            .await
            .map_err(|_| ImageIntakeError::Aborted)??;

        log::debug!("Compressed {} to {} bytes", filename, encoded.len());
        Ok(Image::Inline(InlineImage {
            base64: format!("data:image/jpeg;base64,{}", STANDARD.encode(&encoded)),
            mime_type: mime,
            filename,
            processed_at: Utc::now(),
        }))
    }

    async fn discard(&self, _image: &Image) -> Result<(), StorageError> {
        Ok(())
    }
}
