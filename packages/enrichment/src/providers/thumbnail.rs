//! PNG thumbnails rendered with the `image` crate.

use async_trait::async_trait;
use bytes::Bytes;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

use crate::context::InvocationContext;
use crate::error::{StageError, StageResult};
use crate::traits::stages::ThumbnailGenerator;
use crate::traits::storage::ObjectStore;
use crate::types::event::{DerivedImage, DocumentEvent};
use crate::types::outcome::Stage;

/// Longest edge of a thumbnail, in pixels.
pub const MAX_THUMBNAIL_DIMENSION: u32 = 1024;

const PNG_CONTENT_TYPE: &str = "image/png";

/// Key of the thumbnail for a source object: same prefix, `<stem>-thumbnail.png`.
pub fn thumbnail_key(source_key: &str) -> String {
    let (prefix, file_name) = match source_key.rsplit_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, source_key),
    };
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    match prefix {
        Some(prefix) => format!("{}/{}-thumbnail.png", prefix, stem),
        None => format!("{}-thumbnail.png", stem),
    }
}

/// Reads the source object, shrinks it to fit a square bound and stores it
/// as PNG.
///
/// The thumbnail goes to the derived bucket if one is set, otherwise next to
/// the source object. Re-running overwrites the same key.
pub struct ImageThumbnailGenerator {
    store: Arc<dyn ObjectStore>,
    derived_bucket: Option<String>,
    max_dimension: u32,
}

impl ImageThumbnailGenerator {
    pub fn new(store: Arc<dyn ObjectStore>, derived_bucket: Option<String>) -> Self {
        Self {
            store,
            derived_bucket,
            max_dimension: MAX_THUMBNAIL_DIMENSION,
        }
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension.max(1);
        self
    }
}

#[async_trait]
impl ThumbnailGenerator for ImageThumbnailGenerator {
    async fn generate(
        &self,
        _ctx: &InvocationContext,
        event: &DocumentEvent,
    ) -> StageResult<DerivedImage> {
        let source = self
            .store
            .get(&event.s3_bucket, &event.s3_key)
            .await
            .map_err(|e| StageError::failed(Stage::Thumbnail, e))?;

        let max_dimension = self.max_dimension;
        let png = tokio::task::spawn_blocking(move || render_thumbnail(&source, max_dimension))
            .await
            .map_err(|e| StageError::failed(Stage::Thumbnail, e))?
            .map_err(|e| StageError::failed(Stage::Thumbnail, e))?;

        let bucket = self
            .derived_bucket
            .clone()
            .unwrap_or_else(|| event.s3_bucket.clone());
        let key = thumbnail_key(&event.s3_key);

        self.store
            .put(&bucket, &key, Bytes::from(png), PNG_CONTENT_TYPE)
            .await
            .map_err(|e| StageError::failed(Stage::Thumbnail, e))?;

        debug!(bucket = %bucket, key = %key, "thumbnail stored");
        Ok(DerivedImage::new(bucket, key))
    }
}

/// Decode any supported image, shrink it to fit `max_dimension` square and
/// encode it as PNG. Images already within bounds keep their size.
pub(crate) fn render_thumbnail(source: &[u8], max_dimension: u32) -> image::ImageResult<Vec<u8>> {
    let mut img = image::load_from_memory(source)?;

    let (width, height) = img.dimensions();
    if width > max_dimension || height > max_dimension {
        img = img.thumbnail(max_dimension, max_dimension);
    }
    // PNG has no float pixel formats
    if matches!(img.color(), ColorType::Rgb32F | ColorType::Rgba32F) {
        img = DynamicImage::ImageRgba8(img.to_rgba8());
    }

    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn test_thumbnail_key() {
        assert_eq!(thumbnail_key("d1.tif"), "d1-thumbnail.png");
        assert_eq!(thumbnail_key("scans/2024/d1.tif"), "scans/2024/d1-thumbnail.png");
        assert_eq!(thumbnail_key("noext"), "noext-thumbnail.png");
        assert_eq!(thumbnail_key("a.b.jpeg"), "a.b-thumbnail.png");
    }

    #[test]
    fn test_render_shrinks_to_bound() {
        let out = render_thumbnail(&png(300, 150), 100).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.dimensions(), (100, 50));
    }

    #[test]
    fn test_render_keeps_small_images() {
        let out = render_thumbnail(&png(40, 30), 100).unwrap();
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!(img.dimensions(), (40, 30));
    }

    #[test]
    fn test_render_rejects_garbage() {
        assert!(render_thumbnail(b"not an image", 100).is_err());
    }
}
