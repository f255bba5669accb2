//! Thumbnail generation using the image crate.
//!
//! Thumbnails fit inside a `size x size` box preserving aspect ratio and are
//! stored as JPEG in a `.thumbs` directory next to the source images. Images
//! with transparency are flattened onto a grey checkerboard so the alpha
//! stays visible.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GenericImageView, Rgb, RgbImage, RgbaImage};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::image_loader::open_image;
use crate::service::THUMBNAIL_SIZES;

/// Directory inside each folder holding generated thumbnails.
pub const THUMBS_DIR: &str = ".thumbs";

/// JPEG quality for thumbnail encoding (0-100).
const JPEG_QUALITY: u8 = 85;

/// Checkerboard colours behind transparent pixels.
const CHECKER_LIGHT: [u8; 3] = [204, 204, 204];
const CHECKER_DARK: [u8; 3] = [153, 153, 153];

/// Smallest checker square in pixels.
const MIN_CHECKER: u32 = 4;

/// Thumbnail generator backed by a per-folder disk cache.
pub struct ThumbnailGenerator;

impl ThumbnailGenerator {
    /// Path of the cached thumbnail for `filename` at `size`.
    ///
    /// The stem is kept for readability; the hash of the full filename keeps
    /// `a.png` and `a.jpg` apart.
    pub fn thumbnail_path(folder: &Path, filename: &str, size: u32) -> PathBuf {
        let stem = Path::new(filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("thumb");
        let hash = xxh3_64(filename.as_bytes());
        folder
            .join(THUMBS_DIR)
            .join(format!("{}_{:016x}_{}.jpg", stem, hash, size))
    }

    /// A cached thumbnail is valid when it is at least as new as its source.
    pub fn is_valid(image_path: &Path, thumb_path: &Path) -> bool {
        let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
        match (modified(image_path), modified(thumb_path)) {
            (Some(src), Some(thumb)) => thumb >= src,
            _ => false,
        }
    }

    /// Return JPEG bytes of the thumbnail, generating and caching it if needed.
    ///
    /// When the cache directory is not writable the thumbnail is rendered in
    /// memory and returned uncached.
    pub fn get_or_generate(folder: &Path, filename: &str, size: u32) -> Result<Vec<u8>> {
        let image_path = folder.join(filename);
        let thumb_path = Self::thumbnail_path(folder, filename, size);

        if Self::is_valid(&image_path, &thumb_path) {
            match std::fs::read(&thumb_path) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => warn!(?thumb_path, error = %e, "Failed to read cached thumbnail"),
            }
        }

        let bytes = Self::render_jpeg(&image_path, size)?;

        if let Err(e) = Self::store(&thumb_path, &bytes) {
            warn!(?thumb_path, error = ?e, "Failed to cache thumbnail, serving uncached");
        }

        Ok(bytes)
    }

    /// Remove cached thumbnails of `filename` at every size.
    pub fn remove_all(folder: &Path, filename: &str) {
        for size in THUMBNAIL_SIZES {
            let path = Self::thumbnail_path(folder, filename, size);
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(?path, error = %e, "Failed to remove cached thumbnail");
                }
            }
        }
    }

    /// Render and store the thumbnail of `filename` at `size`, replacing any cached one.
    pub fn regenerate(folder: &Path, filename: &str, size: u32) -> Result<()> {
        let bytes = Self::render_jpeg(&folder.join(filename), size)?;
        Self::store(&Self::thumbnail_path(folder, filename, size), &bytes)
    }

    /// Render the thumbnail of an image file as JPEG bytes.
    pub fn render_jpeg(image_path: &Path, size: u32) -> Result<Vec<u8>> {
        debug!(?image_path, size, "Generating thumbnail");
        let img = open_image(image_path)?;
        let (src_width, src_height) = img.dimensions();
        let (width, height) = Self::calculate_dimensions(src_width, src_height, size);

        let resized = if (width, height) == (src_width, src_height) {
            img
        } else {
            img.resize_exact(width, height, FilterType::Lanczos3)
        };

        let rgb = if resized.color().has_alpha() {
            let checker = (size / 16).max(MIN_CHECKER);
            Self::flatten_on_checkerboard(&resized.to_rgba8(), checker)
        } else {
            resized.to_rgb8()
        };

        Self::encode_jpeg(&rgb)
    }

    /// Fit `src` into a `size x size` box preserving aspect ratio, never upscaling.
    fn calculate_dimensions(src_width: u32, src_height: u32, size: u32) -> (u32, u32) {
        if src_width == 0 || src_height == 0 {
            return (size.max(1), size.max(1));
        }
        if src_width <= size && src_height <= size {
            return (src_width, src_height);
        }

        let scale = (size as f64 / src_width as f64).min(size as f64 / src_height as f64);
        let width = (src_width as f64 * scale).round() as u32;
        let height = (src_height as f64 * scale).round() as u32;
        (width.max(1), height.max(1))
    }

    /// Composite RGBA pixels over a light/dark checkerboard.
    fn flatten_on_checkerboard(img: &RgbaImage, checker: u32) -> RgbImage {
        let checker = checker.max(1);
        RgbImage::from_fn(img.width(), img.height(), |x, y| {
            let bg = if ((x / checker) + (y / checker)) % 2 == 0 {
                CHECKER_LIGHT
            } else {
                CHECKER_DARK
            };
            let px = img.get_pixel(x, y).0;
            let alpha = px[3] as u32;
            let blend = |fg: u8, bg: u8| -> u8 {
                ((fg as u32 * alpha + bg as u32 * (255 - alpha) + 127) / 255) as u8
            };
            Rgb([blend(px[0], bg[0]), blend(px[1], bg[1]), blend(px[2], bg[2])])
        })
    }

    fn encode_jpeg(img: &RgbImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buffer), JPEG_QUALITY);
        img.write_with_encoder(encoder)
            .context("Failed to encode thumbnail")?;
        Ok(buffer)
    }

    fn store(thumb_path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = thumb_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create thumbnail directory: {:?}", parent))?;
        }
        std::fs::write(thumb_path, bytes)
            .with_context(|| format!("Failed to write thumbnail: {:?}", thumb_path))?;
        debug!(?thumb_path, "Saved thumbnail");
        Ok(())
    }
}

/// Decode a generated thumbnail back into an image, for inspection.
#[cfg(test)]
fn decode(bytes: &[u8]) -> image::DynamicImage {
    image::load_from_memory(bytes).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_loader::tests::png_bytes;
    use image::Rgba;

    #[test]
    fn test_calculate_dimensions_landscape() {
        let (w, h) = ThumbnailGenerator::calculate_dimensions(1920, 1080, 256);
        assert_eq!(w, 256);
        assert_eq!(h, 144);
    }

    #[test]
    fn test_calculate_dimensions_portrait() {
        let (w, h) = ThumbnailGenerator::calculate_dimensions(1000, 2000, 128);
        assert_eq!((w, h), (64, 128));
    }

    #[test]
    fn test_calculate_dimensions_small_source() {
        // Source smaller than the box - don't upscale
        let (w, h) = ThumbnailGenerator::calculate_dimensions(100, 50, 256);
        assert_eq!((w, h), (100, 50));
    }

    #[test]
    fn test_thumbnail_path_distinguishes_extensions() {
        let folder = Path::new("/pics");
        let png = ThumbnailGenerator::thumbnail_path(folder, "a.png", 128);
        let jpg = ThumbnailGenerator::thumbnail_path(folder, "a.jpg", 128);
        let big = ThumbnailGenerator::thumbnail_path(folder, "a.png", 256);
        assert_ne!(png, jpg);
        assert_ne!(png, big);
        assert!(png.starts_with("/pics/.thumbs"));
        assert!(png.to_string_lossy().ends_with("_128.jpg"));
    }

    #[test]
    fn test_checkerboard_shows_through_transparency() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        let flat = ThumbnailGenerator::flatten_on_checkerboard(&img, 4);
        assert_eq!(flat.get_pixel(0, 0).0, CHECKER_LIGHT);
        assert_eq!(flat.get_pixel(4, 0).0, CHECKER_DARK);
        assert_eq!(flat.get_pixel(4, 4).0, CHECKER_LIGHT);

        let opaque = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let flat = ThumbnailGenerator::flatten_on_checkerboard(&opaque, 4);
        assert_eq!(flat.get_pixel(1, 1).0, [10, 20, 30]);
    }

    #[test]
    fn test_get_or_generate_caches_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.png"), png_bytes(400, 200, 255)).unwrap();

        let bytes = ThumbnailGenerator::get_or_generate(dir.path(), "big.png", 128).unwrap();
        let thumb = decode(&bytes);
        assert_eq!(thumb.dimensions(), (128, 64));

        let cached = ThumbnailGenerator::thumbnail_path(dir.path(), "big.png", 128);
        assert!(cached.exists());
        assert!(ThumbnailGenerator::is_valid(&dir.path().join("big.png"), &cached));

        ThumbnailGenerator::remove_all(dir.path(), "big.png");
        assert!(!cached.exists());
    }

    #[test]
    fn test_regenerate_replaces_cached_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let cached = ThumbnailGenerator::thumbnail_path(dir.path(), "a.png", 256);
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, b"stale").unwrap();
        std::fs::write(dir.path().join("a.png"), png_bytes(300, 300, 255)).unwrap();

        ThumbnailGenerator::regenerate(dir.path(), "a.png", 256).unwrap();
        assert_eq!(decode(&std::fs::read(&cached).unwrap()).dimensions(), (256, 256));

        assert!(ThumbnailGenerator::regenerate(dir.path(), "gone.png", 256).is_err());
    }

    #[test]
    fn test_get_or_generate_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ThumbnailGenerator::get_or_generate(dir.path(), "nope.png", 128).is_err());
    }
}
