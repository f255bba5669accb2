use std::io::Cursor;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use image::{DynamicImage, ImageFormat, ImageReader};

/// Decode an image file; animated GIFs yield their first frame as RGBA.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read image: {:?}", path))?;
    decode_image(&bytes).with_context(|| format!("Failed to decode image: {:?}", path))
}

/// Decode encoded image bytes.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes).ok();

    if format == Some(ImageFormat::Gif) {
        let decoder = GifDecoder::new(Cursor::new(bytes)).context("Failed to decode GIF")?;
        let mut frames = decoder.into_frames();
        if let Some(frame) = frames.next() {
            let frame = frame.context("Failed to decode GIF frame")?;
            return Ok(DynamicImage::ImageRgba8(frame.into_buffer()));
        }
        return Err(anyhow!("GIF has no frames"));
    }

    match format {
        Some(fmt) => image::load_from_memory_with_format(bytes, fmt).context("Failed to decode image"),
        None => image::load_from_memory(bytes).context("Failed to decode image"),
    }
}

/// Read pixel dimensions from the file header without a full decode.
pub fn read_dimensions(path: &Path) -> Result<(u32, u32)> {
    let reader = ImageReader::open(path)
        .with_context(|| format!("Failed to open image: {:?}", path))?
        .with_guessed_format()
        .context("Failed to guess image format")?;
    reader
        .into_dimensions()
        .with_context(|| format!("Failed to read dimensions: {:?}", path))
}

/// Read pixel dimensions from encoded bytes.
pub fn dimensions_from_bytes(bytes: &[u8]) -> Result<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("Failed to guess image format")?
        .into_dimensions()
        .context("Failed to read dimensions")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    /// Encode a solid PNG of the given size, optionally with partial alpha.
    pub(crate) fn png_bytes(width: u32, height: u32, alpha: u8) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, alpha]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_dimensions_from_bytes() {
        let bytes = png_bytes(7, 3, 255);
        assert_eq!(dimensions_from_bytes(&bytes).unwrap(), (7, 3));
        assert!(dimensions_from_bytes(b"not an image").is_err());
    }

    #[test]
    fn test_open_and_read_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, png_bytes(5, 4, 128)).unwrap();

        assert_eq!(read_dimensions(&path).unwrap(), (5, 4));
        let img = open_image(&path).unwrap();
        assert_eq!((img.width(), img.height()), (5, 4));
        assert!(img.color().has_alpha());
    }
}
