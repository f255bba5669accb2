//! Node output: the chosen image and its alpha mask.
//!
//! - `load_output` decodes the chosen file for the execution engine
//! - `change_token` / `validate` let the engine skip or reject a run
//! - `tab_output` / `expand_tabs` split per-tab outputs

use std::path::Path;
use std::time::UNIX_EPOCH;

use anyhow::{bail, Result};
use image::{ImageBuffer, Luma, RgbImage};
use tracing::debug;

use crate::config::MAX_TABS;
use crate::image_loader::open_image;
use crate::models::is_image_path;

/// Side of the placeholder output when nothing is chosen.
pub const EMPTY_OUTPUT_SIZE: u32 = 64;

/// Per-pixel mask, `1.0` where the image is fully transparent.
pub type Mask = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Debug, Clone, PartialEq)]
pub struct PickerOutput {
    pub image: RgbImage,
    pub mask: Mask,
    /// Empty when nothing is chosen.
    pub image_path: String,
    pub image_count: usize,
}

impl Default for PickerOutput {
    fn default() -> Self {
        Self {
            image: RgbImage::new(EMPTY_OUTPUT_SIZE, EMPTY_OUTPUT_SIZE),
            mask: Mask::new(EMPTY_OUTPUT_SIZE, EMPTY_OUTPUT_SIZE),
            image_path: String::new(),
            image_count: 0,
        }
    }
}

/// Number of image files directly inside `folder`.
pub fn count_images(folder: &str) -> usize {
    if folder.is_empty() {
        return 0;
    }
    std::fs::read_dir(folder)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| is_image_path(&e.path()))
                .count()
        })
        .unwrap_or(0)
}

/// Decode the chosen image of a tab.
///
/// Nothing chosen yields the black placeholder; a chosen file that no
/// longer exists is an error.
pub fn load_output(folder: &str, filename: &str) -> Result<PickerOutput> {
    let image_count = count_images(folder);
    if folder.is_empty() || filename.is_empty() {
        return Ok(PickerOutput {
            image_count,
            ..PickerOutput::default()
        });
    }

    let path = Path::new(folder).join(filename);
    if !path.exists() {
        bail!("Image not found: {}", path.display());
    }

    let img = open_image(&path)?;
    let mask = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        Mask::from_fn(rgba.width(), rgba.height(), |x, y| {
            Luma([1.0 - rgba.get_pixel(x, y).0[3] as f32 / 255.0])
        })
    } else {
        Mask::new(img.width(), img.height())
    };

    debug!(?path, width = img.width(), height = img.height(), "Loaded output image");
    Ok(PickerOutput {
        image: img.to_rgb8(),
        mask,
        image_path: path.to_string_lossy().into_owned(),
        image_count,
    })
}

/// Token that changes whenever the chosen file does.
///
/// `None` means the output must always be recomputed.
pub fn change_token(folder: &str, filename: &str) -> Option<String> {
    if folder.is_empty() || filename.is_empty() {
        return None;
    }
    let path = Path::new(folder).join(filename);
    let meta = std::fs::metadata(&path).ok()?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Some(format!("{}_{}_{}", path.display(), mtime, meta.len()))
}

/// Reject a run whose chosen file is gone.
pub fn validate(folder: &str, filename: &str) -> Result<()> {
    if folder.is_empty() || filename.is_empty() {
        return Ok(());
    }
    let path = Path::new(folder).join(filename);
    if !path.exists() {
        bail!("Image not found: {}", path.display());
    }
    Ok(())
}

/// Output of the 1-based `tab_number`, clamped to the tab range.
pub fn tab_output(outputs: &[PickerOutput], tab_number: i64) -> PickerOutput {
    let tab = tab_number.clamp(1, MAX_TABS as i64) as usize;
    outputs.get(tab - 1).cloned().unwrap_or_default()
}

/// Outputs of every tab, placeholders for missing ones.
pub fn expand_tabs(outputs: &[PickerOutput]) -> [PickerOutput; MAX_TABS] {
    std::array::from_fn(|i| outputs.get(i).cloned().unwrap_or_default())
}
