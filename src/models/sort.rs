use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{FolderEntry, ImageEntry};

/// Order in which a folder's images are listed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Case-insensitive by filename.
    #[default]
    Name,
    /// Newest first.
    DateDesc,
    /// Oldest first.
    DateAsc,
}

impl SortOrder {
    /// Wire tag used by the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::DateDesc => "date_desc",
            Self::DateAsc => "date_asc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = ();

    /// Unknown tags fall back to name order, matching the backend.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "date_desc" => Self::DateDesc,
            "date_asc" => Self::DateAsc,
            _ => Self::Name,
        })
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn compare_times(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Sort images in place; date ties are broken by name.
pub fn sort_images(images: &mut [ImageEntry], order: SortOrder) {
    match order {
        SortOrder::Name => images.sort_by(|a, b| compare_names(&a.filename, &b.filename)),
        SortOrder::DateDesc => images.sort_by(|a, b| {
            compare_times(b.modified_or_epoch(), a.modified_or_epoch())
                .then_with(|| compare_names(&a.filename, &b.filename))
        }),
        SortOrder::DateAsc => images.sort_by(|a, b| {
            compare_times(a.modified_or_epoch(), b.modified_or_epoch())
                .then_with(|| compare_names(&a.filename, &b.filename))
        }),
    }
}

/// Sort subfolders by name, case-insensitive.
pub fn sort_folders(folders: &mut [FolderEntry]) {
    folders.sort_by(|a, b| compare_names(&a.name, &b.name));
}
