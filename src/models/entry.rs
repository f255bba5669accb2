use std::path::Path;

/// File extensions recognised as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif"];

/// Check whether a file name or path has an image extension (case-insensitive).
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// One image in a folder listing, identified by `filename` within its folder.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEntry {
    pub filename: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Modification time in seconds since the Unix epoch.
    pub modified: Option<f64>,
    /// File size in bytes.
    pub size: Option<u64>,
}

impl ImageEntry {
    /// Create an entry with just a filename.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            width: None,
            height: None,
            modified: None,
            size: None,
        }
    }

    pub fn with_modified(mut self, modified: f64) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Modification time used for date ordering; unknown sorts as oldest.
    pub fn modified_or_epoch(&self) -> f64 {
        self.modified.unwrap_or(0.0)
    }
}

/// A navigable subfolder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub name: String,
    /// Directory path usable as a new listing root.
    pub path: String,
}

impl FolderEntry {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Contents of one folder as returned by a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderListing {
    pub images: Vec<ImageEntry>,
    pub subfolders: Vec<FolderEntry>,
    /// Path to navigate up to; empty when there is no navigable parent.
    pub parent: String,
}

impl FolderListing {
    /// The listing shown for an empty or unreachable folder.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.subfolders.is_empty()
    }
}

/// What a browse entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseKind {
    /// A filesystem root such as `C:\`.
    Drive,
    Folder,
}

/// One navigable location offered while choosing a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseEntry {
    pub name: String,
    pub path: String,
    pub kind: BrowseKind,
}

/// Folders below a location, for choosing a folder to pick from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowseListing {
    pub folders: Vec<BrowseEntry>,
    /// The browsed location; empty when listing drives.
    pub current: String,
    /// Location one level up; empty at a root.
    pub parent: String,
    /// Images directly inside `current`.
    pub image_count: usize,
}

/// Outcome of regenerating the thumbnails of a folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub regenerated: usize,
    pub errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_image_path() {
        assert!(is_image_path(Path::new("a.png")));
        assert!(is_image_path(Path::new("/x/B.JPEG")));
        assert!(is_image_path(Path::new("scan.TIF")));
        assert!(!is_image_path(Path::new("notes.txt")));
        assert!(!is_image_path(Path::new("noext")));
    }

    #[test]
    fn test_listing_is_empty() {
        let listing = FolderListing {
            images: vec![ImageEntry::new("a.png"), ImageEntry::new("b.png")],
            subfolders: Vec::new(),
            parent: String::new(),
        };
        assert!(!listing.is_empty());
        assert!(FolderListing::empty().is_empty());
    }
}
