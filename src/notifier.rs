//! Change notifier bridge helpers.
//!
//! Folder-changed notifications name a path as the backend sees it; sources
//! are matched against it case-insensitively with slashes normalized.

/// Comparable form of a folder path.
pub fn folder_key(path: &str) -> String {
    let unified = path.trim().replace('\\', "/").to_lowercase();
    let trimmed = unified.trim_end_matches('/');
    if trimmed.is_empty() && unified.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Indices of the folders equal to `changed` after normalization.
///
/// Empty folders never match.
pub fn matching_sources<'a, I>(changed: &str, folders: I) -> Vec<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    let changed = folder_key(changed);
    if changed.is_empty() {
        return Vec::new();
    }

    folders
        .into_iter()
        .enumerate()
        .filter(|(_, folder)| !folder.is_empty() && folder_key(folder) == changed)
        .map(|(i, _)| i)
        .collect()
}
