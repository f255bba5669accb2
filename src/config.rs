//! Configuration management.
//!
//! Config values are loaded with the following priority (highest to lowest):
//! 1. Environment variables (IMGPICK_*)
//! 2. Config file (`XDG_CONFIG_HOME/imgpick/config.toml`)
//! 3. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::layout::GalleryPager;
use crate::service::allowed_thumbnail_size;
use crate::watcher::WatchSettings;

/// Largest number of tabs a picker carries.
pub const MAX_TABS: usize = 5;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PickerConfig {
    pub tab_count: usize,
    pub thumbnail_size: u32,
    pub cell_padding: f32,
    pub info_row_height: f32,
    pub show_folders: bool,
    pub switch_debounce_ms: u64,
    pub watch_debounce_ms: u64,
    pub event_gap_ms: u64,
    pub dimension_cache_entries: usize,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            tab_count: MAX_TABS,
            thumbnail_size: 128,
            cell_padding: 6.0,
            info_row_height: 16.0,
            show_folders: true,
            switch_debounce_ms: 150,
            watch_debounce_ms: 500,
            event_gap_ms: 300,
            dimension_cache_entries: 4096,
        }
    }
}

impl PickerConfig {
    /// Load config with priority: env vars > config file > defaults
    pub fn load() -> Self {
        let mut config = Self::config_path()
            .and_then(|path| Self::load_from_file(&path))
            .unwrap_or_default();
        config.apply_env_overrides();
        config.clamp_values();
        config
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "imgpick").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => {
                debug!(?path, "Loaded config file");
                Some(config)
            }
            Err(e) => {
                warn!(?path, error = %e, "Ignoring malformed config file");
                None
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = Self::parse_env::<usize>("IMGPICK_TAB_COUNT") {
            self.tab_count = v;
        }
        if let Some(v) = Self::parse_env::<u32>("IMGPICK_THUMBNAIL_SIZE") {
            self.thumbnail_size = v;
        }
        if let Some(v) = Self::parse_env::<f32>("IMGPICK_CELL_PADDING") {
            self.cell_padding = v;
        }
        if let Some(v) = Self::parse_env::<f32>("IMGPICK_INFO_ROW_HEIGHT") {
            self.info_row_height = v;
        }
        if std::env::var_os("IMGPICK_HIDE_FOLDERS").is_some() {
            self.show_folders = false;
        }
        if let Some(v) = Self::parse_env::<u64>("IMGPICK_SWITCH_DEBOUNCE_MS") {
            self.switch_debounce_ms = v;
        }
        if let Some(v) = Self::parse_env::<u64>("IMGPICK_WATCH_DEBOUNCE_MS") {
            self.watch_debounce_ms = v;
        }
        if let Some(v) = Self::parse_env::<u64>("IMGPICK_EVENT_GAP_MS") {
            self.event_gap_ms = v;
        }
        if let Some(v) = Self::parse_env::<usize>("IMGPICK_DIMENSION_CACHE_ENTRIES") {
            self.dimension_cache_entries = v;
        }
    }

    fn clamp_values(&mut self) {
        const MAX_DEBOUNCE_MS: u64 = 5_000;
        const MAX_SPACING: f32 = 64.0;

        self.tab_count = self.tab_count.clamp(1, MAX_TABS);
        self.thumbnail_size = allowed_thumbnail_size(self.thumbnail_size);
        self.cell_padding = sanitize(self.cell_padding, 6.0).clamp(0.0, MAX_SPACING);
        self.info_row_height = sanitize(self.info_row_height, 16.0).clamp(0.0, MAX_SPACING);
        self.switch_debounce_ms = self.switch_debounce_ms.min(MAX_DEBOUNCE_MS);
        self.watch_debounce_ms = self.watch_debounce_ms.min(MAX_DEBOUNCE_MS);
        self.event_gap_ms = self.event_gap_ms.min(MAX_DEBOUNCE_MS);
        self.dimension_cache_entries = self.dimension_cache_entries.clamp(1, 1 << 20);
    }

    fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok()?.parse().ok()
    }

    pub fn pager(&self) -> GalleryPager {
        GalleryPager::new(self.cell_padding, self.info_row_height)
    }

    pub fn switch_debounce(&self) -> Duration {
        Duration::from_millis(self.switch_debounce_ms)
    }

    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            debounce: Duration::from_millis(self.watch_debounce_ms),
            event_gap: Duration::from_millis(self.event_gap_ms),
        }
    }
}

fn sanitize(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = PickerConfig::default();
        assert_eq!(config.tab_count, 5);
        assert_eq!(config.thumbnail_size, 128);
        assert_eq!(config.cell_padding, 6.0);
        assert_eq!(config.info_row_height, 16.0);
        assert!(config.show_folders);
        assert_eq!(config.switch_debounce_ms, 150);
        assert_eq!(config.watch_settings().debounce, Duration::from_millis(500));
        assert_eq!(config.watch_settings().event_gap, Duration::from_millis(300));
    }

    #[test]
    fn test_clamp_values() {
        let mut config = PickerConfig {
            tab_count: 9,
            thumbnail_size: 300,
            cell_padding: f32::NAN,
            switch_debounce_ms: 60_000,
            dimension_cache_entries: 0,
            ..Default::default()
        };
        config.clamp_values();
        assert_eq!(config.tab_count, 5);
        assert_eq!(config.thumbnail_size, 128);
        assert_eq!(config.cell_padding, 6.0);
        assert_eq!(config.switch_debounce_ms, 5_000);
        assert_eq!(config.dimension_cache_entries, 1);

        let mut config = PickerConfig {
            tab_count: 0,
            thumbnail_size: 346,
            ..Default::default()
        };
        config.clamp_values();
        assert_eq!(config.tab_count, 1);
        assert_eq!(config.thumbnail_size, 346);
    }

    #[test]
    fn test_load_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tab_count = 3\nshow_folders = false\n").unwrap();

        let config = PickerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.tab_count, 3);
        assert!(!config.show_folders);
        assert_eq!(config.thumbnail_size, 128);

        std::fs::write(&path, "tab_count = \"many\"").unwrap();
        assert!(PickerConfig::load_from_file(&path).is_none());
    }
}
