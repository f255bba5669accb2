//! Thumbnail pipeline for the image folder picker.
//!
//! This module provides:
//! - `ThumbnailCache` - Per-source pending/loaded/failed state keyed by filename
//! - `ThumbnailGenerator` - Backend-side rendering with a `.thumbs` disk cache

pub mod cache;
pub mod generator;

pub use cache::{ImageHandle, ThumbState, ThumbnailCache};
pub use generator::ThumbnailGenerator;
