use std::ops::Range;

/// Grid geometry of one gallery page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GalleryLayout {
    pub cols: usize,
    pub rows: usize,
    pub per_page: usize,
    pub page_count: usize,
}

impl GalleryLayout {
    /// Clamp a page index into `0..page_count`.
    pub fn clamp_page(&self, page: usize) -> usize {
        page.min(self.page_count.saturating_sub(1))
    }

    /// Page that holds the combined item at `index`.
    pub fn page_of(&self, index: usize) -> usize {
        index / self.per_page.max(1)
    }

    /// Combined item indices shown on `page`, truncated to `total_items`.
    pub fn page_range(&self, page: usize, total_items: usize) -> Range<usize> {
        let start = page.saturating_mul(self.per_page).min(total_items);
        let end = start.saturating_add(self.per_page).min(total_items);
        start..end
    }

    /// Grid cell (column, row) of the `slot`-th item on a page, filled row-major.
    pub fn cell_position(&self, slot: usize) -> (usize, usize) {
        let cols = self.cols.max(1);
        (slot % cols, slot / cols)
    }
}

/// Fixed spacing of the thumbnail grid.
///
/// Cells are square at the configured thumbnail size, plus `padding` around
/// each cell and an `info_row_height` caption strip under each thumbnail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GalleryPager {
    pub padding: f32,
    pub info_row_height: f32,
}

impl Default for GalleryPager {
    fn default() -> Self {
        Self {
            padding: 6.0,
            info_row_height: 16.0,
        }
    }
}

impl GalleryPager {
    pub fn new(padding: f32, info_row_height: f32) -> Self {
        Self {
            padding,
            info_row_height,
        }
    }

    /// Computes the page grid for a viewport.
    ///
    /// Always yields at least one column, one row and one page, so an empty
    /// folder still shows a single (empty) page.
    pub fn compute_layout(
        &self,
        viewport_width: f32,
        viewport_height: f32,
        cell_size: u32,
        total_items: usize,
    ) -> GalleryLayout {
        let cell = cell_size as f32;
        let cols = fit_count(viewport_width, cell + self.padding);
        let rows = fit_count(viewport_height, cell + self.info_row_height + self.padding);
        let per_page = cols * rows;
        let page_count = total_items.div_ceil(per_page).max(1);

        GalleryLayout {
            cols,
            rows,
            per_page,
            page_count,
        }
    }
}

/// `max(1, floor(extent / step))`, treating non-finite or non-positive input as 1.
fn fit_count(extent: f32, step: f32) -> usize {
    if !extent.is_finite() || !step.is_finite() || step <= 0.0 || extent <= 0.0 {
        return 1;
    }
    ((extent / step).floor() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pager() -> GalleryPager {
        GalleryPager::new(0.0, 0.0)
    }

    #[test]
    fn test_empty_folder_has_one_page() {
        let layout = GalleryPager::default().compute_layout(800.0, 600.0, 128, 0);
        assert_eq!(layout.page_count, 1);
        assert!(layout.per_page >= 1);
        assert_eq!(layout.page_range(0, 0), 0..0);
    }

    #[test]
    fn test_degenerate_viewport() {
        let layout = GalleryPager::default().compute_layout(0.0, -5.0, 512, 10);
        assert_eq!(layout.cols, 1);
        assert_eq!(layout.rows, 1);
        assert_eq!(layout.per_page, 1);
        assert_eq!(layout.page_count, 10);

        let layout = GalleryPager::default().compute_layout(f32::NAN, 300.0, 128, 3);
        assert!(layout.page_count >= 1 && layout.per_page >= 1);
    }

    #[test]
    fn test_columns_and_rows_from_cell_size() {
        let p = GalleryPager::new(6.0, 16.0);
        // 134 px per column, 150 px per row.
        let layout = p.compute_layout(600.0, 460.0, 128, 30);
        assert_eq!(layout.cols, 4);
        assert_eq!(layout.rows, 3);
        assert_eq!(layout.per_page, 12);
        assert_eq!(layout.page_count, 3);
    }

    #[test]
    fn test_250_items_at_24_per_page() {
        // 6 columns x 4 rows of 100 px cells.
        let layout = pager().compute_layout(600.0, 400.0, 100, 250);
        assert_eq!(layout.per_page, 24);
        assert_eq!(layout.page_count, 11);
        assert_eq!(layout.page_of(200), 8);
        assert_eq!(layout.page_range(10, 250), 240..250);
    }

    #[test]
    fn test_clamp_page() {
        let layout = pager().compute_layout(200.0, 100.0, 100, 5);
        assert_eq!(layout.page_count, 3);
        assert_eq!(layout.clamp_page(7), 2);
        assert_eq!(layout.clamp_page(1), 1);
    }

    #[test]
    fn test_page_range_out_of_bounds_page() {
        let layout = pager().compute_layout(600.0, 400.0, 100, 250);
        assert_eq!(layout.page_range(usize::MAX, 250), 250..250);
        assert_eq!(layout.page_range(99, 250), 250..250);
    }

    #[test]
    fn test_cell_position_row_major() {
        let layout = pager().compute_layout(300.0, 300.0, 100, 9);
        assert_eq!(layout.cols, 3);
        assert_eq!(layout.cell_position(0), (0, 0));
        assert_eq!(layout.cell_position(2), (2, 0));
        assert_eq!(layout.cell_position(4), (1, 1));
        assert_eq!(layout.cell_position(8), (2, 2));
    }
}
