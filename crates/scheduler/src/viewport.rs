//! Visible-window math for the thumbnail strip
//!
//! The strip renders lazily: on every scroll the embedder asks which pages
//! are in (or near) view and only those get thumbnail jobs. The window is
//! a fixed-size run of pages starting at the first cell under the scroll
//! offset, clamped to the document.

use std::ops::RangeInclusive;

/// Geometry of the thumbnail strip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripLayout {
    /// Scroll extent of one cell: thumbnail size plus spacing.
    pub cell_extent: f32,

    /// Number of pages loaded per visibility pass.
    pub window_size: u32,
}

impl Default for StripLayout {
    fn default() -> Self {
        Self { cell_extent: 210.0, window_size: 10 }
    }
}

/// Pages (1-based, inclusive) to load for a scroll position.
///
/// `None` when the document has no pages. Negative or overscrolled
/// offsets clamp to the ends of the document rather than failing.
pub fn visible_window(
    scroll_offset: f32,
    layout: &StripLayout,
    total_pages: u32,
) -> Option<RangeInclusive<u32>> {
    if total_pages == 0 {
        return None;
    }

    let cell = layout.cell_extent.max(1.0);
    let first_cell = (scroll_offset.max(0.0) / cell).floor() as u32;

    let start = (first_cell + 1).clamp(1, total_pages);
    let end = start.saturating_add(layout.window_size.saturating_sub(1)).min(total_pages);
    Some(start..=end)
}
