//! Thumbnail rendering for the EPUB viewer.
//!
//! The strip never rasterizes through the primary viewport. Each preview
//! comes from a dedicated off-screen render pass run by
//! [`ThumbnailRasterizer`]; the result is an encoded PNG ready to cache or
//! hand to a UI as a data URL.

mod rasterizer;
mod svg;

pub use rasterizer::{RasterizerConfig, ThumbnailRasterizer};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Default thumbnail width in pixels.
pub const THUMBNAIL_WIDTH: u32 = 200;

/// Default thumbnail height in pixels.
pub const THUMBNAIL_HEIGHT: u32 = 250;

/// One rendered page preview.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    /// 1-based page (location) number
    pub page: u32,

    /// Encoded PNG bytes
    pub png: Vec<u8>,

    /// Pixel width
    pub width: u32,

    /// Pixel height
    pub height: u32,
}

impl Thumbnail {
    /// Encode as a `data:image/png;base64,…` URL for direct embedding.
    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }
}

/// Failures inside a render pass.
///
/// Not exposed by [`ThumbnailRasterizer::rasterize`], which degrades every
/// failure to a blank thumbnail; kept public for embedders driving the
/// lower-level pieces themselves.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("engine error: {0}")]
    Engine(epub_engine::EngineError),
    #[error("display error: {0}")]
    Display(epub_engine::DisplayError),
    #[error("PNG encoding failed: {0}")]
    Encode(String),
    #[error("nothing was displayed to capture")]
    NoSurface,
}
