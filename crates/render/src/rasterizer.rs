//! Off-screen thumbnail render pass
//!
//! Each request runs a full pass: build a hidden rendition at thumbnail
//! size, display the target location, wait for paint, capture the content
//! root onto a white canvas, encode to PNG, and tear the rendition down.
//! The pass never fails outward: any error degrades to a blank white
//! thumbnail so one bad page cannot wedge the strip.

use std::io::Cursor;
use std::time::{Duration, Instant};

use epub_engine::{
    Cfi, ContentRoot, DisplayError, DocumentHandle, EngineError, Flow, LayoutEngine, Rendition,
    RenditionOptions, RgbaImage,
};
use image::{DynamicImage, ImageFormat, Rgba};

use crate::svg::rasterize_svg;
use crate::{RenderError, Thumbnail, THUMBNAIL_HEIGHT, THUMBNAIL_WIDTH};

/// Rasterizer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerConfig {
    /// Capture width in pixels
    pub width: u32,

    /// Capture height in pixels
    pub height: u32,

    /// Upper bound on the wait for the engine to finish painting. Used as
    /// a blind delay when the engine has no paint-completion signal.
    pub settle_delay: Duration,
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            width: THUMBNAIL_WIDTH,
            height: THUMBNAIL_HEIGHT,
            settle_delay: Duration::from_millis(100),
        }
    }
}

/// Produces page thumbnails through off-screen render passes.
pub struct ThumbnailRasterizer {
    config: RasterizerConfig,
}

impl Default for ThumbnailRasterizer {
    fn default() -> Self {
        Self::new(RasterizerConfig::default())
    }
}

impl ThumbnailRasterizer {
    pub fn new(config: RasterizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RasterizerConfig {
        &self.config
    }

    /// Render the thumbnail for a page (1-based location index).
    ///
    /// Infallible by policy: when the pass fails the returned thumbnail is
    /// a blank white image of the configured size, and the cause is logged.
    pub fn rasterize(&self, engine: &dyn LayoutEngine, handle: DocumentHandle, page: u32) -> Thumbnail {
        let png = match self.try_rasterize(engine, handle, page) {
            Ok(png) => png,
            Err(err) => {
                log::debug!("thumbnail pass for page {page} failed ({err}); using blank");
                self.blank_png()
            }
        };
        Thumbnail { page, png, width: self.config.width, height: self.config.height }
    }

    fn try_rasterize(
        &self,
        engine: &dyn LayoutEngine,
        handle: DocumentHandle,
        page: u32,
    ) -> Result<Vec<u8>, RenderError> {
        let cfi = engine.cfi_from_location(handle, page)?;

        let mut rendition = engine.render_to(
            handle,
            RenditionOptions {
                width: self.config.width,
                height: self.config.height,
                flow: Flow::Paginated,
                allow_scripted_content: false,
            },
        )?;

        let captured = self.capture(rendition.as_mut(), &cfi);

        // Teardown happens before the capture result is inspected, so a
        // failed pass can never leak an off-screen rendition.
        rendition.destroy();

        encode_png(&captured?)
    }

    fn capture(
        &self,
        rendition: &mut dyn Rendition,
        cfi: &Cfi,
    ) -> Result<RgbaImage, RenderError> {
        rendition.display(cfi)?;
        self.wait_for_paint(rendition);

        let mut canvas = self.blank_canvas();
        match rendition.content() {
            Some(ContentRoot::Vector(svg)) => {
                if let Some(image) = rasterize_svg(&svg, self.config.width, self.config.height) {
                    overlay(&mut canvas, &image);
                }
                // No vector support compiled in: the capture stays white,
                // mirroring the markup fallback below.
            }
            Some(ContentRoot::Markup(_)) => {
                if let Some(image) = rendition.rasterize(self.config.width, self.config.height) {
                    overlay(&mut canvas, &image);
                }
            }
            None => return Err(RenderError::NoSurface),
        }

        Ok(canvas)
    }

    /// Wait until the engine reports the paint finished, bounded by the
    /// settle delay. Engines without a signal get the full blind delay.
    fn wait_for_paint(&self, rendition: &dyn Rendition) {
        match rendition.paint_complete() {
            None => std::thread::sleep(self.config.settle_delay),
            Some(true) => {}
            Some(false) => {
                let deadline = Instant::now() + self.config.settle_delay;
                while rendition.paint_complete() == Some(false) && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }

    fn blank_canvas(&self) -> RgbaImage {
        RgbaImage::from_pixel(
            self.config.width.max(1),
            self.config.height.max(1),
            Rgba([255, 255, 255, 255]),
        )
    }

    fn blank_png(&self) -> Vec<u8> {
        // Encoding a plain white canvas cannot fail in practice; fall back
        // to empty bytes if it somehow does.
        encode_png(&self.blank_canvas()).unwrap_or_default()
    }
}

/// Alpha-blend `src` over `dst`, clipped to `dst`'s bounds.
fn overlay(dst: &mut RgbaImage, src: &RgbaImage) {
    let (dw, dh) = dst.dimensions();
    for (x, y, pixel) in src.enumerate_pixels() {
        if x >= dw || y >= dh {
            continue;
        }
        let alpha = pixel.0[3] as u32;
        if alpha == 0 {
            continue;
        }
        let under = dst.get_pixel_mut(x, y);
        for channel in 0..3 {
            let over = pixel.0[channel] as u32;
            let base = under.0[channel] as u32;
            under.0[channel] = ((over * alpha + base * (255 - alpha)) / 255) as u8;
        }
        under.0[3] = 255;
    }
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|err| RenderError::Encode(err.to_string()))?;
    Ok(png)
}

// Errors absorbed into the blank-thumbnail policy still need conversions
// for the internal `?` chains.
impl From<EngineError> for RenderError {
    fn from(err: EngineError) -> Self {
        RenderError::Engine(err)
    }
}

impl From<DisplayError> for RenderError {
    fn from(err: DisplayError) -> Self {
        RenderError::Display(err)
    }
}
