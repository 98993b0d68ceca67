//! Vector content rasterization
//!
//! Behind the `svg_raster` feature the serialized SVG root of a section is
//! rendered with resvg, stretched to the requested thumbnail size. Without
//! the feature the fallback returns `None` and callers compose a blank
//! capture instead.

use epub_engine::RgbaImage;

#[cfg(feature = "svg_raster")]
pub(crate) fn rasterize_svg(svg_xml: &str, width: u32, height: u32) -> Option<RgbaImage> {
    use resvg::{tiny_skia, usvg};

    let tree = usvg::Tree::from_str(svg_xml, &usvg::Options::default()).ok()?;

    let width = width.max(1);
    let height = height.max(1);
    let mut pixmap = tiny_skia::Pixmap::new(width, height)?;

    let size = tree.size();
    let sx = width as f32 / size.width().max(1.0);
    let sy = height as f32 / size.height().max(1.0);
    resvg::render(&tree, tiny_skia::Transform::from_scale(sx, sy), &mut pixmap.as_mut());

    RgbaImage::from_raw(width, height, pixmap.take())
}

#[cfg(not(feature = "svg_raster"))]
pub(crate) fn rasterize_svg(_svg_xml: &str, _width: u32, _height: u32) -> Option<RgbaImage> {
    None
}
