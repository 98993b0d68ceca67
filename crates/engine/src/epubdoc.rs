//! Default layout-engine backend over the `epub` crate.
//!
//! Container parsing is fully delegated: the spine is walked once at open
//! time and each section's markup is kept verbatim alongside a stripped
//! text form used for location generation. Layout itself is approximate;
//! the markup rasterization capability paints placeholder line bars, which
//! is sufficient for previews and keeps this backend dependency-light.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use epub::doc::EpubDoc;
use image::Rgba;

use crate::{
    Cfi, ContentRoot, DisplayError, DocumentHandle, EngineError, LayoutEngine, RelocatedHook,
    Relocation, Rendition, RenditionOptions, RgbaImage,
};

/// Wrap width passed to the markup stripper. Large enough that no hard
/// line breaks are baked into the extracted text.
const STRIP_WIDTH: usize = 10_000;

#[derive(Debug, Clone)]
struct Section {
    markup: String,
    text: String,
    svg_root: bool,
}

struct DocumentRecord {
    sections: Arc<Vec<Section>>,
    locations: Arc<Vec<Cfi>>,
}

/// Default engine backend.
#[derive(Default)]
pub struct EpubDocEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl EpubDocEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, EngineError> {
        self.docs.get(&handle).ok_or(EngineError::InvalidHandle(handle.raw()))
    }

    fn record_mut(&mut self, handle: DocumentHandle) -> Result<&mut DocumentRecord, EngineError> {
        self.docs.get_mut(&handle).ok_or(EngineError::InvalidHandle(handle.raw()))
    }
}

/// True when the root element of a section is `<svg>`, skipping any XML
/// declaration, doctype, and comments in front of it.
fn has_svg_root(markup: &str) -> bool {
    let mut rest = markup;
    loop {
        rest = rest.trim_start();
        if rest.starts_with("<?") {
            match rest.find("?>") {
                Some(end) => rest = &rest[end + 2..],
                None => return false,
            }
        } else if rest.starts_with("<!") {
            match rest.find('>') {
                Some(end) => rest = &rest[end + 1..],
                None => return false,
            }
        } else {
            break;
        }
    }
    rest.starts_with("<svg")
}

fn strip_markup(markup: &str) -> String {
    html2text::from_read(markup.as_bytes(), STRIP_WIDTH).unwrap_or_else(|_| markup.to_owned())
}

impl LayoutEngine for EpubDocEngine {
    fn open(&mut self, bytes: Vec<u8>) -> Result<DocumentHandle, EngineError> {
        let mut doc = EpubDoc::from_reader(Cursor::new(bytes))
            .map_err(|err| EngineError::Parse(err.to_string()))?;

        let mut sections = Vec::new();
        loop {
            if let Some((markup, _mime)) = doc.get_current_str() {
                let svg_root = has_svg_root(&markup);
                let text = strip_markup(&markup);
                sections.push(Section { markup, text, svg_root });
            }
            if !doc.go_next() {
                break;
            }
        }

        if sections.is_empty() {
            return Err(EngineError::Parse("document has no readable sections".to_owned()));
        }

        self.next_handle += 1;
        let handle = DocumentHandle::new(self.next_handle);
        self.docs.insert(
            handle,
            DocumentRecord { sections: Arc::new(sections), locations: Arc::new(Vec::new()) },
        );

        Ok(handle)
    }

    fn generate_locations(
        &mut self,
        handle: DocumentHandle,
        granularity: usize,
    ) -> Result<u32, EngineError> {
        let granularity = granularity.max(1);
        let record = self.record_mut(handle)?;

        let mut locations = Vec::new();
        for (spine_index, section) in record.sections.iter().enumerate() {
            let chars = section.text.chars().filter(|c| !c.is_whitespace()).count();
            if chars == 0 {
                // Sections without extractable text (vector pages, image
                // pages) still occupy one location so they stay reachable.
                if section.svg_root || !section.markup.trim().is_empty() {
                    locations.push(Cfi::new(spine_index, 0));
                }
                continue;
            }

            let total = section.text.chars().count();
            let mut offset = 0;
            while offset < total {
                locations.push(Cfi::new(spine_index, offset));
                offset += granularity;
            }
        }

        record.locations = Arc::new(locations);
        Ok(record.locations.len() as u32)
    }

    fn location_count(&self, handle: DocumentHandle) -> Result<u32, EngineError> {
        Ok(self.record(handle)?.locations.len() as u32)
    }

    fn cfi_from_location(
        &self,
        handle: DocumentHandle,
        location: u32,
    ) -> Result<Cfi, EngineError> {
        let record = self.record(handle)?;
        let count = record.locations.len() as u32;
        if count == 0 {
            return Err(EngineError::LocationsNotGenerated);
        }
        if location == 0 || location > count {
            return Err(EngineError::LocationOutOfRange { location, count });
        }
        Ok(record.locations[(location - 1) as usize].clone())
    }

    fn location_from_cfi(&self, handle: DocumentHandle, cfi: &Cfi) -> Result<u32, EngineError> {
        let record = self.record(handle)?;
        if record.locations.is_empty() {
            return Err(EngineError::LocationsNotGenerated);
        }
        let at_or_before = record.locations.partition_point(|candidate| candidate <= cfi);
        Ok(at_or_before.max(1) as u32)
    }

    fn render_to(
        &self,
        handle: DocumentHandle,
        options: RenditionOptions,
    ) -> Result<Box<dyn Rendition>, EngineError> {
        let record = self.record(handle)?;
        if options.allow_scripted_content {
            log::warn!("scripted content requested; this backend never executes scripts");
        }

        Ok(Box::new(EpubRendition {
            sections: Arc::clone(&record.sections),
            locations: Arc::clone(&record.locations),
            width: options.width.max(1),
            height: options.height.max(1),
            current: None,
            hook: None,
            destroyed: false,
        }))
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), EngineError> {
        self.docs
            .remove(&handle)
            .map(|_| ())
            .ok_or(EngineError::InvalidHandle(handle.raw()))
    }
}

/// A paginated view over one opened document.
///
/// Each rendition keeps its own position and size, so off-screen capture
/// renditions never disturb the primary one.
struct EpubRendition {
    sections: Arc<Vec<Section>>,
    locations: Arc<Vec<Cfi>>,
    width: u32,
    height: u32,
    current: Option<usize>,
    hook: Option<RelocatedHook>,
    destroyed: bool,
}

impl EpubRendition {
    /// Index of the location at-or-before the token, in reading order.
    fn locate(&self, cfi: &Cfi) -> Option<usize> {
        if self.locations.is_empty() || cfi.spine_index() >= self.sections.len() {
            return None;
        }
        let at_or_before = self.locations.partition_point(|candidate| candidate <= cfi);
        Some(at_or_before.saturating_sub(1))
    }

    /// Text spanned by the location at `index`, up to the next location
    /// within the same section.
    fn chunk_text(&self, index: usize) -> String {
        let location = &self.locations[index];
        let section = &self.sections[location.spine_index()];

        let end = self
            .locations
            .get(index + 1)
            .filter(|next| next.spine_index() == location.spine_index())
            .map(|next| next.char_offset());

        let skipped = section.text.chars().skip(location.char_offset());
        match end {
            Some(end) => skipped.take(end - location.char_offset()).collect(),
            None => skipped.collect(),
        }
    }

    fn emit_relocated(&mut self, index: usize) {
        let relocation = Relocation {
            cfi: self.locations[index].clone(),
            location: Some((index + 1) as u32),
        };
        if let Some(hook) = self.hook.as_mut() {
            hook(&relocation);
        }
    }

    fn move_to(&mut self, index: usize) {
        self.current = Some(index);
        self.emit_relocated(index);
    }
}

impl Rendition for EpubRendition {
    fn display(&mut self, cfi: &Cfi) -> Result<(), DisplayError> {
        if self.destroyed {
            return Err(DisplayError::Destroyed);
        }

        let index = self.locate(cfi).ok_or(DisplayError::NoContent)?;
        let section = &self.sections[self.locations[index].spine_index()];
        if !section.svg_root && self.chunk_text(index).trim().is_empty() {
            return Err(DisplayError::NoContent);
        }

        self.move_to(index);
        Ok(())
    }

    fn next(&mut self) -> Result<(), DisplayError> {
        if self.destroyed {
            return Err(DisplayError::Destroyed);
        }
        let current = self.current.ok_or(DisplayError::NoContent)?;
        if current + 1 < self.locations.len() {
            self.move_to(current + 1);
        }
        Ok(())
    }

    fn prev(&mut self) -> Result<(), DisplayError> {
        if self.destroyed {
            return Err(DisplayError::Destroyed);
        }
        let current = self.current.ok_or(DisplayError::NoContent)?;
        if current > 0 {
            self.move_to(current - 1);
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.destroyed {
            return;
        }
        self.width = width.max(1);
        self.height = height.max(1);
    }

    fn current_location(&self) -> Option<Cfi> {
        self.current.map(|index| self.locations[index].clone())
    }

    fn content(&self) -> Option<ContentRoot> {
        if self.destroyed {
            return None;
        }
        let index = self.current?;
        let section = &self.sections[self.locations[index].spine_index()];
        if section.svg_root {
            Some(ContentRoot::Vector(section.markup.clone()))
        } else {
            Some(ContentRoot::Markup(section.markup.clone()))
        }
    }

    fn rasterize(&self, width: u32, height: u32) -> Option<RgbaImage> {
        if self.destroyed {
            return None;
        }
        let index = self.current?;

        let width = width.max(1);
        let height = height.max(1);
        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                image.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                image.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                image.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        // Placeholder line bars standing in for laid-out text.
        let margin = 10u32.min(width / 4).min(height / 4);
        let line_height = 12u32;
        let glyph_width = 5u32;
        let usable_width = width.saturating_sub(2 * margin);
        let columns = (usable_width / glyph_width).max(1) as usize;
        let rows = (height.saturating_sub(2 * margin) / line_height) as usize;

        let chunk: Vec<char> = self.chunk_text(index).chars().collect();
        for (row, line) in chunk.chunks(columns).take(rows).enumerate() {
            let bar_width = (line.len() as u32 * glyph_width).min(usable_width);
            let y_start = margin + row as u32 * line_height;
            for y in y_start..(y_start + 6).min(height) {
                for x in margin..margin + bar_width {
                    image.put_pixel(x, y, Rgba([90, 90, 90, 255]));
                }
            }
        }

        Some(image)
    }

    fn paint_complete(&self) -> Option<bool> {
        // Layout here is synchronous: painted as soon as a location is shown.
        Some(!self.destroyed && self.current.is_some())
    }

    fn set_relocated_hook(&mut self, hook: RelocatedHook) {
        self.hook = Some(hook);
    }

    fn destroy(&mut self) {
        self.destroyed = true;
        self.current = None;
        self.hook = None;
    }
}
