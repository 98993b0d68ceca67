//! Scripted engine used across the crate's tests.
//!
//! Pages map to location tokens at a fixed 1000-character pitch, so page
//! `n` corresponds to the token at offset `(n - 1) * 1000`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use epub_engine::{
    Cfi, ContentRoot, DisplayError, DocumentHandle, EngineError, LayoutEngine, RelocatedHook,
    Relocation, Rendition, RenditionOptions, RgbaImage,
};
use image::Rgba;

const PITCH: usize = 1000;

#[derive(Clone, Default)]
pub(crate) struct EngineProbe {
    pub closed: Rc<Cell<u32>>,
    pub destroyed_renditions: Rc<Cell<u32>>,
    pub resizes: Rc<RefCell<Vec<(u32, u32)>>>,
    pub displayed_pages: Rc<RefCell<Vec<u32>>>,
}

pub(crate) struct ScriptedEngine {
    pages: u32,
    fail_open: bool,
    probe: EngineProbe,
}

impl ScriptedEngine {
    pub fn with_pages(pages: u32) -> Self {
        Self { pages, fail_open: false, probe: EngineProbe::default() }
    }

    /// Share one probe across engines made by a factory closure.
    pub fn with_pages_and_probe(pages: u32, probe: EngineProbe) -> Self {
        Self { pages, fail_open: false, probe }
    }

    pub fn failing_open() -> Self {
        Self { pages: 0, fail_open: true, probe: EngineProbe::default() }
    }

    pub fn probe(&self) -> EngineProbe {
        self.probe.clone()
    }

    pub fn closed_count(&self) -> Rc<Cell<u32>> {
        Rc::clone(&self.probe.closed)
    }
}

impl LayoutEngine for ScriptedEngine {
    fn open(&mut self, _bytes: Vec<u8>) -> Result<DocumentHandle, EngineError> {
        if self.fail_open {
            return Err(EngineError::Parse("scripted parse failure".into()));
        }
        Ok(DocumentHandle::new(1))
    }

    fn generate_locations(
        &mut self,
        _handle: DocumentHandle,
        _granularity: usize,
    ) -> Result<u32, EngineError> {
        Ok(self.pages)
    }

    fn location_count(&self, _handle: DocumentHandle) -> Result<u32, EngineError> {
        Ok(self.pages)
    }

    fn cfi_from_location(
        &self,
        _handle: DocumentHandle,
        location: u32,
    ) -> Result<Cfi, EngineError> {
        if location == 0 || location > self.pages {
            return Err(EngineError::LocationOutOfRange { location, count: self.pages });
        }
        Ok(Cfi::new(0, (location as usize - 1) * PITCH))
    }

    fn location_from_cfi(&self, _handle: DocumentHandle, cfi: &Cfi) -> Result<u32, EngineError> {
        Ok((cfi.char_offset() / PITCH) as u32 + 1)
    }

    fn render_to(
        &self,
        _handle: DocumentHandle,
        _options: RenditionOptions,
    ) -> Result<Box<dyn Rendition>, EngineError> {
        Ok(Box::new(ScriptedRendition {
            pages: self.pages,
            current: None,
            hook: None,
            destroyed: false,
            probe: self.probe.clone(),
        }))
    }

    fn close(&mut self, _handle: DocumentHandle) -> Result<(), EngineError> {
        self.probe.closed.set(self.probe.closed.get() + 1);
        Ok(())
    }
}

struct ScriptedRendition {
    pages: u32,
    current: Option<u32>,
    hook: Option<RelocatedHook>,
    destroyed: bool,
    probe: EngineProbe,
}

impl ScriptedRendition {
    fn relocate(&mut self, page: u32) {
        self.current = Some(page);
        self.probe.displayed_pages.borrow_mut().push(page);
        let relocation =
            Relocation { cfi: Cfi::new(0, (page as usize - 1) * PITCH), location: Some(page) };
        if let Some(hook) = self.hook.as_mut() {
            hook(&relocation);
        }
    }
}

impl Rendition for ScriptedRendition {
    fn display(&mut self, cfi: &Cfi) -> Result<(), DisplayError> {
        if self.destroyed {
            return Err(DisplayError::Destroyed);
        }
        let page = (cfi.char_offset() / PITCH) as u32 + 1;
        if page > self.pages {
            return Err(DisplayError::NoContent);
        }
        self.relocate(page);
        Ok(())
    }

    fn next(&mut self) -> Result<(), DisplayError> {
        if self.destroyed {
            return Err(DisplayError::Destroyed);
        }
        let current = self.current.ok_or(DisplayError::NoContent)?;
        if current < self.pages {
            self.relocate(current + 1);
        }
        Ok(())
    }

    fn prev(&mut self) -> Result<(), DisplayError> {
        if self.destroyed {
            return Err(DisplayError::Destroyed);
        }
        let current = self.current.ok_or(DisplayError::NoContent)?;
        if current > 1 {
            self.relocate(current - 1);
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.probe.resizes.borrow_mut().push((width, height));
    }

    fn current_location(&self) -> Option<Cfi> {
        self.current.map(|page| Cfi::new(0, (page as usize - 1) * PITCH))
    }

    fn content(&self) -> Option<ContentRoot> {
        self.current.map(|page| ContentRoot::Markup(format!("<p>page {page}</p>")))
    }

    fn rasterize(&self, width: u32, height: u32) -> Option<RgbaImage> {
        Some(RgbaImage::from_pixel(width.max(1), height.max(1), Rgba([40, 40, 40, 255])))
    }

    fn paint_complete(&self) -> Option<bool> {
        Some(self.current.is_some())
    }

    fn set_relocated_hook(&mut self, hook: RelocatedHook) {
        self.hook = Some(hook);
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.probe.destroyed_renditions.set(self.probe.destroyed_renditions.get() + 1);
        }
        self.destroyed = true;
        self.current = None;
        self.hook = None;
    }
}
