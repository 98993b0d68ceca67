//! Layout engine contract for the EPUB viewer.
//!
//! The viewer treats the pagination/layout engine as an external
//! collaborator with a narrow surface: open a packaged document, generate
//! a location index over a fixed granularity, map page numbers to opaque
//! location tokens, and produce renditions that can display a location,
//! navigate, resize, and hand back their content root for capture.
//!
//! [`EpubDocEngine`] is the default backend. It covers the whole contract
//! but keeps its internals deliberately small: container parsing is
//! delegated to the `epub` crate and markup rasterization is a
//! placeholder-quality capability, good enough for previews and tests.

use std::fmt;

use image::{ImageBuffer, Rgba};

mod epubdoc;

pub use epubdoc::EpubDocEngine;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Opaque reference to a parsed document owned by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Stable location token into a document's internal structure.
///
/// Tokens are ordered by their position in reading order. Only engines
/// interpret the components; everything else treats a `Cfi` as opaque.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cfi {
    spine_index: usize,
    char_offset: usize,
}

impl Cfi {
    pub fn new(spine_index: usize, char_offset: usize) -> Self {
        Self { spine_index, char_offset }
    }

    pub fn spine_index(&self) -> usize {
        self.spine_index
    }

    pub fn char_offset(&self) -> usize {
        self.char_offset
    }
}

impl fmt::Display for Cfi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shape mirrors the EPUB canonical fragment identifier syntax.
        write!(f, "epubcfi(/6/{}!/4/2:{})", 2 * (self.spine_index + 1), self.char_offset)
    }
}

/// Layout flow for a rendition. The viewer always uses paginated flow;
/// scrolled flow is part of the engine surface but unused here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Paginated,
    Scrolled,
}

/// Options for constructing a rendition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenditionOptions {
    pub width: u32,
    pub height: u32,
    pub flow: Flow,
    /// Untrusted document content must not execute scripts.
    pub allow_scripted_content: bool,
}

impl Default for RenditionOptions {
    fn default() -> Self {
        Self { width: 900, height: 700, flow: Flow::Paginated, allow_scripted_content: false }
    }
}

/// The root drawing surface of displayed content.
///
/// Two content shapes exist and both must be handled by capture code:
/// a vector root (an embedded SVG document) or general markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRoot {
    /// Serialized vector (SVG) document.
    Vector(String),
    /// General markup content, verbatim.
    Markup(String),
}

/// Notification payload for completed navigation.
#[derive(Debug, Clone)]
pub struct Relocation {
    pub cfi: Cfi,
    /// 1-based location index when the engine can resolve it.
    pub location: Option<u32>,
}

pub type RelocatedHook = Box<dyn FnMut(&Relocation)>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("package parse error: {0}")]
    Parse(String),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("location {location} out of range (location_count={count})")]
    LocationOutOfRange { location: u32, count: u32 },
    #[error("location index has not been generated for this document")]
    LocationsNotGenerated,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Navigation failures. Non-fatal by contract: callers log and continue.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("no content at the requested location")]
    NoContent,
    #[error("rendition has been destroyed")]
    Destroyed,
}

/// A live paginated view of a document.
///
/// Renditions are created by [`LayoutEngine::render_to`] and must be
/// destroyed before their owner constructs a replacement. Several
/// renditions of the same document may be alive at once (the primary
/// viewport plus off-screen capture targets); each keeps its own layout
/// state so concurrent renders never interfere.
pub trait Rendition {
    /// Navigate to a location. Resolves once content is laid out.
    fn display(&mut self, cfi: &Cfi) -> Result<(), DisplayError>;

    /// Advance one location forward. No-op at the last location.
    fn next(&mut self) -> Result<(), DisplayError>;

    /// Move one location back. No-op at the first location.
    fn prev(&mut self) -> Result<(), DisplayError>;

    /// Re-lay-out synchronously at a new size.
    fn resize(&mut self, width: u32, height: u32);

    fn current_location(&self) -> Option<Cfi>;

    /// Root drawing surface of the displayed content, if any is shown.
    fn content(&self) -> Option<ContentRoot>;

    /// Rasterize the rendered region at the given size.
    ///
    /// This is an optional capability: engines without it return `None`
    /// and callers fall back to a blank capture.
    fn rasterize(&self, width: u32, height: u32) -> Option<RgbaImage>;

    /// Deterministic paint-completion signal, when the engine has one.
    ///
    /// `None` means the engine exposes no signal and callers must fall
    /// back to a bounded timed wait.
    fn paint_complete(&self) -> Option<bool>;

    /// Install the hook invoked after every completed navigation,
    /// including `next`/`prev`.
    fn set_relocated_hook(&mut self, hook: RelocatedHook);

    /// Release all render resources. Idempotent; any later navigation
    /// fails with [`DisplayError::Destroyed`].
    fn destroy(&mut self);
}

/// Document parsing and layout engine.
pub trait LayoutEngine {
    /// Parse raw package bytes and take ownership of the document.
    fn open(&mut self, bytes: Vec<u8>) -> Result<DocumentHandle, EngineError>;

    /// Build the location index by walking the document text at the given
    /// granularity (characters per location). Returns the location count,
    /// which is fixed for the lifetime of the document once generated.
    fn generate_locations(
        &mut self,
        handle: DocumentHandle,
        granularity: usize,
    ) -> Result<u32, EngineError>;

    fn location_count(&self, handle: DocumentHandle) -> Result<u32, EngineError>;

    /// Token for a 1-based location index.
    fn cfi_from_location(&self, handle: DocumentHandle, location: u32)
        -> Result<Cfi, EngineError>;

    /// 1-based location index nearest at-or-before a token.
    fn location_from_cfi(&self, handle: DocumentHandle, cfi: &Cfi) -> Result<u32, EngineError>;

    /// Construct a rendition of the document.
    fn render_to(
        &self,
        handle: DocumentHandle,
        options: RenditionOptions,
    ) -> Result<Box<dyn Rendition>, EngineError>;

    /// Release the document.
    fn close(&mut self, handle: DocumentHandle) -> Result<(), EngineError>;
}
