//! Document session
//!
//! Owns one opened document for its whole lifetime: the engine instance,
//! the document handle, and the generated location index. Page numbers at
//! this layer are 1-based location indices; the session converts between
//! them and the engine's opaque location tokens.

use epub_engine::{Cfi, DocumentHandle, EngineError, LayoutEngine, Rendition, RenditionOptions};

/// Characters of stripped text per location.
pub const DEFAULT_GRANULARITY: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to parse document: {0}")]
    Parse(String),
    #[error("page {page} out of range (document has {total} pages)")]
    PageOutOfRange { page: u32, total: u32 },
    #[error(transparent)]
    Engine(EngineError),
}

impl From<EngineError> for SessionError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Parse(message) => SessionError::Parse(message),
            other => SessionError::Engine(other),
        }
    }
}

/// One loaded document plus its location index.
pub struct DocumentSession {
    engine: Box<dyn LayoutEngine>,
    handle: DocumentHandle,
    total_pages: u32,
}

impl DocumentSession {
    /// Parse document bytes with a fresh engine instance.
    ///
    /// The index is not generated yet; call
    /// [`generate_index`](Self::generate_index) before any page math.
    pub fn load(mut engine: Box<dyn LayoutEngine>, bytes: Vec<u8>) -> Result<Self, SessionError> {
        let handle = engine.open(bytes)?;
        Ok(Self { engine, handle, total_pages: 0 })
    }

    /// Build the location index. Returns the page count, which stays fixed
    /// for the rest of the session.
    pub fn generate_index(&mut self, granularity: usize) -> Result<u32, SessionError> {
        self.total_pages = self.engine.generate_locations(self.handle, granularity)?;
        log::info!("location index ready: {} pages", self.total_pages);
        Ok(self.total_pages)
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn handle(&self) -> DocumentHandle {
        self.handle
    }

    pub fn engine(&self) -> &dyn LayoutEngine {
        self.engine.as_ref()
    }

    /// Location token for a 1-based page number.
    pub fn location_for_page(&self, page: u32) -> Result<Cfi, SessionError> {
        if page == 0 || page > self.total_pages {
            return Err(SessionError::PageOutOfRange { page, total: self.total_pages });
        }
        Ok(self.engine.cfi_from_location(self.handle, page)?)
    }

    /// Page number for a location token (nearest at-or-before).
    pub fn page_for_location(&self, cfi: &Cfi) -> Result<u32, SessionError> {
        Ok(self.engine.location_from_cfi(self.handle, cfi)?)
    }

    /// Construct a rendition over this document.
    pub fn open_rendition(
        &self,
        options: RenditionOptions,
    ) -> Result<Box<dyn Rendition>, SessionError> {
        Ok(self.engine.render_to(self.handle, options)?)
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        if let Err(err) = self.engine.close(self.handle) {
            log::debug!("closing document failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedEngine;

    fn session_with_pages(pages: u32) -> DocumentSession {
        let engine = ScriptedEngine::with_pages(pages);
        let mut session =
            DocumentSession::load(Box::new(engine), b"bytes".to_vec()).expect("load succeeds");
        session.generate_index(DEFAULT_GRANULARITY).expect("index succeeds");
        session
    }

    #[test]
    fn load_failure_is_reported_as_parse() {
        let engine = ScriptedEngine::failing_open();
        match DocumentSession::load(Box::new(engine), Vec::new()) {
            Err(SessionError::Parse(_)) => {}
            Err(other) => panic!("expected a parse error, got {other}"),
            Ok(_) => panic!("load should fail"),
        }
    }

    #[test]
    fn page_round_trip_is_stable() {
        let session = session_with_pages(12);
        assert_eq!(session.total_pages(), 12);

        for page in 1..=12 {
            let cfi = session.location_for_page(page).unwrap();
            assert_eq!(session.page_for_location(&cfi).unwrap(), page);
        }
    }

    #[test]
    fn out_of_range_pages_are_rejected() {
        let session = session_with_pages(5);

        assert!(matches!(
            session.location_for_page(0),
            Err(SessionError::PageOutOfRange { page: 0, total: 5 })
        ));
        assert!(matches!(
            session.location_for_page(6),
            Err(SessionError::PageOutOfRange { page: 6, total: 5 })
        ));
    }

    #[test]
    fn drop_closes_the_document() {
        let engine = ScriptedEngine::with_pages(3);
        let closed = engine.closed_count();

        let session = DocumentSession::load(Box::new(engine), b"bytes".to_vec()).unwrap();
        assert_eq!(closed.get(), 0);
        drop(session);
        assert_eq!(closed.get(), 1);
    }
}
