//! Thumbnail cache for the EPUB viewer.
//!
//! Memoizes one encoded preview per page for the lifetime of a document
//! session. There is no eviction: entries only leave the cache when a new
//! document replaces the session and the whole cache is reset.

pub mod thumbs;

pub use thumbs::{CacheStats, CachedThumbnail, RenderTicket, ThumbnailCache};
