//! Per-page thumbnail store with in-flight tracking
//!
//! Each page number maps to one of three states: absent, pending (a render
//! was scheduled and has not completed), or ready (an encoded image is
//! stored). Pending entries make scheduling idempotent: repeated visibility
//! passes over the same page produce at most one render request.
//!
//! Entries are tagged with a generation counter so results from a render
//! that outlived its document are discarded instead of poisoning the cache
//! of the next document.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// An encoded thumbnail image for one page.
#[derive(Debug, Clone)]
pub struct CachedThumbnail {
    /// 1-based page (location) number this preview belongs to
    pub page: u32,

    /// Encoded PNG bytes
    pub png: Vec<u8>,

    /// Pixel width of the encoded image
    pub width: u32,

    /// Pixel height of the encoded image
    pub height: u32,
}

impl CachedThumbnail {
    pub fn new(page: u32, png: Vec<u8>, width: u32, height: u32) -> Self {
        Self { page, png, width, height }
    }

    /// Memory held by the encoded bytes.
    pub fn memory_size(&self) -> usize {
        self.png.len()
    }
}

/// Proof that a render was admitted for a page.
///
/// Issued by [`ThumbnailCache::begin`] and consumed by
/// [`ThumbnailCache::put`] or [`ThumbnailCache::cancel`]. The embedded
/// generation lets the cache reject results that were produced for an
/// earlier document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTicket {
    generation: u64,
    page: u32,
}

impl RenderTicket {
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of ready thumbnails currently stored
    pub ready_count: usize,

    /// Number of renders currently in flight
    pub pending_count: usize,

    /// Total memory used by stored thumbnails (bytes)
    pub memory_used: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of results discarded because their document was replaced
    pub stale_discards: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

enum Entry {
    Pending,
    Ready(CachedThumbnail),
}

struct CacheState {
    entries: HashMap<u32, Entry>,
    generation: u64,
    memory_used: usize,
    stats: CacheStats,
}

impl CacheState {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            generation: 0,
            memory_used: 0,
            stats: CacheStats::default(),
        }
    }

    fn refresh_counts(&mut self) {
        self.stats.ready_count =
            self.entries.values().filter(|e| matches!(e, Entry::Ready(_))).count();
        self.stats.pending_count =
            self.entries.values().filter(|e| matches!(e, Entry::Pending)).count();
        self.stats.memory_used = self.memory_used;
    }
}

/// Session-lifetime thumbnail cache
///
/// Thread-safe store of encoded page previews plus in-flight bookkeeping.
///
/// # Example
///
/// ```
/// use epub_viewer_cache::{CachedThumbnail, ThumbnailCache};
///
/// let cache = ThumbnailCache::new();
///
/// // Admit a render for page 3. A second attempt is refused while the
/// // first is in flight.
/// let ticket = cache.begin(3).unwrap();
/// assert!(cache.begin(3).is_none());
///
/// cache.put(ticket, CachedThumbnail::new(3, vec![0u8; 16], 200, 250));
/// assert!(cache.get(3).is_some());
/// ```
pub struct ThumbnailCache {
    state: Arc<Mutex<CacheState>>,
}

impl Default for ThumbnailCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ThumbnailCache {
    pub fn new() -> Self {
        Self { state: Arc::new(Mutex::new(CacheState::new())) }
    }

    /// Admit a render for a page.
    ///
    /// Returns a ticket when the page has no stored thumbnail and no render
    /// in flight; returns `None` otherwise. Callers must hand the ticket
    /// back through [`put`](Self::put) or [`cancel`](Self::cancel).
    pub fn begin(&self, page: u32) -> Option<RenderTicket> {
        let mut state = self.state.lock().unwrap();

        if state.entries.contains_key(&page) {
            return None;
        }

        state.entries.insert(page, Entry::Pending);
        let ticket = RenderTicket { generation: state.generation, page };
        state.refresh_counts();
        Some(ticket)
    }

    /// Store a finished render.
    ///
    /// Returns `false` and discards the image when the ticket's generation
    /// no longer matches, which happens when a new document was loaded
    /// while the render was in flight.
    pub fn put(&self, ticket: RenderTicket, thumbnail: CachedThumbnail) -> bool {
        let mut state = self.state.lock().unwrap();

        if ticket.generation != state.generation {
            log::debug!(
                "discarding stale thumbnail for page {} (generation {} != {})",
                ticket.page,
                ticket.generation,
                state.generation
            );
            state.stats.stale_discards += 1;
            return false;
        }

        // Replacing a pending entry is the normal path; replacing a ready
        // entry keeps memory accounting balanced.
        if let Some(Entry::Ready(old)) = state.entries.get(&ticket.page) {
            state.memory_used = state.memory_used.saturating_sub(old.memory_size());
        }

        state.memory_used += thumbnail.memory_size();
        state.entries.insert(ticket.page, Entry::Ready(thumbnail));
        state.refresh_counts();
        true
    }

    /// Withdraw an in-flight render, returning the page to the absent
    /// state so it can be scheduled again later.
    pub fn cancel(&self, ticket: RenderTicket) {
        let mut state = self.state.lock().unwrap();

        if ticket.generation != state.generation {
            return;
        }
        if matches!(state.entries.get(&ticket.page), Some(Entry::Pending)) {
            state.entries.remove(&ticket.page);
            state.refresh_counts();
        }
    }

    /// Retrieve the stored thumbnail for a page, if ready.
    pub fn get(&self, page: u32) -> Option<CachedThumbnail> {
        let mut state = self.state.lock().unwrap();

        match state.entries.get(&page) {
            Some(Entry::Ready(thumbnail)) => {
                let thumbnail = thumbnail.clone();
                state.stats.hits += 1;
                Some(thumbnail)
            }
            _ => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Whether a ready thumbnail is stored for the page.
    pub fn has(&self, page: u32) -> bool {
        let state = self.state.lock().unwrap();
        matches!(state.entries.get(&page), Some(Entry::Ready(_)))
    }

    /// Whether a render is currently in flight for the page.
    pub fn is_pending(&self, page: u32) -> bool {
        let state = self.state.lock().unwrap();
        matches!(state.entries.get(&page), Some(Entry::Pending))
    }

    /// Drop every entry and advance the generation.
    ///
    /// Called when a new document replaces the session. Renders still in
    /// flight keep their old-generation tickets and their results will be
    /// refused by [`put`](Self::put).
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
        state.memory_used = 0;
        state.generation += 1;
        state.refresh_counts();
    }

    /// Current document generation.
    pub fn generation(&self) -> u64 {
        self.state.lock().unwrap().generation
    }

    /// Number of ready thumbnails stored.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().stats.ready_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.state.lock().unwrap().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thumb(page: u32) -> CachedThumbnail {
        CachedThumbnail::new(page, vec![page as u8; 32], 200, 250)
    }

    #[test]
    fn begin_is_idempotent_per_page() {
        let cache = ThumbnailCache::new();

        let ticket = cache.begin(3).expect("first admission succeeds");
        assert!(cache.begin(3).is_none(), "page already in flight");
        assert!(cache.is_pending(3));

        assert!(cache.put(ticket, thumb(3)));
        assert!(cache.begin(3).is_none(), "page already cached");
        assert!(cache.has(3));
    }

    #[test]
    fn get_records_hits_and_misses() {
        let cache = ThumbnailCache::new();

        assert!(cache.get(1).is_none());
        let ticket = cache.begin(1).unwrap();
        assert!(cache.get(1).is_none(), "pending is not ready");
        cache.put(ticket, thumb(1));
        assert!(cache.get(1).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert!((stats.hit_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_entries_and_advances_generation() {
        let cache = ThumbnailCache::new();

        let ticket = cache.begin(5).unwrap();
        cache.put(ticket, thumb(5));
        assert_eq!(cache.len(), 1);

        let before = cache.generation();
        cache.reset();
        assert_eq!(cache.generation(), before + 1);
        assert!(cache.is_empty());
        assert!(!cache.has(5));
        assert!(cache.begin(5).is_some(), "page schedulable again");
    }

    #[test]
    fn stale_results_are_discarded() {
        let cache = ThumbnailCache::new();

        let old_ticket = cache.begin(2).unwrap();
        cache.reset();

        assert!(!cache.put(old_ticket, thumb(2)), "old generation refused");
        assert!(!cache.has(2));
        assert_eq!(cache.stats().stale_discards, 1);

        // The page is free for the new document.
        let new_ticket = cache.begin(2).unwrap();
        assert!(cache.put(new_ticket, thumb(2)));
        assert!(cache.has(2));
    }

    #[test]
    fn cancel_returns_page_to_absent() {
        let cache = ThumbnailCache::new();

        let ticket = cache.begin(7).unwrap();
        cache.cancel(ticket);

        assert!(!cache.is_pending(7));
        assert!(cache.begin(7).is_some());
    }

    #[test]
    fn cancel_ignores_stale_tickets() {
        let cache = ThumbnailCache::new();

        let old_ticket = cache.begin(4).unwrap();
        cache.reset();
        let new_ticket = cache.begin(4).unwrap();

        cache.cancel(old_ticket);
        assert!(cache.is_pending(4), "new generation entry untouched");
        cache.cancel(new_ticket);
        assert!(!cache.is_pending(4));
    }

    #[test]
    fn memory_accounting_tracks_stored_bytes() {
        let cache = ThumbnailCache::new();

        let ticket = cache.begin(1).unwrap();
        cache.put(ticket, thumb(1));
        assert_eq!(cache.stats().memory_used, 32);

        cache.reset();
        assert_eq!(cache.stats().memory_used, 0);
    }
}
