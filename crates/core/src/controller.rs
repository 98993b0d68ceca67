//! Viewer controller
//!
//! Single-threaded glue between the host shell and the lower crates. The
//! shell forwards user events (file intake, navigation, zoom, thumbnail
//! panel scrolls) and periodically drains the job pump; the controller
//! owns the session, the primary rendition, the thumbnail cache, and the
//! scheduler.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use epub_engine::{Cfi, Flow, LayoutEngine, Relocation, Rendition, RenditionOptions};
use epub_viewer_cache::{CachedThumbnail, RenderTicket, ThumbnailCache};
use epub_viewer_render::{RasterizerConfig, Thumbnail, ThumbnailRasterizer};
use epub_viewer_scheduler::{
    visible_window, JobId, JobPriority, JobScheduler, JobType, StripLayout,
};

use crate::print::{print_shell, PrintJob};
use crate::session::{DocumentSession, SessionError, DEFAULT_GRANULARITY};

pub const ZOOM_MIN: f32 = 0.5;
pub const ZOOM_MAX: f32 = 2.0;
pub const ZOOM_STEP: f32 = 0.1;

/// Fraction of the shell height given to the reading pane.
const VIEW_HEIGHT_FRACTION: f32 = 0.8;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),
    #[error("no document is loaded")]
    NoDocument,
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// One cell of the thumbnail strip, ready for the shell to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailSlot {
    pub page: u32,

    /// Encoded preview as a data URL, when the render has finished.
    pub data_url: Option<String>,

    /// A render for this page is in flight.
    pub pending: bool,

    /// This page is on screen in the primary viewport.
    pub current: bool,
}

type EngineFactory = Box<dyn Fn() -> Box<dyn LayoutEngine>>;

pub struct ViewerController {
    engine_factory: EngineFactory,
    session: Option<DocumentSession>,
    rendition: Option<Box<dyn Rendition>>,

    cache: ThumbnailCache,
    jobs: JobScheduler,
    rasterizer: ThumbnailRasterizer,
    strip_layout: StripLayout,

    /// Tickets for thumbnail jobs waiting in the queue, by job ID.
    pending_tickets: HashMap<JobId, RenderTicket>,

    /// Relocations reported by the rendition hook, drained by the pump.
    relocations: Rc<RefCell<VecDeque<Relocation>>>,

    current_page: u32,
    zoom: f32,
    show_thumbnails: bool,
    thumb_scroll: f32,
    shell_width: u32,
    shell_height: u32,
}

impl ViewerController {
    pub fn new(engine_factory: EngineFactory) -> Self {
        Self {
            engine_factory,
            session: None,
            rendition: None,
            cache: ThumbnailCache::new(),
            jobs: JobScheduler::new(),
            rasterizer: ThumbnailRasterizer::new(RasterizerConfig::default()),
            strip_layout: StripLayout::default(),
            pending_tickets: HashMap::new(),
            relocations: Rc::new(RefCell::new(VecDeque::new())),
            current_page: 0,
            zoom: 1.0,
            show_thumbnails: false,
            thumb_scroll: 0.0,
            shell_width: 900,
            shell_height: 700,
        }
    }

    /// Override the rasterizer, for shells that want other preview sizes
    /// or settle behavior.
    pub fn with_rasterizer(mut self, rasterizer: ThumbnailRasterizer) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    // --- file intake -----------------------------------------------------

    /// Open a document the user handed to the shell.
    ///
    /// Only `.epub` packages are accepted; a refused file leaves the
    /// current document untouched. Accepting a file tears down the old
    /// session, resets the cache and scheduler, and displays page 1.
    pub fn open_document(&mut self, file_name: &str, bytes: Vec<u8>) -> Result<(), ControllerError> {
        if !has_epub_extension(file_name) {
            return Err(ControllerError::UnsupportedFile(file_name.to_owned()));
        }

        self.teardown_document();

        // Intake is tracked through the scheduler so stats and ordering
        // reflect it, even though the load itself runs inline.
        let (load_id, _token) = self
            .jobs
            .submit(JobPriority::Load, JobType::LoadDocument { name: file_name.to_owned() });

        let loaded = self.load_session(bytes);
        match loaded {
            Ok(()) => {
                if let Some(job) = self.jobs.next_job() {
                    debug_assert_eq!(job.id, load_id);
                }
                self.jobs.complete_job(load_id);
                log::info!("opened {file_name}: {} pages", self.total_pages());
                if self.show_thumbnails {
                    self.schedule_visible_thumbnails();
                }
                Ok(())
            }
            Err(err) => {
                self.jobs.cancel_job(load_id);
                Err(err.into())
            }
        }
    }

    fn load_session(&mut self, bytes: Vec<u8>) -> Result<(), SessionError> {
        let mut session = DocumentSession::load((self.engine_factory)(), bytes)?;
        session.generate_index(DEFAULT_GRANULARITY)?;

        let (width, height) = self.rendition_size();
        let mut rendition = session.open_rendition(RenditionOptions {
            width,
            height,
            flow: Flow::Paginated,
            allow_scripted_content: false,
        })?;

        let sink = Rc::clone(&self.relocations);
        rendition.set_relocated_hook(Box::new(move |relocation| {
            sink.borrow_mut().push_back(relocation.clone());
        }));

        // The first display can land before layout settles; a miss here is
        // non-fatal and the next navigation recovers.
        match session.location_for_page(1) {
            Ok(first) => {
                if let Err(err) = rendition.display(&first) {
                    log::warn!("initial display failed: {err}");
                }
            }
            Err(err) => log::warn!("document has no first page: {err}"),
        }

        self.current_page = 1;
        self.session = Some(session);
        self.rendition = Some(rendition);
        self.pump_relocations();
        Ok(())
    }

    fn teardown_document(&mut self) {
        if let Some(mut rendition) = self.rendition.take() {
            rendition.destroy();
        }
        self.session = None;
        self.jobs.clear();
        self.pending_tickets.clear();
        self.cache.reset();
        self.relocations.borrow_mut().clear();
        self.current_page = 0;
    }

    // --- navigation ------------------------------------------------------

    pub fn next_page(&mut self) -> Result<(), ControllerError> {
        let rendition = self.rendition.as_mut().ok_or(ControllerError::NoDocument)?;
        if let Err(err) = rendition.next() {
            log::warn!("next failed: {err}");
        }
        self.pump_relocations();
        Ok(())
    }

    pub fn prev_page(&mut self) -> Result<(), ControllerError> {
        let rendition = self.rendition.as_mut().ok_or(ControllerError::NoDocument)?;
        if let Err(err) = rendition.prev() {
            log::warn!("prev failed: {err}");
        }
        self.pump_relocations();
        Ok(())
    }

    /// Queue a jump to a page. The jump runs on the next pump, after any
    /// queued load work but before thumbnails.
    pub fn go_to_page(&mut self, page: u32) -> Result<(), ControllerError> {
        let session = self.session.as_ref().ok_or(ControllerError::NoDocument)?;
        let total = session.total_pages();
        if page == 0 || page > total {
            return Err(SessionError::PageOutOfRange { page, total }.into());
        }
        self.jobs.submit(JobPriority::Display, JobType::DisplayLocation { page });
        Ok(())
    }

    fn display_page(&mut self, page: u32) {
        let (Some(session), Some(rendition)) = (self.session.as_ref(), self.rendition.as_mut())
        else {
            return;
        };
        match session.location_for_page(page) {
            Ok(cfi) => {
                if let Err(err) = rendition.display(&cfi) {
                    log::warn!("display of page {page} failed: {err}");
                }
            }
            Err(err) => log::warn!("page {page} unresolvable: {err}"),
        }
    }

    /// Apply relocations reported by the rendition since the last call.
    pub fn pump_relocations(&mut self) {
        let drained: Vec<Relocation> = self.relocations.borrow_mut().drain(..).collect();
        for relocation in drained {
            match relocation.location {
                Some(page) => self.current_page = page,
                None => {
                    if let Some(page) = self.resolve_page(&relocation.cfi) {
                        self.current_page = page;
                    }
                }
            }
        }
    }

    fn resolve_page(&self, cfi: &Cfi) -> Option<u32> {
        let session = self.session.as_ref()?;
        match session.page_for_location(cfi) {
            Ok(page) => Some(page),
            Err(err) => {
                log::debug!("relocation unresolvable: {err}");
                None
            }
        }
    }

    // --- zoom ------------------------------------------------------------

    pub fn zoom_in(&mut self) {
        self.apply_zoom(self.zoom + ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.apply_zoom(self.zoom - ZOOM_STEP);
    }

    fn apply_zoom(&mut self, requested: f32) {
        // The rendition resizes with the newly clamped factor, never the
        // previous one.
        self.zoom = requested.clamp(ZOOM_MIN, ZOOM_MAX);
        self.resize_rendition();
    }

    /// The shell's content area changed size.
    pub fn set_shell_size(&mut self, width: u32, height: u32) {
        self.shell_width = width.max(1);
        self.shell_height = height.max(1);
        self.resize_rendition();
    }

    fn resize_rendition(&mut self) {
        let (width, height) = self.rendition_size();
        if let Some(rendition) = self.rendition.as_mut() {
            rendition.resize(width, height);
        }
    }

    fn rendition_size(&self) -> (u32, u32) {
        let width = (self.shell_width as f32 * self.zoom).round().max(1.0) as u32;
        let height =
            (self.shell_height as f32 * VIEW_HEIGHT_FRACTION * self.zoom).round().max(1.0) as u32;
        (width, height)
    }

    // --- thumbnail strip -------------------------------------------------

    pub fn toggle_thumbnails(&mut self) {
        self.show_thumbnails = !self.show_thumbnails;
        if self.show_thumbnails {
            self.schedule_visible_thumbnails();
        }
    }

    /// The thumbnail panel scrolled.
    pub fn set_thumb_scroll(&mut self, offset: f32) {
        self.thumb_scroll = offset;
        if self.show_thumbnails {
            self.schedule_visible_thumbnails();
        }
    }

    /// Queue renders for every visible page that is neither cached nor in
    /// flight. Safe to call on every scroll event.
    pub fn schedule_visible_thumbnails(&mut self) {
        let total = self.total_pages();
        let Some(window) = visible_window(self.thumb_scroll, &self.strip_layout, total) else {
            return;
        };

        let config = *self.rasterizer.config();
        for page in window {
            if let Some(ticket) = self.cache.begin(page) {
                let (job_id, _token) = self.jobs.submit(
                    JobPriority::Thumbnails,
                    JobType::RasterizeThumbnail {
                        page,
                        width: config.width,
                        height: config.height,
                    },
                );
                self.pending_tickets.insert(job_id, ticket);
            }
        }
    }

    /// Current strip contents for the shell to draw.
    pub fn strip_view(&self) -> Vec<ThumbnailSlot> {
        (1..=self.total_pages())
            .map(|page| {
                let data_url = self.cache.get(page).map(|cached| {
                    Thumbnail {
                        page: cached.page,
                        png: cached.png,
                        width: cached.width,
                        height: cached.height,
                    }
                    .to_data_url()
                });
                ThumbnailSlot {
                    page,
                    pending: self.cache.is_pending(page),
                    current: page == self.current_page,
                    data_url,
                }
            })
            .collect()
    }

    // --- job pump --------------------------------------------------------

    /// Drain the scheduler. Called from the shell's idle loop; runs at
    /// most `budget` jobs so the loop stays responsive.
    pub fn run_pending_jobs(&mut self, budget: usize) -> usize {
        let mut ran = 0;
        while ran < budget {
            let Some(job) = self.jobs.next_job() else { break };

            let cancelled = self
                .jobs
                .get_cancellation_token(job.id)
                .map_or(false, |token| token.is_cancelled());
            if cancelled {
                if let Some(ticket) = self.pending_tickets.remove(&job.id) {
                    self.cache.cancel(ticket);
                }
                self.jobs.complete_job(job.id);
                continue;
            }

            match job.job_type {
                JobType::RasterizeThumbnail { page, .. } => {
                    self.run_thumbnail_job(job.id, page);
                }
                JobType::DisplayLocation { page } => {
                    self.display_page(page);
                    self.pump_relocations();
                }
                JobType::LoadDocument { ref name } => {
                    // Intake runs inline in open_document; anything left
                    // here belongs to a torn-down load.
                    log::debug!("dropping orphaned load job for {name}");
                }
            }

            self.jobs.complete_job(job.id);
            ran += 1;
        }
        ran
    }

    fn run_thumbnail_job(&mut self, job_id: JobId, page: u32) {
        let Some(ticket) = self.pending_tickets.remove(&job_id) else {
            return;
        };
        let Some(session) = self.session.as_ref() else {
            self.cache.cancel(ticket);
            return;
        };

        let thumbnail = self.rasterizer.rasterize(session.engine(), session.handle(), page);
        self.cache.put(
            ticket,
            CachedThumbnail::new(page, thumbnail.png, thumbnail.width, thumbnail.height),
        );
    }

    // --- print -----------------------------------------------------------

    /// Print whatever the primary viewport currently shows.
    pub fn print_current(&self, title: &str) -> Option<PrintJob> {
        let rendition = self.rendition.as_ref()?;
        rendition.content().map(|content| print_shell(title, &content))
    }

    // --- state accessors -------------------------------------------------

    pub fn total_pages(&self) -> u32 {
        self.session.as_ref().map_or(0, |session| session.total_pages())
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn thumbnails_shown(&self) -> bool {
        self.show_thumbnails
    }

    pub fn has_document(&self) -> bool {
        self.session.is_some()
    }

    pub fn cache_stats(&self) -> epub_viewer_cache::CacheStats {
        self.cache.stats()
    }

    pub fn scheduler_stats(&self) -> epub_viewer_scheduler::SchedulerStats {
        self.jobs.stats()
    }
}

fn has_epub_extension(file_name: &str) -> bool {
    std::path::Path::new(file_name)
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("epub"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{EngineProbe, ScriptedEngine};
    use std::time::Duration;

    fn controller_with_pages(pages: u32) -> (ViewerController, EngineProbe) {
        let probe = EngineProbe::default();
        let factory_probe = probe.clone();
        let controller = ViewerController::new(Box::new(move || {
            Box::new(ScriptedEngine::with_pages_and_probe(pages, factory_probe.clone()))
        }))
        .with_rasterizer(ThumbnailRasterizer::new(RasterizerConfig {
            settle_delay: Duration::ZERO,
            ..RasterizerConfig::default()
        }));
        (controller, probe)
    }

    fn opened(pages: u32) -> (ViewerController, EngineProbe) {
        let (mut controller, probe) = controller_with_pages(pages);
        controller.open_document("book.epub", b"bytes".to_vec()).expect("open succeeds");
        (controller, probe)
    }

    #[test]
    fn open_rejects_non_epub_files() {
        let (mut controller, _) = controller_with_pages(10);
        let err = controller.open_document("notes.txt", Vec::new()).expect_err("refused");
        assert!(matches!(err, ControllerError::UnsupportedFile(_)));
        assert!(!controller.has_document());
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let (mut controller, _) = controller_with_pages(10);
        controller.open_document("BOOK.EPUB", b"bytes".to_vec()).expect("accepted");
        assert!(controller.has_document());
    }

    #[test]
    fn refused_file_keeps_current_document() {
        let (mut controller, _) = opened(10);
        assert_eq!(controller.total_pages(), 10);

        let _ = controller.open_document("image.png", Vec::new()).expect_err("refused");
        assert_eq!(controller.total_pages(), 10, "old session untouched");
        assert_eq!(controller.current_page(), 1);
    }

    #[test]
    fn open_displays_first_page() {
        let (controller, probe) = opened(10);
        assert_eq!(controller.current_page(), 1);
        assert_eq!(probe.displayed_pages.borrow().as_slice(), &[1]);
    }

    #[test]
    fn navigation_tracks_relocations() {
        let (mut controller, _) = opened(10);

        controller.next_page().unwrap();
        controller.next_page().unwrap();
        assert_eq!(controller.current_page(), 3);

        controller.prev_page().unwrap();
        assert_eq!(controller.current_page(), 2);
    }

    #[test]
    fn navigation_is_clamped_at_document_edges() {
        let (mut controller, _) = opened(3);

        controller.prev_page().unwrap();
        assert_eq!(controller.current_page(), 1);

        for _ in 0..10 {
            controller.next_page().unwrap();
        }
        assert_eq!(controller.current_page(), 3);
    }

    #[test]
    fn go_to_page_runs_through_the_pump() {
        let (mut controller, _) = opened(10);

        controller.go_to_page(7).unwrap();
        assert_eq!(controller.current_page(), 1, "jump waits for the pump");

        controller.run_pending_jobs(10);
        assert_eq!(controller.current_page(), 7);
    }

    #[test]
    fn go_to_page_rejects_out_of_range() {
        let (mut controller, _) = opened(5);
        assert!(controller.go_to_page(0).is_err());
        assert!(controller.go_to_page(6).is_err());

        let (mut empty, _) = controller_with_pages(5);
        assert!(matches!(empty.go_to_page(1), Err(ControllerError::NoDocument)));
    }

    #[test]
    fn zoom_resizes_with_new_factor() {
        let (mut controller, probe) = opened(10);

        controller.zoom_in();
        assert!((controller.zoom() - 1.1).abs() < 1e-6);

        let resizes = probe.resizes.borrow();
        let (width, height) = *resizes.last().expect("resize happened");
        assert_eq!(width, (900.0_f32 * 1.1).round() as u32);
        assert_eq!(height, (700.0_f32 * 0.8 * 1.1).round() as u32);
    }

    #[test]
    fn zoom_clamps_to_bounds() {
        let (mut controller, _) = opened(10);

        for _ in 0..30 {
            controller.zoom_in();
        }
        assert!((controller.zoom() - ZOOM_MAX).abs() < 1e-6);

        for _ in 0..30 {
            controller.zoom_out();
        }
        assert!((controller.zoom() - ZOOM_MIN).abs() < 1e-6);
    }

    #[test]
    fn visible_window_is_scheduled_once() {
        let (mut controller, _) = opened(30);

        controller.toggle_thumbnails();
        controller.run_pending_jobs(100);

        assert_eq!(controller.cache_stats().ready_count, 10);
        let submitted = controller.scheduler_stats().jobs_submitted;

        // Same scroll position again: everything cached, nothing queued.
        controller.set_thumb_scroll(0.0);
        assert_eq!(controller.scheduler_stats().jobs_submitted, submitted);
        assert_eq!(controller.scheduler_stats().queue_size, 0);
    }

    #[test]
    fn scrolling_loads_the_next_window() {
        let (mut controller, _) = opened(30);

        controller.toggle_thumbnails();
        controller.run_pending_jobs(100);

        // Two cells scrolled: window 3..=12, only 11 and 12 are new.
        let before = controller.scheduler_stats().jobs_submitted;
        controller.set_thumb_scroll(420.0);
        assert_eq!(controller.scheduler_stats().jobs_submitted, before + 2);

        controller.run_pending_jobs(100);
        let slots = controller.strip_view();
        assert!(slots[11].data_url.is_some(), "page 12 rendered");
        assert!(slots[12].data_url.is_none(), "page 13 outside window");
    }

    #[test]
    fn strip_view_marks_current_page() {
        let (mut controller, _) = opened(5);
        controller.go_to_page(2).unwrap();
        controller.run_pending_jobs(10);

        let slots = controller.strip_view();
        assert_eq!(slots.len(), 5);
        assert!(slots[1].current);
        assert!(!slots[0].current);
    }

    #[test]
    fn new_document_resets_cache_and_queue() {
        let (mut controller, _) = opened(30);

        controller.toggle_thumbnails();
        controller.run_pending_jobs(100);
        assert!(controller.cache_stats().ready_count > 0);

        controller.open_document("other.epub", b"bytes".to_vec()).expect("open succeeds");
        assert_eq!(controller.cache_stats().ready_count, 0);
        assert_eq!(controller.current_page(), 1);
    }

    #[test]
    fn document_swap_mid_flight_discards_stale_renders() {
        let (mut controller, _) = opened(30);

        // Queue thumbnail work but do not run it.
        controller.toggle_thumbnails();
        assert!(controller.scheduler_stats().queue_size > 0);

        // Replace the document before the pump runs; thumbnails were
        // re-scheduled for the new session by open_document.
        controller.open_document("other.epub", b"bytes".to_vec()).expect("open succeeds");
        controller.run_pending_jobs(100);

        let stats = controller.cache_stats();
        assert_eq!(stats.stale_discards, 0, "stale jobs were dropped before running");
        assert_eq!(stats.ready_count, 10, "new document window rendered");
    }

    #[test]
    fn print_wraps_displayed_content() {
        let (mut controller, _) = opened(5);
        controller.go_to_page(4).unwrap();
        controller.run_pending_jobs(10);

        let job = controller.print_current("My Book").expect("content displayed");
        assert!(job.html.contains("<p>page 4</p>"));
        assert!(job.html.contains("<title>My Book</title>"));

        let (empty, _) = controller_with_pages(5);
        assert!(empty.print_current("x").is_none());
    }

    #[test]
    fn teardown_destroys_the_old_rendition() {
        let (mut controller, probe) = opened(5);
        assert_eq!(probe.destroyed_renditions.get(), 0);

        controller.open_document("other.epub", b"bytes".to_vec()).expect("open succeeds");
        assert_eq!(probe.destroyed_renditions.get(), 1);
    }

    #[test]
    fn pump_budget_limits_work_per_call() {
        let (mut controller, _) = opened(30);
        controller.toggle_thumbnails();

        assert_eq!(controller.run_pending_jobs(3), 3);
        assert!(controller.scheduler_stats().queue_size > 0);
        controller.run_pending_jobs(100);
        assert_eq!(controller.scheduler_stats().queue_size, 0);
    }
}
