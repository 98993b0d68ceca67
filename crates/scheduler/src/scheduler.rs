//! Job scheduler
//!
//! Single point of submission for viewer work. The embedder drains jobs
//! with [`JobScheduler::next_job`] from its own loop; nothing here spawns
//! threads.

use std::sync::Mutex;

use crate::cancel::{CancellationRegistry, CancellationToken};
use crate::priority::{Job, JobId, JobPriority, JobType, PriorityQueue};

/// Scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_cancelled: u64,

    /// Current queue size
    pub queue_size: usize,
}

impl SchedulerStats {
    /// Jobs submitted but neither completed nor cancelled.
    pub fn outstanding(&self) -> u64 {
        self.jobs_submitted - self.jobs_completed - self.jobs_cancelled
    }
}

/// Priority scheduler with cooperative cancellation.
///
/// # Example
///
/// ```
/// use epub_viewer_scheduler::{JobPriority, JobScheduler, JobType};
///
/// let scheduler = JobScheduler::new();
/// let (job_id, token) = scheduler.submit(
///     JobPriority::Thumbnails,
///     JobType::RasterizeThumbnail { page: 3, width: 200, height: 250 },
/// );
///
/// while let Some(job) = scheduler.next_job() {
///     if !token.is_cancelled() {
///         // run the job
///     }
///     scheduler.complete_job(job.id);
/// }
/// # let _ = job_id;
/// ```
pub struct JobScheduler {
    queue: PriorityQueue,
    stats: Mutex<SchedulerStats>,
    cancellation: CancellationRegistry,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            stats: Mutex::new(SchedulerStats::default()),
            cancellation: CancellationRegistry::new(),
        }
    }

    /// Queue a job. Returns its ID and a cancellation token; the token
    /// stays registered until the job completes or is cancelled.
    pub fn submit(&self, priority: JobPriority, job_type: JobType) -> (JobId, CancellationToken) {
        let job_id = self.queue.push(priority, job_type);
        let token = self.cancellation.register(job_id);
        self.stats.lock().unwrap().jobs_submitted += 1;
        (job_id, token)
    }

    /// Take the highest priority job off the queue. Its token stays
    /// registered so a running job can still be cancelled by ID.
    pub fn next_job(&self) -> Option<Job> {
        self.queue.pop()
    }

    /// Next job without removing it.
    pub fn peek_next_job(&self) -> Option<Job> {
        self.queue.peek()
    }

    /// Record completion and release the job's token.
    pub fn complete_job(&self, job_id: JobId) {
        self.stats.lock().unwrap().jobs_completed += 1;
        self.cancellation.unregister(job_id);
    }

    /// Cancel one job. Queued jobs are removed outright; a job already
    /// handed to a runner only has its token flipped. Returns `true` when
    /// the job was known.
    pub fn cancel_job(&self, job_id: JobId) -> bool {
        let token_cancelled = self.cancellation.cancel(job_id);
        let removed = self.queue.remove_if(|job| job.id == job_id);

        if removed > 0 {
            self.stats.lock().unwrap().jobs_cancelled += removed as u64;
            self.cancellation.unregister(job_id);
            return true;
        }
        token_cancelled
    }

    /// Cancel every queued job matching a predicate; returns the number
    /// removed from the queue.
    pub fn cancel_jobs_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Job) -> bool,
    {
        let to_cancel: Vec<JobId> =
            self.queue.jobs().into_iter().filter(|job| predicate(job)).map(|job| job.id).collect();
        self.cancellation.cancel_many(&to_cancel);

        let removed = self.queue.remove_if(predicate);
        if removed > 0 {
            self.stats.lock().unwrap().jobs_cancelled += removed as u64;
            for job_id in to_cancel {
                self.cancellation.unregister(job_id);
            }
        }
        removed
    }

    /// Cancel all jobs targeting one page. Useful when a page scrolls out
    /// of the thumbnail window.
    pub fn cancel_page_jobs(&self, page: u32) -> usize {
        self.cancel_jobs_if(|job| job.job_type.page() == Some(page))
    }

    /// Cancel everything queued and flip every registered token. Called on
    /// document replacement.
    pub fn clear(&self) {
        let cancelled = self.queue.len();
        self.cancellation.cancel_all();
        self.queue.clear();

        if cancelled > 0 {
            self.stats.lock().unwrap().jobs_cancelled += cancelled as u64;
        }
        self.cancellation.clear();
    }

    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn get_cancellation_token(&self, job_id: JobId) -> Option<CancellationToken> {
        self.cancellation.get(job_id)
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = self.stats.lock().unwrap().clone();
        stats.queue_size = self.queue.len();
        stats
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}
