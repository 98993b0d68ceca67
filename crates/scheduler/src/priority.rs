//! Priority-ordered job queue
//!
//! Orders viewer work so interactive requests preempt background preview
//! generation. Within one priority level jobs run in submission order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};

/// Job priority levels
///
/// Higher numeric values have higher priority and are executed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    /// Thumbnail strip previews (background, runs when idle)
    Thumbnails = 0,

    /// Navigation in the primary viewport
    Display = 1,

    /// Document intake (blocks everything else)
    Load = 2,
}

/// Unique job identifier
pub type JobId = u64;

/// Work items the viewer schedules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobType {
    /// Parse an incoming document package
    LoadDocument { name: String },

    /// Jump the primary rendition to a page (1-based location index)
    DisplayLocation { page: u32 },

    /// Produce one thumbnail via an off-screen capture pass
    RasterizeThumbnail { page: u32, width: u32, height: u32 },
}

impl JobType {
    /// The page this job targets, when it targets one.
    pub fn page(&self) -> Option<u32> {
        match self {
            JobType::LoadDocument { .. } => None,
            JobType::DisplayLocation { page } => Some(*page),
            JobType::RasterizeThumbnail { page, .. } => Some(*page),
        }
    }
}

/// A scheduled job.
///
/// Ordered by priority first, then by insertion order so that jobs of the
/// same priority come out FIFO.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub priority: JobPriority,
    pub job_type: JobType,
    insertion_order: u64,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            // BinaryHeap is a max heap, so the insertion comparison is
            // reversed to make earlier submissions win.
            Ordering::Equal => other.insertion_order.cmp(&self.insertion_order),
            unequal => unequal,
        }
    }
}

struct QueueState {
    heap: BinaryHeap<Job>,
    next_job_id: JobId,
    insertion_counter: u64,
}

/// Thread-safe priority queue over [`Job`]s.
pub struct PriorityQueue {
    state: Arc<Mutex<QueueState>>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_job_id: 1,
                insertion_counter: 0,
            })),
        }
    }

    /// Enqueue a job, assigning it a fresh ID.
    pub fn push(&self, priority: JobPriority, job_type: JobType) -> JobId {
        let mut state = self.state.lock().unwrap();
        let job_id = state.next_job_id;
        state.next_job_id += 1;

        let insertion_order = state.insertion_counter;
        state.insertion_counter += 1;

        state.heap.push(Job { id: job_id, priority, job_type, insertion_order });
        job_id
    }

    /// Dequeue the highest priority job, or `None` when empty.
    pub fn pop(&self) -> Option<Job> {
        self.state.lock().unwrap().heap.pop()
    }

    /// Next job without removing it.
    pub fn peek(&self) -> Option<Job> {
        self.state.lock().unwrap().heap.peek().cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().heap.is_empty()
    }

    pub fn clear(&self) {
        self.state.lock().unwrap().heap.clear();
    }

    /// Remove every queued job matching a predicate. Returns the number
    /// removed.
    pub fn remove_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Job) -> bool,
    {
        let mut state = self.state.lock().unwrap();
        let original_len = state.heap.len();

        let mut remaining = Vec::new();
        while let Some(job) = state.heap.pop() {
            if !predicate(&job) {
                remaining.push(job);
            }
        }
        state.heap = remaining.into_iter().collect();

        original_len - state.heap.len()
    }

    /// All queued jobs, in arbitrary order.
    pub fn jobs(&self) -> Vec<Job> {
        self.state.lock().unwrap().heap.iter().cloned().collect()
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thumb_job(page: u32) -> JobType {
        JobType::RasterizeThumbnail { page, width: 200, height: 250 }
    }

    #[test]
    fn priority_levels_order_interactive_work_first() {
        assert!(JobPriority::Load > JobPriority::Display);
        assert!(JobPriority::Display > JobPriority::Thumbnails);
    }

    #[test]
    fn pop_follows_priority_not_submission_order() {
        let queue = PriorityQueue::new();

        queue.push(JobPriority::Thumbnails, thumb_job(4));
        queue.push(JobPriority::Display, JobType::DisplayLocation { page: 2 });
        queue.push(JobPriority::Load, JobType::LoadDocument { name: "book.epub".into() });

        assert_eq!(queue.pop().unwrap().priority, JobPriority::Load);
        assert_eq!(queue.pop().unwrap().priority, JobPriority::Display);
        assert_eq!(queue.pop().unwrap().priority, JobPriority::Thumbnails);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn fifo_within_same_priority() {
        let queue = PriorityQueue::new();

        let id1 = queue.push(JobPriority::Thumbnails, thumb_job(1));
        let id2 = queue.push(JobPriority::Thumbnails, thumb_job(2));
        let id3 = queue.push(JobPriority::Thumbnails, thumb_job(3));

        assert_eq!(queue.pop().unwrap().id, id1);
        assert_eq!(queue.pop().unwrap().id, id2);
        assert_eq!(queue.pop().unwrap().id, id3);
    }

    #[test]
    fn peek_does_not_remove() {
        let queue = PriorityQueue::new();
        assert!(queue.peek().is_none());

        let id = queue.push(JobPriority::Display, JobType::DisplayLocation { page: 7 });
        assert_eq!(queue.peek().unwrap().id, id);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn remove_if_filters_by_page() {
        let queue = PriorityQueue::new();

        queue.push(JobPriority::Thumbnails, thumb_job(1));
        queue.push(JobPriority::Thumbnails, thumb_job(2));
        queue.push(JobPriority::Display, JobType::DisplayLocation { page: 1 });

        let removed = queue.remove_if(|job| job.job_type.page() == Some(1));
        assert_eq!(removed, 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().job_type.page(), Some(2));
    }

    #[test]
    fn job_type_page_extraction() {
        assert_eq!(JobType::LoadDocument { name: "x".into() }.page(), None);
        assert_eq!(JobType::DisplayLocation { page: 5 }.page(), Some(5));
        assert_eq!(thumb_job(9).page(), Some(9));
    }
}
