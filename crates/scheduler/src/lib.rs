//! Job scheduling for the EPUB viewer.
//!
//! A priority queue over the viewer's three kinds of work (document load,
//! display navigation, thumbnail rasterization), cooperative cancellation
//! tokens, and the visible-window math that drives lazy thumbnail loading.
//!
//! The scheduler owns no threads. The embedder drains it from its own
//! loop, which keeps ordering deterministic and engine access
//! single-threaded.
//!
//! # Example
//!
//! ```
//! use epub_viewer_scheduler::{JobPriority, JobScheduler, JobType};
//!
//! let scheduler = JobScheduler::new();
//! scheduler.submit(
//!     JobPriority::Thumbnails,
//!     JobType::RasterizeThumbnail { page: 1, width: 200, height: 250 },
//! );
//! scheduler.submit(JobPriority::Display, JobType::DisplayLocation { page: 5 });
//!
//! // Display work comes out before background previews.
//! let first = scheduler.next_job().unwrap();
//! assert_eq!(first.priority, JobPriority::Display);
//! ```

mod cancel;
mod priority;
mod scheduler;
mod viewport;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use priority::{Job, JobId, JobPriority, JobType};
pub use scheduler::{JobScheduler, SchedulerStats};
pub use viewport::{visible_window, StripLayout};
