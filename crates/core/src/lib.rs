//! EPUB viewer core.
//!
//! Session and shell glue: [`DocumentSession`] owns one opened document
//! and its location index, [`ViewerController`] wires user events (file
//! intake, navigation, zoom, the thumbnail panel) to the engine, cache,
//! scheduler, and rasterizer crates, and [`print_shell`] packages the
//! displayed content for the host's print dialog.

pub mod controller;
pub mod print;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use controller::{
    ControllerError, ThumbnailSlot, ViewerController, ZOOM_MAX, ZOOM_MIN, ZOOM_STEP,
};
pub use print::{print_shell, PrintJob, PRINT_PAINT_DELAY};
pub use session::{DocumentSession, SessionError, DEFAULT_GRANULARITY};
