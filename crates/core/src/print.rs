//! Print shell
//!
//! Printing hands a standalone HTML document to the host shell: the
//! displayed content root wrapped verbatim in a minimal page, plus the
//! delay the shell should wait before invoking the platform print dialog
//! so the page has painted.

use std::time::Duration;

use epub_engine::ContentRoot;

/// Wait between handing the shell the document and triggering the dialog.
pub const PRINT_PAINT_DELAY: Duration = Duration::from_millis(500);

/// A print request for the host shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    /// Complete standalone HTML document
    pub html: String,

    /// How long to let the page paint before opening the dialog
    pub paint_delay: Duration,
}

/// Wrap the currently displayed content for printing.
///
/// The content is embedded verbatim; both vector and markup roots are
/// valid inline HTML.
pub fn print_shell(title: &str, content: &ContentRoot) -> PrintJob {
    let body = match content {
        ContentRoot::Vector(svg) => svg.as_str(),
        ContentRoot::Markup(markup) => markup.as_str(),
    };

    let html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>{title}</title>\n<style>\n\
         body {{ margin: 0; padding: 20px; font-family: serif; }}\n\
         img, svg {{ max-width: 100%; }}\n\
         </style>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    );

    PrintJob { html, paint_delay: PRINT_PAINT_DELAY }
}
