//! # Folio
//!
//! A fragmentation engine for paged media.
//!
//! Most layout engines treat a document as an infinite vertical canvas and
//! slice it into pages afterwards. Folio lays boxes out *into* pages: every
//! layout call knows where the page ends, returns the part of the box that
//! fits, and a resume stack addressing where the next page picks up.
//!
//! ## Architecture
//!
//! ```text
//! Input (JSON/API)
//!       ↓
//!   [model]    — Document tree, page configuration, box building
//!       ↓
//!   [style]    — Declared values resolved per box
//!       ↓
//!   [layout]   — Block and line fragmentation, floats, footnotes, pages
//!       ↓
//!   [Page]s    — Page box trees, summarized as JSON by the CLI
//! ```

pub mod boxes;
pub mod counters;
pub mod error;
pub mod layout;
pub mod model;
pub mod style;
pub mod text;

pub use error::{FolioError, LayoutError};
pub use layout::page::{Page, PageSummary};
pub use layout::LayoutEngine;
pub use model::Document;

/// Lay out a document into pages with the default engine.
pub fn paginate(document: &Document) -> Result<Vec<Page>, FolioError> {
    let engine = LayoutEngine::new();
    Ok(engine.layout(document)?)
}

/// Lay out a document described as JSON.
pub fn paginate_json(json: &str) -> Result<Vec<Page>, FolioError> {
    let document: Document = serde_json::from_str(json)?;
    paginate(&document)
}

/// Lay out a JSON document and summarize its pages.
pub fn summarize_json(json: &str) -> Result<Vec<PageSummary>, FolioError> {
    let pages = paginate_json(json)?;
    Ok(pages.iter().map(Page::summary).collect())
}
