//! Incremental pagination over collection listings.

mod cursor;
mod page;

pub use cursor::{CursorState, PaginatedCursor};
pub use page::{AsyncPageSource, PageResponse, PageSource};
