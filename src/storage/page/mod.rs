//! Page types and layout.
//!
//! This module contains:
//! - [`BTreePage`] - A decoded tree page, tagged by category
//! - [`PageHeader`] - Metadata at the start of every page
//! - [`LeafPage`], [`InternalPage`], [`RootPointerPage`], [`HeaderPage`] -
//!   the category payloads

mod header_page;
mod internal_page;
mod leaf_page;
#[allow(clippy::module_inception)]
mod page;
mod page_header;
mod root_pointer_page;

pub use header_page::HeaderPage;
pub use internal_page::{Entry, InternalPage, INTERNAL_HEADER_SIZE};
pub use leaf_page::{LeafPage, LEAF_HEADER_SIZE};
pub use page::{BTreePage, PageBody, PageLayout};
pub use page_header::PageHeader;
pub use root_pointer_page::RootPointerPage;
