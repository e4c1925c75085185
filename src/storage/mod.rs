//! Storage layer - disk I/O and page formats.
//!
//! This module handles persistent storage:
//! - [`DiskManager`] - Low-level file I/O
//! - [`PageFile`] - A tree file: byte store plus page codec
//! - [`page`] - Page types and layouts

mod disk_manager;
pub mod page;
mod page_file;

pub use disk_manager::DiskManager;
pub use page_file::{DbFile, PageFile};
