//! Common types and utilities shared across blinkdb.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants
//! - Error types
//! - Identifiers (PageId, FileId, TransactionId)

pub mod config;
pub mod error;
mod page_id;
mod txn_id;

pub use error::{AbortReason, Error, Result};
pub use page_id::{FileId, PageCategory, PageId};
pub use txn_id::TransactionId;
