//! B-link tree index.
//!
//! # Components
//! - [`BLinkTreeFile`] - search, insert, split, delete
//! - [`BLinkTreeIterator`] / [`BLinkTreeIndexIterator`] - ordered scans
//! - [`IndexPredicate`] - key predicates for index scans
//! - [`TreeSummary`] - result of [`BLinkTreeFile::check_integrity`]

mod blink_tree;
mod checker;
mod iterator;
mod predicate;

pub use blink_tree::BLinkTreeFile;
pub use checker::TreeSummary;
pub use iterator::{BLinkTreeIndexIterator, BLinkTreeIterator};
pub use predicate::{IndexPredicate, PredicateOp};
