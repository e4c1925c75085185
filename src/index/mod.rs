//! Index structures.

pub mod btree;

pub use btree::{BLinkTreeFile, IndexPredicate, PredicateOp};
