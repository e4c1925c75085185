//! Ordered scans over the leaf level.
//!
//! A scan descends once to its start leaf and then follows right-sibling
//! links, reading each leaf under a shared lock. Shared locks are kept until
//! the transaction completes.

use std::collections::VecDeque;

use crate::buffer::LockMode;
use crate::common::{PageId, Result, TransactionId};
use crate::index::btree::{BLinkTreeFile, IndexPredicate};
use crate::tuple::{Key, Tuple};

/// Where a cursor is in the leaf chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Not opened yet; the next read descends from the root.
    Start,
    /// The next leaf to read.
    Leaf(PageId),
    Done,
}

/// Walks the leaf chain from the leaf that may hold `start` (or the leftmost
/// leaf) and yields tuples one at a time.
struct LeafCursor<'a> {
    tree: &'a BLinkTreeFile,
    txn: TransactionId,
    start: Option<Key>,
    position: Position,
    buffered: VecDeque<Tuple>,
}

impl<'a> LeafCursor<'a> {
    fn new(tree: &'a BLinkTreeFile, txn: TransactionId, start: Option<Key>) -> Self {
        Self {
            tree,
            txn,
            start,
            position: Position::Start,
            buffered: VecDeque::new(),
        }
    }

    fn rewind(&mut self) {
        self.position = Position::Start;
        self.buffered.clear();
    }

    fn stop(&mut self) {
        self.position = Position::Done;
        self.buffered.clear();
    }

    /// Buffer the tuples of the next leaf. Returns false at the end of the
    /// chain.
    fn load_next(&mut self) -> Result<bool> {
        let page = match self.position {
            Position::Done => return Ok(false),
            Position::Start => {
                // The root pointer is read unlocked; a scan must not hold
                // up root growth.
                let root = self.tree.root_pointer(self.txn)?;
                self.tree
                    .find_leaf_page(self.txn, root, LockMode::Shared, self.start)?
            }
            Position::Leaf(pid) => self.tree.fetch(self.txn, pid, LockMode::Shared)?,
        };

        let guard = page.read();
        let leaf = guard.as_leaf()?;
        self.buffered
            .extend((0..leaf.num_tuples()).filter_map(|slot| leaf.tuple_at(slot)));
        self.position = match leaf.right_sibling() {
            Some(sibling) => Position::Leaf(sibling),
            None => Position::Done,
        };
        Ok(true)
    }

    fn next_tuple(&mut self) -> Option<Result<Tuple>> {
        loop {
            if let Some(tuple) = self.buffered.pop_front() {
                return Some(Ok(tuple));
            }
            match self.load_next() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => {
                    self.stop();
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Every tuple of a tree in key order.
///
/// Yields `Err` once if a page cannot be read (e.g. a lock timed out) and
/// then ends.
pub struct BLinkTreeIterator<'a> {
    cursor: LeafCursor<'a>,
}

impl<'a> BLinkTreeIterator<'a> {
    pub fn new(tree: &'a BLinkTreeFile, txn: TransactionId) -> Self {
        Self {
            cursor: LeafCursor::new(tree, txn, None),
        }
    }

    /// Start over from the leftmost leaf.
    pub fn rewind(&mut self) {
        self.cursor.rewind();
    }
}

impl Iterator for BLinkTreeIterator<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_tuple()
    }
}

/// Tuples whose key satisfies an [`IndexPredicate`], in key order.
///
/// Equality and lower-bound predicates start at the leaf that may hold the
/// operand instead of the leftmost leaf. The scan ends as soon as no later
/// tuple can match.
pub struct BLinkTreeIndexIterator<'a> {
    cursor: LeafCursor<'a>,
    predicate: IndexPredicate,
    key_field: usize,
}

impl<'a> BLinkTreeIndexIterator<'a> {
    pub fn new(tree: &'a BLinkTreeFile, txn: TransactionId, predicate: IndexPredicate) -> Self {
        Self {
            cursor: LeafCursor::new(tree, txn, predicate.start_key()),
            predicate,
            key_field: tree.key_field(),
        }
    }

    pub fn predicate(&self) -> IndexPredicate {
        self.predicate
    }

    pub fn rewind(&mut self) {
        self.cursor.rewind();
    }
}

impl Iterator for BLinkTreeIndexIterator<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let tuple = match self.cursor.next_tuple()? {
                Ok(t) => t,
                Err(e) => return Some(Err(e)),
            };
            let key = tuple.field(self.key_field);
            if self.predicate.exhausted_at(key) {
                self.cursor.stop();
                return None;
            }
            if self.predicate.matches(key) {
                return Some(Ok(tuple));
            }
        }
    }
}
