//! Structural verification and debugging output for a tree file.

use std::collections::HashSet;
use std::fmt;

use crate::buffer::LockMode;
use crate::common::{AbortReason, Error, PageCategory, PageId, Result, TransactionId};
use crate::index::btree::BLinkTreeFile;
use crate::storage::page::{BTreePage, PageBody};
use crate::tuple::Key;

/// Shape of a tree that passed [`BLinkTreeFile::check_integrity`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeSummary {
    /// Number of levels, leaves included.
    pub depth: usize,
    pub internal_pages: usize,
    pub leaf_pages: usize,
    pub tuples: usize,
}

impl fmt::Display for TreeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "depth {}, {} internal pages, {} leaves, {} tuples",
            self.depth, self.internal_pages, self.leaf_pages, self.tuples
        )
    }
}

/// The key range a parent assigns to one child: `[low, high)`.
#[derive(Debug, Clone, Copy)]
struct ChildRange {
    page: PageId,
    low: Option<Key>,
    high: Option<Key>,
}

fn violation(txn: TransactionId, msg: String) -> Error {
    Error::TransactionAborted {
        txn,
        reason: AbortReason::InvariantViolation(msg),
    }
}

fn fmt_bound(key: Option<Key>) -> String {
    key.map_or_else(|| "-".to_string(), |k| k.to_string())
}

/// Keys stored on a tree page: tuple keys for leaves, separators for
/// internal pages.
fn page_keys(page: &BTreePage) -> Vec<Key> {
    match page.body() {
        PageBody::Leaf(leaf) => leaf.keys().collect(),
        PageBody::Internal(internal) => internal.entries().map(|e| e.key).collect(),
        _ => Vec::new(),
    }
}

impl BLinkTreeFile {
    /// Snapshot every page of one level, following siblings from `leftmost`.
    fn level_chain(&self, txn: TransactionId, leftmost: PageId) -> Result<Vec<BTreePage>> {
        let mode = match leftmost.category {
            PageCategory::Leaf => LockMode::Shared,
            _ => LockMode::None,
        };
        let mut seen = HashSet::new();
        let mut pages = Vec::new();
        let mut next = Some(leftmost);
        while let Some(pid) = next {
            if !seen.insert(pid) {
                return Err(violation(txn, format!("sibling chain revisits {}", pid)));
            }
            let page = self.fetch(txn, pid, mode)?;
            let snapshot = page.read().clone();
            next = snapshot.right_sibling();
            pages.push(snapshot);
        }
        Ok(pages)
    }

    /// Check the structure of the whole tree as seen by `txn`.
    ///
    /// Meant for a quiescent tree: every split must have been recorded in
    /// its parent, which holds once the inserting transactions completed.
    ///
    /// Per level it checks that:
    /// - keys are sorted and lie in `[previous high key, high key)`
    /// - a page has a right sibling exactly when it has a high key
    /// - the sibling chain ends and visits each page once
    /// - the pages are exactly the children of the level above, in order,
    ///   and each page's high key is the separator to its right
    ///
    /// # Errors
    /// `TransactionAborted` with [`AbortReason::InvariantViolation`] naming
    /// the first failed check.
    pub fn check_integrity(&self, txn: TransactionId) -> Result<TreeSummary> {
        let root = self.root_pointer(txn)?;
        let mut expected_level = self.level_of(txn, root)?;
        let mut leftmost = root;
        let mut ranges: Option<Vec<ChildRange>> = None;
        let mut summary = TreeSummary::default();

        loop {
            let pages = self.level_chain(txn, leftmost)?;
            summary.depth += 1;

            if let Some(ranges) = &ranges {
                let found: Vec<PageId> = pages.iter().map(|p| p.id()).collect();
                let wanted: Vec<PageId> = ranges.iter().map(|r| r.page).collect();
                if found != wanted {
                    return Err(violation(
                        txn,
                        format!(
                            "level {} chain has {} pages, parents link {}",
                            expected_level,
                            found.len(),
                            wanted.len()
                        ),
                    ));
                }
            }

            let mut children = Vec::new();
            let mut low: Option<Key> = None;
            for (i, page) in pages.iter().enumerate() {
                let high = page.high_key();
                if page.right_sibling().is_some() != high.is_some() {
                    return Err(violation(
                        txn,
                        format!("{} has a sibling without a high key or the reverse", page.id()),
                    ));
                }
                if let Some(range) = ranges.as_ref().and_then(|r| r.get(i)) {
                    if range.high != high {
                        return Err(violation(
                            txn,
                            format!(
                                "{} has high key {} but its parent bounds it at {}",
                                page.id(),
                                fmt_bound(high),
                                fmt_bound(range.high)
                            ),
                        ));
                    }
                }

                let keys = page_keys(page);
                if keys.windows(2).any(|w| w[0] > w[1]) {
                    return Err(violation(txn, format!("{} keys are out of order", page.id())));
                }
                if let (Some(&first), Some(lo)) = (keys.first(), low) {
                    if first < lo {
                        return Err(violation(
                            txn,
                            format!("{} holds {} below its low bound {}", page.id(), first, lo),
                        ));
                    }
                }
                if let (Some(&last), Some(hi)) = (keys.last(), high) {
                    if last >= hi {
                        return Err(violation(
                            txn,
                            format!("{} holds {} at or above its high key {}", page.id(), last, hi),
                        ));
                    }
                }

                match page.body() {
                    PageBody::Leaf(leaf) => {
                        summary.leaf_pages += 1;
                        summary.tuples += leaf.num_tuples();
                    }
                    PageBody::Internal(internal) => {
                        summary.internal_pages += 1;
                        if internal.level() != expected_level {
                            return Err(violation(
                                txn,
                                format!(
                                    "{} has level {}, expected {}",
                                    page.id(),
                                    internal.level(),
                                    expected_level
                                ),
                            ));
                        }
                        let last = internal.last_child().ok_or_else(|| {
                            violation(txn, format!("{} has no children", page.id()))
                        })?;
                        let mut child_low = low;
                        for entry in internal.entries() {
                            children.push(ChildRange {
                                page: entry.left,
                                low: child_low,
                                high: Some(entry.key),
                            });
                            child_low = Some(entry.key);
                        }
                        children.push(ChildRange {
                            page: last,
                            low: child_low,
                            high,
                        });
                    }
                    _ => {
                        return Err(violation(
                            txn,
                            format!("{} is not a tree page", page.id()),
                        ))
                    }
                }
                low = high;
            }

            if expected_level == 0 {
                return Ok(summary);
            }
            leftmost = children
                .first()
                .map(|c| c.page)
                .ok_or_else(|| violation(txn, format!("level {} is empty", expected_level)))?;
            ranges = Some(children);
            expected_level -= 1;
        }
    }

    /// Text rendering of the tree, one page per line, indented by depth.
    ///
    /// ```text
    /// Page(1:7:INTERNAL) level 1 [4] high - next -
    ///   Page(1:1:LEAF) (0, 0) (1, 10) (2, 20) (3, 30) high 4 next 6
    ///   Page(1:6:LEAF) (4, 40) (5, 50) high - next -
    /// ```
    pub fn dump_structure(&self, txn: TransactionId) -> Result<String> {
        let mut out = String::new();
        let root = self.root_pointer(txn)?;
        self.dump_page(txn, root, 0, &mut out)?;
        Ok(out)
    }

    fn dump_page(&self, txn: TransactionId, pid: PageId, depth: usize, out: &mut String) -> Result<()> {
        let mode = match pid.category {
            PageCategory::Leaf => LockMode::Shared,
            _ => LockMode::None,
        };
        let page = self.fetch(txn, pid, mode)?.read().clone();
        let indent = "  ".repeat(depth);
        let next = page
            .right_sibling()
            .map_or_else(|| "-".to_string(), |s| s.page_no.to_string());

        match page.body() {
            PageBody::Leaf(leaf) => {
                let tuples: Vec<String> = leaf.iter().map(|t| t.to_string()).collect();
                out.push_str(&format!(
                    "{}{} {} high {} next {}\n",
                    indent,
                    pid,
                    tuples.join(" "),
                    fmt_bound(leaf.high_key()),
                    next
                ));
            }
            PageBody::Internal(internal) => {
                let keys: Vec<String> = internal.entries().map(|e| e.key.to_string()).collect();
                out.push_str(&format!(
                    "{}{} level {} [{}] high {} next {}\n",
                    indent,
                    pid,
                    internal.level(),
                    keys.join(", "),
                    fmt_bound(internal.high_key()),
                    next
                ));
                let children: Vec<PageId> = internal
                    .first_child()
                    .into_iter()
                    .chain(internal.entries().map(|e| e.right))
                    .collect();
                for child in children {
                    self.dump_page(txn, child, depth + 1, out)?;
                }
            }
            _ => return Err(Error::illegal(format!("{} is not a tree page", pid))),
        }
        Ok(())
    }
}
