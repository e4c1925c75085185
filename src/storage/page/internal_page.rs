//! Internal pages: ordered separator keys and child links.

use std::fmt;

use crate::common::{Error, PageCategory, PageId, Result};
use crate::tuple::Key;

use super::page_header::{read_i32, read_u16, read_u32, write_i32, write_u16, write_u32, PageHeader};

const OFFSET_RIGHT_SIBLING: usize = PageHeader::SIZE;
const OFFSET_HAS_HIGH_KEY: usize = OFFSET_RIGHT_SIBLING + 4;
const OFFSET_HIGH_KEY: usize = OFFSET_HAS_HIGH_KEY + 1;
const OFFSET_LEVEL: usize = OFFSET_HIGH_KEY + 4;
const OFFSET_NUM_ENTRIES: usize = OFFSET_LEVEL + 2;
const OFFSET_FIRST_CHILD: usize = OFFSET_NUM_ENTRIES + 2;

/// Bytes before the first (key, child) pair.
pub const INTERNAL_HEADER_SIZE: usize = OFFSET_FIRST_CHILD + 4;

const ENTRY_SIZE: usize = 8;

/// One separator of an internal page with the children on either side.
///
/// Adjacent entries share a child: `entries[i].right == entries[i + 1].left`.
/// Keys under `left` are below `key`; keys under `right` are at or above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub key: Key,
    pub left: PageId,
    pub right: PageId,
}

impl Entry {
    pub fn new(key: Key, left: PageId, right: PageId) -> Self {
        Self { key, left, right }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} <- {} -> {}]", self.left.page_no, self.key, self.right.page_no)
    }
}

/// An internal node of the B-link tree.
///
/// # Layout
/// ```text
/// ┌────────┬─────────┬─────┬──────────┬───────┬───────┬───────┬──────────────┐
/// │ header │ sibling │ has │ high key │ level │ count │ child │ (key, child) │
/// │  9B    │  4B     │ 1B  │  4B      │  2B   │  2B   │  4B   │  8B × count  │
/// └────────┴─────────┴─────┴──────────┴───────┴───────┴───────┴──────────────┘
/// ```
///
/// A first child of 0 means the page has no children yet.
///
/// `level` is 1 for pages whose children are leaves and grows by one per
/// level up. A freshly allocated page has level 0 until it is first filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalPage {
    id: PageId,
    level: u16,
    max_entries: usize,
    keys: Vec<Key>,
    children: Vec<u32>,
    right_sibling: Option<PageId>,
    high_key: Option<Key>,
}

impl InternalPage {
    pub fn new(id: PageId, page_size: usize) -> Self {
        Self {
            id,
            level: 0,
            max_entries: Self::capacity(page_size),
            keys: Vec::new(),
            children: Vec::new(),
            right_sibling: None,
            high_key: None,
        }
    }

    /// How many entries fit on a page of `page_size` bytes.
    pub fn capacity(page_size: usize) -> usize {
        page_size.saturating_sub(INTERNAL_HEADER_SIZE) / ENTRY_SIZE
    }

    #[inline]
    pub fn id(&self) -> PageId {
        self.id
    }

    #[inline]
    pub fn level(&self) -> u16 {
        self.level
    }

    pub fn set_level(&mut self, level: u16) {
        self.level = level;
    }

    /// Category of this page's children.
    #[inline]
    pub fn child_category(&self) -> PageCategory {
        if self.level <= 1 {
            PageCategory::Leaf
        } else {
            PageCategory::Internal
        }
    }

    #[inline]
    pub fn num_entries(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    #[inline]
    pub fn num_empty_slots(&self) -> usize {
        self.max_entries - self.keys.len()
    }

    #[inline]
    pub fn right_sibling(&self) -> Option<PageId> {
        self.right_sibling
    }

    pub fn set_right_sibling(&mut self, sibling: Option<PageId>) {
        self.right_sibling = sibling;
    }

    #[inline]
    pub fn high_key(&self) -> Option<Key> {
        self.high_key
    }

    pub fn set_high_key(&mut self, key: Option<Key>) {
        self.high_key = key;
    }

    fn child_id(&self, page_no: u32) -> PageId {
        PageId::new(self.id.file_id, page_no, self.child_category())
    }

    /// Entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = Entry> + '_ {
        self.keys.iter().enumerate().map(move |(i, &key)| {
            Entry::new(key, self.child_id(self.children[i]), self.child_id(self.children[i + 1]))
        })
    }

    pub fn first_child(&self) -> Option<PageId> {
        self.children.first().map(|&c| self.child_id(c))
    }

    pub fn last_child(&self) -> Option<PageId> {
        self.children.last().map(|&c| self.child_id(c))
    }

    /// Child to descend into for `key`: the left child of the first entry
    /// whose key is at or above `key`, else the last entry's right child.
    ///
    /// # Errors
    /// `IllegalState` on a page without entries.
    pub fn child_for(&self, key: Key) -> Result<PageId> {
        if self.keys.is_empty() {
            return Err(Error::illegal(format!("{} has no entries", self.id)));
        }
        let idx = self.keys.partition_point(|&k| k < key);
        Ok(self.child_id(self.children[idx]))
    }

    /// Insert a promoted entry next to the child it was split from.
    ///
    /// The entry's `left` child must already be linked from this page (the
    /// page that split) unless the page is empty, in which case the entry
    /// becomes its only separator.
    ///
    /// # Errors
    /// `IllegalState` if the page is full or neither child of the entry is
    /// linked from this page.
    pub fn insert_entry(&mut self, entry: Entry) -> Result<()> {
        if self.num_empty_slots() == 0 {
            return Err(Error::illegal(format!("{} is full", self.id)));
        }
        if self.children.is_empty() {
            self.keys.push(entry.key);
            self.children.push(entry.left.page_no);
            self.children.push(entry.right.page_no);
            return Ok(());
        }
        if let Some(i) = self.children.iter().position(|&c| c == entry.left.page_no) {
            self.keys.insert(i, entry.key);
            self.children.insert(i + 1, entry.right.page_no);
            return Ok(());
        }
        if let Some(i) = self.children.iter().position(|&c| c == entry.right.page_no) {
            self.keys.insert(i, entry.key);
            self.children.insert(i, entry.left.page_no);
            return Ok(());
        }
        Err(Error::illegal(format!(
            "{} links neither child of entry {}",
            self.id, entry
        )))
    }

    /// Cut the page at entry `mid`: the median key is removed and returned,
    /// and the entries after it are removed and returned as
    /// `(keys, children)` ready for [`InternalPage::fill`].
    pub(crate) fn split_off(&mut self, mid: usize) -> (Key, Vec<Key>, Vec<u32>) {
        let right_keys = self.keys.split_off(mid + 1);
        let median = self.keys.pop().unwrap_or_default();
        let right_children = self.children.split_off(mid + 1);
        (median, right_keys, right_children)
    }

    /// Replace the contents of an empty page.
    pub(crate) fn fill(&mut self, level: u16, keys: Vec<Key>, children: Vec<u32>) -> Result<()> {
        if keys.len() > self.max_entries || children.len() != keys.len() + 1 {
            return Err(Error::illegal(format!(
                "{} cannot hold {} keys with {} children",
                self.id,
                keys.len(),
                children.len()
            )));
        }
        self.level = level;
        self.keys = keys;
        self.children = children;
        Ok(())
    }

    pub(crate) fn decode(id: PageId, data: &[u8]) -> Result<Self> {
        let mut page = Self::new(id, data.len());
        page.right_sibling = PageId::from_link(
            id.file_id,
            read_u32(data, OFFSET_RIGHT_SIBLING),
            PageCategory::Internal,
        );
        page.high_key = (data[OFFSET_HAS_HIGH_KEY] != 0).then(|| read_i32(data, OFFSET_HIGH_KEY));
        page.level = read_u16(data, OFFSET_LEVEL);

        let count = read_u16(data, OFFSET_NUM_ENTRIES) as usize;
        if count > page.max_entries {
            return Err(Error::Corruption {
                page: id,
                reason: format!("{} entries exceed capacity {}", count, page.max_entries),
            });
        }
        let first_child = read_u32(data, OFFSET_FIRST_CHILD);
        if first_child == 0 && count > 0 {
            return Err(Error::Corruption {
                page: id,
                reason: "entries without a first child".to_string(),
            });
        }
        if first_child != 0 {
            page.children.push(first_child);
            for i in 0..count {
                let start = INTERNAL_HEADER_SIZE + i * ENTRY_SIZE;
                page.keys.push(read_i32(data, start));
                page.children.push(read_u32(data, start + 4));
            }
        }
        Ok(page)
    }

    pub(crate) fn encode_body(&self, data: &mut [u8]) {
        write_u32(data, OFFSET_RIGHT_SIBLING, self.right_sibling.map_or(0, |p| p.page_no));
        data[OFFSET_HAS_HIGH_KEY] = self.high_key.is_some() as u8;
        write_i32(data, OFFSET_HIGH_KEY, self.high_key.unwrap_or(0));
        write_u16(data, OFFSET_LEVEL, self.level);
        write_u16(data, OFFSET_NUM_ENTRIES, self.keys.len() as u16);
        write_u32(data, OFFSET_FIRST_CHILD, self.children.first().copied().unwrap_or(0));

        for (i, key) in self.keys.iter().enumerate() {
            let start = INTERNAL_HEADER_SIZE + i * ENTRY_SIZE;
            write_i32(data, start, *key);
            write_u32(data, start + 4, self.children[i + 1]);
        }
    }
}
