//! Leaf pages: sorted tuples plus a right-sibling link and a high key.

use crate::common::{Error, PageCategory, PageId, Result};
use crate::tuple::{Key, RecordId, Tuple, TupleDesc};

use super::page_header::{read_i32, read_u16, read_u32, write_i32, write_u16, write_u32, PageHeader};

const OFFSET_RIGHT_SIBLING: usize = PageHeader::SIZE;
const OFFSET_HAS_HIGH_KEY: usize = OFFSET_RIGHT_SIBLING + 4;
const OFFSET_HIGH_KEY: usize = OFFSET_HAS_HIGH_KEY + 1;
const OFFSET_NUM_TUPLES: usize = OFFSET_HIGH_KEY + 4;

/// Bytes before the first tuple.
pub const LEAF_HEADER_SIZE: usize = OFFSET_NUM_TUPLES + 2;

/// A leaf of the B-link tree.
///
/// # Layout
/// ```text
/// ┌────────┬─────────┬──────┬──────────┬───────┬──────────────────────┐
/// │ header │ sibling │ has  │ high key │ count │ tuples (sorted by    │
/// │  9B    │  4B     │ 1B   │  4B      │  2B   │ key, fixed width)    │
/// └────────┴─────────┴──────┴──────────┴───────┴──────────────────────┘
/// ```
///
/// Every key on a page with a right sibling is strictly below its high key.
/// The rightmost leaf has neither a sibling nor a high key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafPage {
    id: PageId,
    desc: TupleDesc,
    key_field: usize,
    max_tuples: usize,
    tuples: Vec<Tuple>,
    right_sibling: Option<PageId>,
    high_key: Option<Key>,
}

impl LeafPage {
    pub fn new(id: PageId, page_size: usize, desc: TupleDesc, key_field: usize) -> Self {
        Self {
            id,
            desc,
            key_field,
            max_tuples: Self::capacity(page_size, &desc),
            tuples: Vec::new(),
            right_sibling: None,
            high_key: None,
        }
    }

    /// How many tuples of shape `desc` fit on a page of `page_size` bytes.
    pub fn capacity(page_size: usize, desc: &TupleDesc) -> usize {
        page_size.saturating_sub(LEAF_HEADER_SIZE) / desc.tuple_size()
    }

    #[inline]
    pub fn id(&self) -> PageId {
        self.id
    }

    #[inline]
    pub fn key_of(&self, tuple: &Tuple) -> Key {
        tuple.field(self.key_field)
    }

    #[inline]
    pub fn num_tuples(&self) -> usize {
        self.tuples.len()
    }

    #[inline]
    pub fn max_tuples(&self) -> usize {
        self.max_tuples
    }

    #[inline]
    pub fn num_empty_slots(&self) -> usize {
        self.max_tuples - self.tuples.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter()
    }

    /// Copy of tuple `slot` stamped with its record id.
    pub fn tuple_at(&self, slot: usize) -> Option<Tuple> {
        self.tuples.get(slot).map(|t| {
            let mut t = t.clone();
            t.set_record_id(Some(RecordId {
                page_id: self.id,
                slot,
            }));
            t
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.tuples.iter().map(move |t| t.field(self.key_field))
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

    /// Insert keeping key order. Equal keys keep arrival order.
    ///
    /// # Errors
    /// `IllegalState` if the page is full or the tuple has the wrong shape.
    pub fn insert_tuple(&mut self, tuple: Tuple) -> Result<()> {
        if !tuple.matches(&self.desc) {
            return Err(Error::illegal(format!(
                "tuple {} does not match a {}-field descriptor",
                tuple,
                self.desc.num_fields()
            )));
        }
        if self.num_empty_slots() == 0 {
            return Err(Error::illegal(format!("{} is full", self.id)));
        }
        let key = self.key_of(&tuple);
        let pos = self
            .tuples
            .partition_point(|t| t.field(self.key_field) <= key);
        let mut tuple = tuple;
        tuple.set_record_id(None);
        self.tuples.insert(pos, tuple);
        Ok(())
    }

    /// Remove the first tuple equal to `tuple`. Returns false if absent.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> bool {
        match self.tuples.iter().position(|t| t == tuple) {
            Some(pos) => {
                self.tuples.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Where to cut a full page: the middle, moved to the nearest boundary
    /// between two distinct keys so equal keys stay on one side. A page of
    /// one repeated key is cut in the middle.
    ///
    /// Always in `1..num_tuples()` for a page of two or more tuples.
    pub(crate) fn split_index(&self) -> usize {
        let keys: Vec<Key> = self.keys().collect();
        let mid = keys.len() / 2;
        (1..keys.len())
            .filter(|&i| keys[i - 1] != keys[i])
            .min_by_key(|&i| i.abs_diff(mid))
            .unwrap_or(mid)
    }

    /// Remove and return the tuples at positions `at..`.
    pub(crate) fn split_off(&mut self, at: usize) -> Vec<Tuple> {
        self.tuples.split_off(at)
    }

    /// Append tuples that are already sorted and all above the current ones.
    pub(crate) fn append_sorted(&mut self, tuples: Vec<Tuple>) -> Result<()> {
        if tuples.len() > self.num_empty_slots() {
            return Err(Error::illegal(format!("{} cannot take {} tuples", self.id, tuples.len())));
        }
        self.tuples.extend(tuples);
        Ok(())
    }

    pub(crate) fn decode(
        id: PageId,
        data: &[u8],
        desc: TupleDesc,
        key_field: usize,
    ) -> Result<Self> {
        let mut page = Self::new(id, data.len(), desc, key_field);
        page.right_sibling = PageId::from_link(
            id.file_id,
            read_u32(data, OFFSET_RIGHT_SIBLING),
            PageCategory::Leaf,
        );
        page.high_key = (data[OFFSET_HAS_HIGH_KEY] != 0).then(|| read_i32(data, OFFSET_HIGH_KEY));

        let count = read_u16(data, OFFSET_NUM_TUPLES) as usize;
        if count > page.max_tuples {
            return Err(Error::Corruption {
                page: id,
                reason: format!("{} tuples exceed capacity {}", count, page.max_tuples),
            });
        }
        let size = desc.tuple_size();
        page.tuples = (0..count)
            .map(|i| {
                let start = LEAF_HEADER_SIZE + i * size;
                Tuple::read_from(&data[start..start + size], &desc)
            })
            .collect();
        Ok(page)
    }

    pub(crate) fn encode_body(&self, data: &mut [u8]) {
        write_u32(data, OFFSET_RIGHT_SIBLING, self.right_sibling.map_or(0, |p| p.page_no));
        data[OFFSET_HAS_HIGH_KEY] = self.high_key.is_some() as u8;
        write_i32(data, OFFSET_HIGH_KEY, self.high_key.unwrap_or(0));
        write_u16(data, OFFSET_NUM_TUPLES, self.tuples.len() as u16);

        let size = self.desc.tuple_size();
        for (i, t) in self.tuples.iter().enumerate() {
            let start = LEAF_HEADER_SIZE + i * size;
            t.write_to(&mut data[start..start + size]);
        }
    }
}
