//! Fixed-width integer tuples.
//!
//! The tree treats tuples as opaque rows with one ordered key field. This
//! module provides the minimal row type the tree stores: a fixed number of
//! `i32` fields, encoded little-endian.

use std::fmt;

use crate::common::PageId;

/// The ordered key type of the index.
pub type Key = i32;

/// Size of one encoded field.
pub const FIELD_SIZE: usize = 4;

/// Shape of the tuples stored in a tree file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TupleDesc {
    num_fields: usize,
}

impl TupleDesc {
    /// # Panics
    /// Panics if `num_fields` is 0.
    pub fn new(num_fields: usize) -> Self {
        assert!(num_fields > 0, "a tuple needs at least one field");
        Self { num_fields }
    }

    #[inline]
    pub fn num_fields(&self) -> usize {
        self.num_fields
    }

    /// Encoded size of one tuple in bytes.
    #[inline]
    pub fn tuple_size(&self) -> usize {
        self.num_fields * FIELD_SIZE
    }
}

/// Where a tuple was read from: its leaf page and position.
///
/// The slot is informational; leaves keep tuples sorted, so a slot is only
/// stable until the page is next modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

/// A row of integer fields.
///
/// Equality compares field values only, not the record id.
#[derive(Debug, Clone)]
pub struct Tuple {
    fields: Vec<i32>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(fields: Vec<i32>) -> Self {
        Self {
            fields,
            record_id: None,
        }
    }

    #[inline]
    pub fn fields(&self) -> &[i32] {
        &self.fields
    }

    /// Value of field `i`.
    ///
    /// # Panics
    /// Panics if `i` is out of range.
    #[inline]
    pub fn field(&self, i: usize) -> i32 {
        self.fields[i]
    }

    #[inline]
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    /// True if this tuple has the shape `desc` describes.
    pub fn matches(&self, desc: &TupleDesc) -> bool {
        self.fields.len() == desc.num_fields()
    }

    /// Encode into `buf`, which must be exactly `tuple_size()` long.
    pub(crate) fn write_to(&self, buf: &mut [u8]) {
        for (chunk, value) in buf.chunks_exact_mut(FIELD_SIZE).zip(&self.fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
    }

    pub(crate) fn read_from(buf: &[u8], desc: &TupleDesc) -> Self {
        let fields = buf[..desc.tuple_size()]
            .chunks_exact(FIELD_SIZE)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::new(fields)
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Tuple {}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.fields.iter().map(|v| v.to_string()).collect();
        write!(f, "({})", parts.join(", "))
    }
}
