//! Page header shared by every tree page.
//!
//! Every page starts with a [`PageHeader`] containing:
//! - the [`PageCategory`] discriminator
//! - a CRC32 checksum for integrity
//! - the parent page number

use crate::common::PageCategory;

/// Metadata stored at the beginning of every page.
///
/// # Layout (9 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       1     category (PageCategory as u8)
/// 1       4     checksum (CRC32, little-endian)
/// 5       4     parent page number (0 = none, little-endian)
/// ```
///
/// # Checksum
/// The checksum is computed over the entire page with the checksum field
/// itself set to zero.
///
/// # Parent
/// Sibling links make parent pointers unnecessary for the algorithm. The
/// field is still stamped on root growth so other readers of the file format
/// find it filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub category: PageCategory,
    pub checksum: u32,
    pub parent: u32,
}

impl PageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 9;

    pub const OFFSET_CATEGORY: usize = 0;
    pub const OFFSET_CHECKSUM: usize = 1;
    pub const OFFSET_PARENT: usize = 5;

    pub fn new(category: PageCategory) -> Self {
        Self {
            category,
            checksum: 0,
            parent: 0,
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// Returns `None` if the category byte is unknown.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        let category = PageCategory::from_u8(data[Self::OFFSET_CATEGORY])?;
        Some(Self {
            category,
            checksum: read_u32(data, Self::OFFSET_CHECKSUM),
            parent: read_u32(data, Self::OFFSET_PARENT),
        })
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        data[Self::OFFSET_CATEGORY] = self.category as u8;
        write_u32(data, Self::OFFSET_CHECKSUM, self.checksum);
        write_u32(data, Self::OFFSET_PARENT, self.parent);
    }

    /// Compute the CRC32 checksum of a page, skipping the checksum field.
    pub fn compute_checksum(page_data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&page_data[..Self::OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 4]);
        hasher.update(&page_data[Self::OFFSET_CHECKSUM + 4..]);
        hasher.finalize()
    }

    /// Compute and store the checksum of a fully encoded page.
    pub fn seal(page_data: &mut [u8]) {
        let checksum = Self::compute_checksum(page_data);
        write_u32(page_data, Self::OFFSET_CHECKSUM, checksum);
    }

    /// Verify that the stored checksum matches the computed checksum.
    pub fn verify_checksum(&self, page_data: &[u8]) -> bool {
        self.checksum == Self::compute_checksum(page_data)
    }
}

#[inline]
pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[inline]
pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn read_i32(data: &[u8], offset: usize) -> i32 {
    read_u32(data, offset) as i32
}

#[inline]
pub(crate) fn write_i32(data: &mut [u8], offset: usize, value: i32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub(crate) fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
pub(crate) fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}
