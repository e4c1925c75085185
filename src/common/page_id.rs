//! Page identifier types.

use std::fmt;

/// Identifies a tree file registered in the [`Catalog`](crate::buffer::Catalog).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File({})", self.0)
    }
}

/// What kind of page a [`PageId`] refers to.
///
/// The category is not derivable from the page number alone; callers carry
/// it alongside the number. It is also stored in the page header so a decode
/// with the wrong category is detected.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PageCategory {
    RootPointer = 0,
    Internal = 1,
    Leaf = 2,
    Header = 3,
}

impl PageCategory {
    /// Convert from u8, returning `None` for unknown values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PageCategory::RootPointer),
            1 => Some(PageCategory::Internal),
            2 => Some(PageCategory::Leaf),
            3 => Some(PageCategory::Header),
            _ => None,
        }
    }
}

impl fmt::Display for PageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageCategory::RootPointer => "ROOT_PTR",
            PageCategory::Internal => "INTERNAL",
            PageCategory::Leaf => "LEAF",
            PageCategory::Header => "HEADER",
        };
        f.write_str(name)
    }
}

/// Identifies a page: the file it lives in, its number, and its category.
///
/// Page numbers are 1-based and relative to the end of the root pointer
/// page. The root pointer page itself always has number 0.
///
/// Identity is by value; `PageId` is the key of both the page cache and the
/// lock table.
///
/// # Example
/// ```
/// use blinkdb::{FileId, PageCategory, PageId};
///
/// let pid = PageId::new(FileId(7), 3, PageCategory::Leaf);
/// assert_eq!(pid.page_no, 3);
/// assert_eq!(PageId::root_pointer(FileId(7)).page_no, 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub file_id: FileId,
    pub page_no: u32,
    pub category: PageCategory,
}

impl PageId {
    #[inline]
    pub fn new(file_id: FileId, page_no: u32, category: PageCategory) -> Self {
        Self {
            file_id,
            page_no,
            category,
        }
    }

    /// The singleton root pointer page of a file.
    #[inline]
    pub fn root_pointer(file_id: FileId) -> Self {
        Self::new(file_id, 0, PageCategory::RootPointer)
    }

    /// Build an id from an on-page link where 0 means "no page".
    #[inline]
    pub fn from_link(file_id: FileId, page_no: u32, category: PageCategory) -> Option<Self> {
        (page_no != 0).then(|| Self::new(file_id, page_no, category))
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Page({}:{}:{})",
            self.file_id.0, self.page_no, self.category
        )
    }
}
