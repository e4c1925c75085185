//! [`BTreePage`] - one decoded page of a tree file.
//!
//! Pages live in the buffer pool in decoded form. The raw bytes only exist
//! on their way to or from the backing store and as the before-image kept
//! for rollback.

use crate::common::config::ROOT_POINTER_PAGE_SIZE;
use crate::common::{Error, PageCategory, PageId, Result};
use crate::tuple::{Key, TupleDesc};

use super::header_page::HeaderPage;
use super::internal_page::InternalPage;
use super::leaf_page::LeafPage;
use super::page_header::PageHeader;
use super::root_pointer_page::RootPointerPage;

/// Everything needed to encode or decode the pages of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub page_size: usize,
    pub desc: TupleDesc,
    pub key_field: usize,
}

impl PageLayout {
    /// # Panics
    /// Panics if `key_field` is not a field of `desc`, or if a page of
    /// `page_size` cannot hold two tuples or three internal entries. An
    /// internal split needs three: one per side and the median.
    pub fn new(page_size: usize, desc: TupleDesc, key_field: usize) -> Self {
        assert!(key_field < desc.num_fields(), "key field out of range");
        assert!(
            LeafPage::capacity(page_size, &desc) >= 2 && InternalPage::capacity(page_size) >= 3,
            "page size {} too small",
            page_size
        );
        Self {
            page_size,
            desc,
            key_field,
        }
    }

    /// On-disk size of a page of `category`.
    #[inline]
    pub fn size_of(&self, category: PageCategory) -> usize {
        match category {
            PageCategory::RootPointer => ROOT_POINTER_PAGE_SIZE,
            _ => self.page_size,
        }
    }
}

/// Category-specific payload of a [`BTreePage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageBody {
    RootPointer(RootPointerPage),
    Internal(InternalPage),
    Leaf(LeafPage),
    Header(HeaderPage),
}

/// A tree page: id, the vestigial parent field, and a category payload.
///
/// # Example
/// ```
/// use blinkdb::storage::page::{BTreePage, PageLayout};
/// use blinkdb::tuple::{Tuple, TupleDesc};
/// use blinkdb::{FileId, PageCategory, PageId};
///
/// let layout = PageLayout::new(256, TupleDesc::new(2), 0);
/// let pid = PageId::new(FileId(1), 1, PageCategory::Leaf);
///
/// let mut page = BTreePage::empty(pid, &layout);
/// page.as_leaf_mut().unwrap().insert_tuple(Tuple::new(vec![4, 40])).unwrap();
///
/// let bytes = page.encode(&layout);
/// assert_eq!(BTreePage::decode(pid, &bytes, &layout).unwrap(), page);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BTreePage {
    id: PageId,
    parent: u32,
    body: PageBody,
}

impl BTreePage {
    /// A freshly allocated page of the id's category.
    pub fn empty(id: PageId, layout: &PageLayout) -> Self {
        let body = match id.category {
            PageCategory::RootPointer => PageBody::RootPointer(RootPointerPage::new(id.file_id)),
            PageCategory::Internal => PageBody::Internal(InternalPage::new(id, layout.page_size)),
            PageCategory::Leaf => PageBody::Leaf(LeafPage::new(
                id,
                layout.page_size,
                layout.desc,
                layout.key_field,
            )),
            PageCategory::Header => PageBody::Header(HeaderPage::new(id, layout.page_size)),
        };
        Self {
            id,
            parent: 0,
            body,
        }
    }

    /// Bytes of an empty page of `id`.
    pub fn empty_page_data(id: PageId, layout: &PageLayout) -> Vec<u8> {
        Self::empty(id, layout).encode(layout)
    }

    /// Decode page bytes read for `id`.
    ///
    /// # Errors
    /// `Corruption` if the length, category byte or checksum disagree with
    /// `id` and `layout`.
    pub fn decode(id: PageId, data: &[u8], layout: &PageLayout) -> Result<Self> {
        let corrupt = |reason: String| Error::Corruption { page: id, reason };

        let expected = layout.size_of(id.category);
        if data.len() != expected {
            return Err(corrupt(format!("{} bytes, expected {}", data.len(), expected)));
        }
        let header = PageHeader::from_bytes(data)
            .ok_or_else(|| corrupt(format!("unknown category byte {}", data[0])))?;
        if header.category != id.category {
            return Err(corrupt(format!("stored category is {}", header.category)));
        }
        if !header.verify_checksum(data) {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        let body = match id.category {
            PageCategory::RootPointer => PageBody::RootPointer(RootPointerPage::decode(id, data)?),
            PageCategory::Internal => PageBody::Internal(InternalPage::decode(id, data)?),
            PageCategory::Leaf => {
                PageBody::Leaf(LeafPage::decode(id, data, layout.desc, layout.key_field)?)
            }
            PageCategory::Header => PageBody::Header(HeaderPage::decode(id, data)),
        };
        Ok(Self {
            id,
            parent: header.parent,
            body,
        })
    }

    /// Encode to on-disk bytes with a fresh checksum.
    pub fn encode(&self, layout: &PageLayout) -> Vec<u8> {
        let mut data = vec![0u8; layout.size_of(self.id.category)];
        let header = PageHeader {
            category: self.id.category,
            checksum: 0,
            parent: self.parent,
        };
        header.write_to(&mut data);
        match &self.body {
            PageBody::RootPointer(p) => p.encode_body(&mut data),
            PageBody::Internal(p) => p.encode_body(&mut data),
            PageBody::Leaf(p) => p.encode_body(&mut data),
            PageBody::Header(p) => p.encode_body(&mut data),
        }
        PageHeader::seal(&mut data);
        data
    }

    #[inline]
    pub fn id(&self) -> PageId {
        self.id
    }

    #[inline]
    pub fn category(&self) -> PageCategory {
        self.id.category
    }

    #[inline]
    pub fn body(&self) -> &PageBody {
        &self.body
    }

    /// The page's parent, an internal page of the same file.
    pub fn parent_id(&self) -> Option<PageId> {
        PageId::from_link(self.id.file_id, self.parent, PageCategory::Internal)
    }

    pub fn set_parent(&mut self, parent: Option<PageId>) {
        self.parent = parent.map_or(0, |p| p.page_no);
    }

    pub fn as_root_pointer(&self) -> Result<&RootPointerPage> {
        match &self.body {
            PageBody::RootPointer(p) => Ok(p),
            _ => Err(wrong_category(self.id, PageCategory::RootPointer)),
        }
    }

    pub fn as_root_pointer_mut(&mut self) -> Result<&mut RootPointerPage> {
        let id = self.id;
        match &mut self.body {
            PageBody::RootPointer(p) => Ok(p),
            _ => Err(wrong_category(id, PageCategory::RootPointer)),
        }
    }

    pub fn as_internal(&self) -> Result<&InternalPage> {
        match &self.body {
            PageBody::Internal(p) => Ok(p),
            _ => Err(wrong_category(self.id, PageCategory::Internal)),
        }
    }

    pub fn as_internal_mut(&mut self) -> Result<&mut InternalPage> {
        let id = self.id;
        match &mut self.body {
            PageBody::Internal(p) => Ok(p),
            _ => Err(wrong_category(id, PageCategory::Internal)),
        }
    }

    pub fn as_leaf(&self) -> Result<&LeafPage> {
        match &self.body {
            PageBody::Leaf(p) => Ok(p),
            _ => Err(wrong_category(self.id, PageCategory::Leaf)),
        }
    }

    pub fn as_leaf_mut(&mut self) -> Result<&mut LeafPage> {
        let id = self.id;
        match &mut self.body {
            PageBody::Leaf(p) => Ok(p),
            _ => Err(wrong_category(id, PageCategory::Leaf)),
        }
    }

    /// Right sibling of an internal or leaf page.
    pub fn right_sibling(&self) -> Option<PageId> {
        match &self.body {
            PageBody::Internal(p) => p.right_sibling(),
            PageBody::Leaf(p) => p.right_sibling(),
            _ => None,
        }
    }

    /// High key of an internal or leaf page.
    pub fn high_key(&self) -> Option<Key> {
        match &self.body {
            PageBody::Internal(p) => p.high_key(),
            PageBody::Leaf(p) => p.high_key(),
            _ => None,
        }
    }
}

fn wrong_category(id: PageId, wanted: PageCategory) -> Error {
    Error::illegal(format!("{} is not a {} page", id, wanted))
}
