//! The root pointer page.

use crate::common::config::ROOT_POINTER_PAGE_SIZE;
use crate::common::{Error, FileId, PageCategory, PageId, Result};

use super::page_header::{read_u32, write_u32, PageHeader};

const OFFSET_ROOT: usize = PageHeader::SIZE;
const OFFSET_ROOT_CATEGORY: usize = OFFSET_ROOT + 4;
const OFFSET_HEADER: usize = OFFSET_ROOT_CATEGORY + 1;

/// Singleton page at offset 0 of a tree file that names the current root.
///
/// The root is `None` only in a file whose root has never been assigned.
/// The header page chain head is carried for the file format and is not
/// used by the tree algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPointerPage {
    file_id: FileId,
    root: Option<PageId>,
    header: Option<PageId>,
}

impl RootPointerPage {
    pub fn new(file_id: FileId) -> Self {
        Self {
            file_id,
            root: None,
            header: None,
        }
    }

    #[inline]
    pub fn root_id(&self) -> Option<PageId> {
        self.root
    }

    /// Point at a new root.
    ///
    /// # Errors
    /// The root must be an internal or leaf page of this file.
    pub fn set_root_id(&mut self, root: PageId) -> Result<()> {
        if root.file_id != self.file_id
            || !matches!(root.category, PageCategory::Internal | PageCategory::Leaf)
        {
            return Err(Error::illegal(format!("{} cannot be a root", root)));
        }
        self.root = Some(root);
        Ok(())
    }

    #[inline]
    pub fn header_id(&self) -> Option<PageId> {
        self.header
    }

    pub fn set_header_id(&mut self, header: Option<PageId>) {
        self.header = header;
    }

    pub(crate) fn decode(pid: PageId, data: &[u8]) -> Result<Self> {
        let root_category = PageCategory::from_u8(data[OFFSET_ROOT_CATEGORY]).ok_or_else(|| {
            Error::Corruption {
                page: pid,
                reason: format!("bad root category {}", data[OFFSET_ROOT_CATEGORY]),
            }
        })?;
        Ok(Self {
            file_id: pid.file_id,
            root: PageId::from_link(pid.file_id, read_u32(data, OFFSET_ROOT), root_category),
            header: PageId::from_link(
                pid.file_id,
                read_u32(data, OFFSET_HEADER),
                PageCategory::Header,
            ),
        })
    }

    pub(crate) fn encode_body(&self, data: &mut [u8]) {
        debug_assert_eq!(data.len(), ROOT_POINTER_PAGE_SIZE);
        match self.root {
            Some(root) => {
                write_u32(data, OFFSET_ROOT, root.page_no);
                data[OFFSET_ROOT_CATEGORY] = root.category as u8;
            }
            None => {
                write_u32(data, OFFSET_ROOT, 0);
                data[OFFSET_ROOT_CATEGORY] = PageCategory::Leaf as u8;
            }
        }
        write_u32(data, OFFSET_HEADER, self.header.map_or(0, |h| h.page_no));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_root_rejects_wrong_category() {
        let mut page = RootPointerPage::new(FileId(1));
        let header = PageId::new(FileId(1), 2, PageCategory::Header);
        assert!(page.set_root_id(header).is_err());

        let other_file = PageId::new(FileId(2), 2, PageCategory::Leaf);
        assert!(page.set_root_id(other_file).is_err());

        let leaf = PageId::new(FileId(1), 2, PageCategory::Leaf);
        page.set_root_id(leaf).unwrap();
        assert_eq!(page.root_id(), Some(leaf));
    }

    #[test]
    fn test_body_encoding() {
        let pid = PageId::root_pointer(FileId(3));
        let mut page = RootPointerPage::new(FileId(3));
        page.set_root_id(PageId::new(FileId(3), 12, PageCategory::Internal))
            .unwrap();
        page.set_header_id(Some(PageId::new(FileId(3), 4, PageCategory::Header)));

        let mut data = vec![0u8; ROOT_POINTER_PAGE_SIZE];
        page.encode_body(&mut data);
        assert_eq!(RootPointerPage::decode(pid, &data).unwrap(), page);
    }

    #[test]
    fn test_empty_root_decodes_to_none() {
        let pid = PageId::root_pointer(FileId(3));
        let mut data = vec![0u8; ROOT_POINTER_PAGE_SIZE];
        RootPointerPage::new(FileId(3)).encode_body(&mut data);

        let page = RootPointerPage::decode(pid, &data).unwrap();
        assert_eq!(page.root_id(), None);
        assert_eq!(page.header_id(), None);
    }
}
