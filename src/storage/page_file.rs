//! [`PageFile`] - one tree file: its byte store plus its page codec.

use std::path::Path;

use log::debug;
use parking_lot::Mutex;

use crate::common::{Error, FileId, PageCategory, PageId, Result};
use crate::storage::page::{BTreePage, PageLayout};
use crate::storage::DiskManager;

/// A file whose pages the buffer pool can load, write back and roll back.
///
/// The [`Catalog`](crate::buffer::Catalog) maps a [`FileId`] to one of these
/// so the pool can dispatch reads to the right file.
pub trait DbFile: Send + Sync {
    fn id(&self) -> FileId;

    /// Raw bytes of a page as stored.
    fn read_page_bytes(&self, pid: PageId) -> Result<Vec<u8>>;

    fn write_page_bytes(&self, pid: PageId, data: &[u8]) -> Result<()>;

    fn decode(&self, pid: PageId, data: &[u8]) -> Result<BTreePage>;

    fn encode(&self, page: &BTreePage) -> Vec<u8>;
}

/// A tree file on disk.
///
/// Page allocation writes straight to disk: a new page is appended empty,
/// then fetched through the buffer pool like any other page.
pub struct PageFile {
    id: FileId,
    layout: PageLayout,
    disk: Mutex<DiskManager>,
}

impl PageFile {
    /// Create a new tree file holding a root pointer and one empty leaf.
    pub fn create<P: AsRef<Path>>(path: P, id: FileId, layout: PageLayout) -> Result<Self> {
        let disk = DiskManager::create(path, id, layout.page_size)?;
        let file = Self {
            id,
            layout,
            disk: Mutex::new(disk),
        };
        file.bootstrap()?;
        Ok(file)
    }

    /// Open an existing tree file written with the same layout.
    pub fn open<P: AsRef<Path>>(path: P, id: FileId, layout: PageLayout) -> Result<Self> {
        let disk = DiskManager::open(path, id, layout.page_size)?;
        let file = Self {
            id,
            layout,
            disk: Mutex::new(disk),
        };
        file.bootstrap()?;
        Ok(file)
    }

    pub fn open_or_create<P: AsRef<Path>>(path: P, id: FileId, layout: PageLayout) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, id, layout)
        } else {
            Self::create(path, id, layout)
        }
    }

    /// Write the root pointer page and the first leaf if the file is empty.
    ///
    /// Both pages are written under one hold of the disk mutex, so no reader
    /// can observe a root pointer without its leaf.
    fn bootstrap(&self) -> Result<()> {
        let mut disk = self.disk.lock();
        if disk.length() > 0 {
            return Ok(());
        }

        let rp_id = PageId::root_pointer(self.id);
        let leaf_id = PageId::new(self.id, 1, PageCategory::Leaf);

        let mut root_pointer = BTreePage::empty(rp_id, &self.layout);
        root_pointer.as_root_pointer_mut()?.set_root_id(leaf_id)?;

        disk.write_page_bytes(0, &root_pointer.encode(&self.layout))?;
        let page_no = disk.append(&BTreePage::empty_page_data(leaf_id, &self.layout))?;
        debug_assert_eq!(page_no, leaf_id.page_no);

        debug!("bootstrapped {} with root {}", self.id, leaf_id);
        Ok(())
    }

    #[inline]
    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Number of numbered pages, root pointer excluded.
    pub fn num_pages(&self) -> u32 {
        self.disk.lock().page_count()
    }

    /// Append an empty page of `category` and return its id.
    ///
    /// # Errors
    /// `IllegalState` for the root pointer category, which is a singleton.
    pub fn allocate_page(&self, category: PageCategory) -> Result<PageId> {
        if category == PageCategory::RootPointer {
            return Err(Error::illegal("the root pointer page cannot be allocated"));
        }
        let mut disk = self.disk.lock();
        let pid = PageId::new(self.id, disk.page_count() + 1, category);
        let page_no = disk.append(&BTreePage::empty_page_data(pid, &self.layout))?;
        debug_assert_eq!(page_no, pid.page_no);
        Ok(pid)
    }

    fn check_file(&self, pid: PageId) -> Result<()> {
        if pid.file_id != self.id {
            return Err(Error::illegal(format!("{} does not belong to {}", pid, self.id)));
        }
        Ok(())
    }
}

impl DbFile for PageFile {
    fn id(&self) -> FileId {
        self.id
    }

    fn read_page_bytes(&self, pid: PageId) -> Result<Vec<u8>> {
        self.check_file(pid)?;
        self.disk.lock().read_page_bytes(pid.page_no).map_err(|e| match e {
            Error::PageNotFound(_) => Error::PageNotFound(pid),
            other => other,
        })
    }

    fn write_page_bytes(&self, pid: PageId, data: &[u8]) -> Result<()> {
        self.check_file(pid)?;
        self.disk.lock().write_page_bytes(pid.page_no, data)
    }

    fn decode(&self, pid: PageId, data: &[u8]) -> Result<BTreePage> {
        BTreePage::decode(pid, data, &self.layout)
    }

    fn encode(&self, page: &BTreePage) -> Vec<u8> {
        page.encode(&self.layout)
    }
}
