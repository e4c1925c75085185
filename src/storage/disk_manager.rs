//! Disk Manager - low-level file I/O for tree files.
//!
//! The [`DiskManager`] is the backing byte store of one tree file:
//! - Reading and writing the root pointer page and numbered pages
//! - Appending new pages
//! - Reporting the file length

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::ROOT_POINTER_PAGE_SIZE;
use crate::common::{Error, FileId, PageCategory, PageId, Result};

/// Manages disk I/O for a single tree file.
///
/// # File Layout
/// ```text
/// ┌──────────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Root pointer │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (18B)        │         │         │         │         │
/// └──────────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset: 0     18     18+S     ...   18+(N-1)×S
/// ```
///
/// Page N (1-based) is located at file offset
/// `ROOT_POINTER_PAGE_SIZE + (N - 1) × page_size`.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. [`PageFile`](super::PageFile)
/// serializes access behind a mutex.
///
/// # Durability
/// All writes are followed by `fsync()`.
pub struct DiskManager {
    file: File,
    file_id: FileId,
    page_size: usize,
    /// Number of numbered pages in the file, root pointer excluded.
    page_count: u32,
}

impl DiskManager {
    /// Create a new, empty tree file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, file_id: FileId, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            file_id,
            page_size,
            page_count: 0,
        })
    }

    /// Open an existing tree file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, file_id: FileId, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let file_size = file.metadata()?.len();
        let page_count = (file_size.saturating_sub(ROOT_POINTER_PAGE_SIZE as u64)
            / page_size as u64) as u32;

        Ok(Self {
            file,
            file_id,
            page_size,
            page_count,
        })
    }

    /// Open an existing tree file, or create if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(
        path: P,
        file_id: FileId,
        page_size: usize,
    ) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, file_id, page_size)
        } else {
            Self::create(path, file_id, page_size)
        }
    }

    #[inline]
    fn offset_of(&self, page_no: u32) -> u64 {
        if page_no == 0 {
            0
        } else {
            ROOT_POINTER_PAGE_SIZE as u64 + (page_no as u64 - 1) * self.page_size as u64
        }
    }

    #[inline]
    fn size_of(&self, page_no: u32) -> usize {
        if page_no == 0 {
            ROOT_POINTER_PAGE_SIZE
        } else {
            self.page_size
        }
    }

    fn check_exists(&self, page_no: u32) -> Result<()> {
        let exists = if page_no == 0 {
            self.length() >= ROOT_POINTER_PAGE_SIZE as u64
        } else {
            page_no <= self.page_count
        };
        if exists {
            Ok(())
        } else {
            let category = if page_no == 0 {
                PageCategory::RootPointer
            } else {
                PageCategory::Leaf
            };
            Err(Error::PageNotFound(PageId::new(self.file_id, page_no, category)))
        }
    }

    /// Read the bytes of page `page_no`; 0 is the root pointer page.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page doesn't exist.
    pub fn read_page_bytes(&mut self, page_no: u32) -> Result<Vec<u8>> {
        self.check_exists(page_no)?;

        self.file.seek(SeekFrom::Start(self.offset_of(page_no)))?;
        let mut data = vec![0u8; self.size_of(page_no)];
        self.file.read_exact(&mut data)?;

        Ok(data)
    }

    /// Overwrite page `page_no`.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page hasn't been allocated and
    /// `Error::IllegalState` if `data` has the wrong length.
    pub fn write_page_bytes(&mut self, page_no: u32, data: &[u8]) -> Result<()> {
        if page_no != 0 {
            self.check_exists(page_no)?;
        }
        if data.len() != self.size_of(page_no) {
            return Err(Error::illegal(format!(
                "{} bytes written to a {}-byte page",
                data.len(),
                self.size_of(page_no)
            )));
        }

        self.file.seek(SeekFrom::Start(self.offset_of(page_no)))?;
        self.file.write_all(data)?;
        self.file.sync_all()?;

        Ok(())
    }

    /// Append a page at the end of the file and return its number.
    ///
    /// # Errors
    /// `IllegalState` if the root pointer page has not been written yet or
    /// `data` has the wrong length.
    pub fn append(&mut self, data: &[u8]) -> Result<u32> {
        if self.length() < ROOT_POINTER_PAGE_SIZE as u64 {
            return Err(Error::illegal("append before the root pointer page"));
        }
        if data.len() != self.page_size {
            return Err(Error::illegal(format!(
                "{} bytes appended to a file of {}-byte pages",
                data.len(),
                self.page_size
            )));
        }

        let page_no = self.page_count + 1;
        self.file.seek(SeekFrom::Start(self.offset_of(page_no)))?;
        self.file.write_all(data)?;
        self.file.sync_all()?;

        self.page_count = page_no;
        Ok(page_no)
    }

    /// Number of numbered pages, root pointer excluded.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Length of the file in bytes.
    pub fn length(&self) -> u64 {
        if self.page_count > 0 {
            self.offset_of(self.page_count) + self.page_size as u64
        } else {
            self.file.metadata().map(|m| m.len()).unwrap_or(0)
        }
    }
}
