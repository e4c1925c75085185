//! File registry used to dispatch page reads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::{Error, FileId, Result};
use crate::storage::DbFile;

/// Maps a [`FileId`] to the file that owns its pages.
///
/// One catalog is shared by the buffer pool and every tree file opened on
/// it.
#[derive(Default)]
pub struct Catalog {
    files: RwLock<HashMap<FileId, Arc<dyn DbFile>>>,
    next_id: AtomicU32,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A file id not handed out before by this catalog.
    pub fn next_file_id(&self) -> FileId {
        FileId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Register `file`, replacing any earlier file with the same id.
    pub fn add_file(&self, file: Arc<dyn DbFile>) {
        self.files.write().insert(file.id(), file);
    }

    /// # Errors
    /// `IllegalState` if no file with `id` is registered.
    pub fn file(&self, id: FileId) -> Result<Arc<dyn DbFile>> {
        self.files
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::illegal(format!("{} is not in the catalog", id)))
    }

    pub fn remove_file(&self, id: FileId) -> Option<Arc<dyn DbFile>> {
        self.files.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::PageLayout;
    use crate::storage::PageFile;
    use crate::tuple::TupleDesc;
    use tempfile::tempdir;

    #[test]
    fn test_file_ids_are_unique() {
        let catalog = Catalog::new();
        let a = catalog.next_file_id();
        let b = catalog.next_file_id();
        assert_ne!(a, b);
        assert_ne!(a.0, 0);
    }

    #[test]
    fn test_add_and_lookup() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new();
        let id = catalog.next_file_id();
        let layout = PageLayout::new(128, TupleDesc::new(1), 0);
        let file = PageFile::create(dir.path().join("t.db"), id, layout).unwrap();

        assert!(catalog.file(id).is_err());
        catalog.add_file(Arc::new(file));
        assert_eq!(catalog.file(id).unwrap().id(), id);
        assert_eq!(catalog.len(), 1);

        assert!(catalog.remove_file(id).is_some());
        assert!(catalog.is_empty());
    }
}
