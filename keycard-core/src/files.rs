//! Storage collaborator boundary.
//!
//! The vault owns no persistent bytes itself; four logical files live
//! behind the [`FileStore`] trait. [`MemoryFileStore`] is the heap-backed
//! implementation used by the host tooling and the test suites.

use alloc::vec;
use alloc::vec::Vec;

/// Identifiers of the four logical files owned by the storage collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileId {
    /// Primary data blob.
    DataPrimary,
    /// Secondary data blob.
    DataSecondary,
    /// Display name associated with the data blob pair.
    Name,
    /// Master-secret content.
    MasterSecret,
}

impl FileId {
    /// Every logical file, in purge order.
    pub const ALL: [FileId; 4] = [
        FileId::DataPrimary,
        FileId::DataSecondary,
        FileId::Name,
        FileId::MasterSecret,
    ];

    const fn index(self) -> usize {
        match self {
            FileId::DataPrimary => 0,
            FileId::DataSecondary => 1,
            FileId::Name => 2,
            FileId::MasterSecret => 3,
        }
    }
}

/// Errors raised by a storage collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FileStoreError {
    #[error("file {0:?} does not exist")]
    Missing(FileId),
    #[error("range {offset}+{len} falls outside the {size}-byte file")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("storage capacity exhausted")]
    Exhausted,
}

/// Four fixed logical files addressed by id.
///
/// Reads and writes require the file to exist; deletion is idempotent so
/// purge paths can run unconditionally.
pub trait FileStore {
    /// Allocate (or reallocate) a zero-filled file of the given size.
    fn create(&mut self, id: FileId, size: usize) -> Result<(), FileStoreError>;

    /// Overwrite bytes at the given offset.
    fn write(&mut self, id: FileId, offset: usize, data: &[u8]) -> Result<(), FileStoreError>;

    /// Read a range of bytes.
    fn read(&self, id: FileId, offset: usize, len: usize) -> Result<Vec<u8>, FileStoreError>;

    /// Drop a file. Deleting an absent file is a no-op.
    fn delete(&mut self, id: FileId);

    /// Whether the file currently exists.
    fn exists(&self, id: FileId) -> bool;

    /// Current size in bytes, or zero when the file does not exist.
    fn size(&self, id: FileId) -> usize;
}

/// Heap-backed store with an optional capacity ceiling.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: [Option<Vec<u8>>; 4],
    capacity: Option<usize>,
}

impl MemoryFileStore {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store refusing to allocate past `limit` total bytes.
    pub fn with_capacity(limit: usize) -> Self {
        Self {
            files: Default::default(),
            capacity: Some(limit),
        }
    }

    fn used(&self) -> usize {
        self.files
            .iter()
            .filter_map(|file| file.as_ref().map(Vec::len))
            .sum()
    }

    fn file(&self, id: FileId) -> Result<&Vec<u8>, FileStoreError> {
        self.files[id.index()]
            .as_ref()
            .ok_or(FileStoreError::Missing(id))
    }
}

impl FileStore for MemoryFileStore {
    fn create(&mut self, id: FileId, size: usize) -> Result<(), FileStoreError> {
        if let Some(limit) = self.capacity {
            let occupied = self.used() - self.size(id);
            if occupied + size > limit {
                return Err(FileStoreError::Exhausted);
            }
        }
        self.files[id.index()] = Some(vec![0u8; size]);
        Ok(())
    }

    fn write(&mut self, id: FileId, offset: usize, data: &[u8]) -> Result<(), FileStoreError> {
        let file = self.files[id.index()]
            .as_mut()
            .ok_or(FileStoreError::Missing(id))?;
        let end = offset
            .checked_add(data.len())
            .filter(|end| *end <= file.len())
            .ok_or(FileStoreError::OutOfBounds {
                offset,
                len: data.len(),
                size: file.len(),
            })?;
        file[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, id: FileId, offset: usize, len: usize) -> Result<Vec<u8>, FileStoreError> {
        let file = self.file(id)?;
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= file.len())
            .ok_or(FileStoreError::OutOfBounds {
                offset,
                len,
                size: file.len(),
            })?;
        Ok(file[offset..end].to_vec())
    }

    fn delete(&mut self, id: FileId) {
        self.files[id.index()] = None;
    }

    fn exists(&self, id: FileId) -> bool {
        self.files[id.index()].is_some()
    }

    fn size(&self, id: FileId) -> usize {
        self.files[id.index()]
            .as_ref()
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_write_read_lifecycle() {
        let mut store = MemoryFileStore::new();
        store.create(FileId::DataPrimary, 8).expect("create");
        assert!(store.exists(FileId::DataPrimary));
        assert_eq!(store.size(FileId::DataPrimary), 8);

        store
            .write(FileId::DataPrimary, 2, &[0xAA, 0xBB])
            .expect("write");
        assert_eq!(
            store.read(FileId::DataPrimary, 0, 8).expect("read"),
            vec![0, 0, 0xAA, 0xBB, 0, 0, 0, 0]
        );
    }

    #[test]
    fn recreate_replaces_content() {
        let mut store = MemoryFileStore::new();
        store.create(FileId::Name, 4).expect("create");
        store.write(FileId::Name, 0, b"abcd").expect("write");
        store.create(FileId::Name, 2).expect("recreate");
        assert_eq!(store.read(FileId::Name, 0, 2).expect("read"), vec![0, 0]);
    }

    #[test]
    fn missing_file_is_reported() {
        let store = MemoryFileStore::new();
        assert_eq!(
            store.read(FileId::MasterSecret, 0, 1).expect_err("error"),
            FileStoreError::Missing(FileId::MasterSecret)
        );
        assert_eq!(store.size(FileId::MasterSecret), 0);
        assert!(!store.exists(FileId::MasterSecret));
    }

    #[test]
    fn delete_is_idempotent() {
        let mut store = MemoryFileStore::new();
        store.create(FileId::DataSecondary, 4).expect("create");
        store.delete(FileId::DataSecondary);
        store.delete(FileId::DataSecondary);
        assert!(!store.exists(FileId::DataSecondary));
    }

    #[test]
    fn out_of_bounds_access_is_rejected() {
        let mut store = MemoryFileStore::new();
        store.create(FileId::DataPrimary, 4).expect("create");
        assert!(matches!(
            store.write(FileId::DataPrimary, 3, &[1, 2]).expect_err("error"),
            FileStoreError::OutOfBounds { offset: 3, len: 2, size: 4 }
        ));
        assert!(matches!(
            store.read(FileId::DataPrimary, usize::MAX, 2).expect_err("error"),
            FileStoreError::OutOfBounds { .. }
        ));
    }

    #[test]
    fn capacity_limit_is_enforced() {
        let mut store = MemoryFileStore::with_capacity(16);
        store.create(FileId::DataPrimary, 12).expect("create");
        assert_eq!(
            store.create(FileId::DataSecondary, 8).expect_err("error"),
            FileStoreError::Exhausted
        );
        // Replacing a file frees its old allocation first.
        store.create(FileId::DataPrimary, 16).expect("recreate");
    }
}
