//! Open file handles.
//!
//! A [`ZnodeFile`] is created by every successful open or create. It serves
//! reads from the payload snapshot taken at open time and sends each write
//! straight to the remote node as its complete new payload: znodes have
//! whole-value semantics, so there is no partial update to express.
//!
//! [`HandleTable`] keeps open handles (files and directory listings) under
//! the numeric ids handed to the kernel.

use crate::error::{FsError, FsResult};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::Ref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;
use zoofuse_core::ZnodeStore;

/// An open file backed by one znode.
pub struct ZnodeFile {
    path: String,
    store: Arc<dyn ZnodeStore>,
    /// Payload snapshot taken at open time.
    data: Vec<u8>,
    /// Size last reported by the store (or snapshot length before any write).
    size: AtomicU64,
    writable: bool,
}

impl std::fmt::Debug for ZnodeFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZnodeFile")
            .field("path", &self.path)
            .field("size", &self.size())
            .field("writable", &self.writable)
            .finish_non_exhaustive()
    }
}

impl ZnodeFile {
    /// Creates a handle seeded with `data`.
    pub fn new(path: impl Into<String>, store: Arc<dyn ZnodeStore>, data: Vec<u8>, writable: bool) -> Self {
        let size = AtomicU64::new(data.len() as u64);
        Self {
            path: path.into(),
            store,
            data,
            size,
            writable,
        }
    }

    /// Filesystem path of the backing znode.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Size recorded for this handle.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Reads up to `len` bytes from the snapshot starting at `offset`.
    ///
    /// An offset equal to the snapshot length yields an empty slice; an
    /// offset past it is rejected.
    pub fn read(&self, offset: i64, len: usize) -> FsResult<&[u8]> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start <= self.data.len())
            .ok_or_else(|| FsError::InvalidArgument {
                path: self.path.clone(),
                offset,
                len: self.data.len(),
            })?;
        let end = start.saturating_add(len).min(self.data.len());
        Ok(&self.data[start..end])
    }

    /// Replaces the znode payload with `content`.
    ///
    /// `offset` is accepted for the kernel's sake but ignored: the buffer
    /// becomes the whole new payload. Empty writes succeed without a remote
    /// call. Returns the length the store reports.
    pub fn write(&self, content: &[u8], offset: i64) -> FsResult<u32> {
        if content.is_empty() {
            return Ok(0);
        }
        if !self.writable {
            return Err(FsError::PermissionDenied(self.path.clone()));
        }

        match self.store.set(&self.path, content) {
            Ok(stat) => {
                self.size.store(stat.data_length, Ordering::Release);
                Ok(u32::try_from(stat.data_length).unwrap_or(u32::MAX))
            }
            Err(e) => {
                warn!(path = %self.path, offset, error = %e, "Failed to set znode data");
                Err(FsError::from_store(&self.path, e))
            }
        }
    }
}

/// Thread-safe table of open handles with auto-incrementing ids.
///
/// Ids start at 1; 0 is never handed out.
#[derive(Debug)]
pub struct HandleTable<V> {
    handles: DashMap<u64, V>,
    next_id: AtomicU64,
}

impl<V> HandleTable<V> {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Inserts a value under a fresh id and returns the id.
    pub fn insert(&self, value: V) -> u64 {
        let mut value = Some(value);
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            if let Entry::Vacant(entry) = self.handles.entry(id)
                && let Some(value) = value.take()
            {
                entry.insert(value);
                return id;
            }
        }
    }

    pub fn get(&self, id: u64) -> Option<Ref<'_, u64, V>> {
        self.handles.get(&id)
    }

    pub fn remove(&self, id: u64) -> Option<V> {
        self.handles.remove(&id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<V> Default for HandleTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use zoofuse_core::testing::{RecordingStore, StoreCall};
    use zoofuse_core::{NodeStat, StoreError, ZkError};

    fn file(data: &[u8], store: RecordingStore) -> (ZnodeFile, Arc<RecordingStore>) {
        let store = Arc::new(store);
        let f = ZnodeFile::new("mock/path", store.clone(), data.to_vec(), true);
        (f, store)
    }

    #[test]
    fn test_read_at_end_returns_nothing() {
        let (f, _) = file(&[0u8; 3], RecordingStore::new());
        assert_eq!(f.read(3, 10).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_read_past_end_is_rejected() {
        let (f, _) = file(&[0u8; 3], RecordingStore::new());
        let err = f.read(4, 1).unwrap_err();
        assert_eq!(err.to_errno(), libc::EINVAL);
    }

    #[test]
    fn test_negative_offset_is_rejected() {
        let (f, _) = file(b"abc", RecordingStore::new());
        assert!(matches!(f.read(-1, 1), Err(FsError::InvalidArgument { .. })));
    }

    #[test]
    fn test_read_window() {
        let (f, _) = file(b"hello world", RecordingStore::new());
        assert_eq!(f.read(0, 5).unwrap(), b"hello");
        assert_eq!(f.read(6, 100).unwrap(), b"world");
        assert_eq!(f.read(4, usize::MAX).unwrap(), b"o world");
    }

    #[test]
    fn test_empty_write_skips_remote_call() {
        let (f, store) = file(b"abc", RecordingStore::new());
        assert_eq!(f.write(&[], 0).unwrap(), 0);
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_write_sends_whole_buffer() {
        let store = RecordingStore::new().on_set("mock/path", Ok(NodeStat::new(3, 0)));
        let (f, store) = file(&[0u8; 3], store);

        assert_eq!(f.write(&[0u8; 3], 0).unwrap(), 3);
        assert_eq!(f.size(), 3);
        assert_eq!(store.calls(), vec![StoreCall::Set("mock/path".into(), vec![0u8; 3])]);
    }

    #[test]
    fn test_write_ignores_offset() {
        let store = RecordingStore::new().on_set("mock/path", Ok(NodeStat::new(2, 0)));
        let (f, store) = file(b"abcdef", store);

        assert_eq!(f.write(b"xy", 4).unwrap(), 2);
        assert_eq!(store.calls(), vec![StoreCall::Set("mock/path".into(), b"xy".to_vec())]);
    }

    #[test]
    fn test_write_reports_store_length() {
        let store = RecordingStore::new().on_set("mock/path", Ok(NodeStat::new(5, 0)));
        let (f, _) = file(b"", store);
        assert_eq!(f.write(b"hello", 0).unwrap(), 5);
        assert_eq!(f.size(), 5);
    }

    #[test]
    fn test_failed_write_is_io_error() {
        let store = RecordingStore::new()
            .on_set("mock/path", Err(StoreError::Zk(ZkError::ConnectionLoss)));
        let (f, _) = file(b"abc", store);

        let err = f.write(b"new", 0).unwrap_err();
        assert_eq!(err.to_errno(), libc::EIO);
        assert_eq!(f.size(), 3);
    }

    #[test]
    fn test_read_only_handle_refuses_writes() {
        let store = Arc::new(RecordingStore::new());
        let f = ZnodeFile::new("dir/_znode", store.clone(), b"abc".to_vec(), false);

        assert_eq!(f.write(b"x", 0).unwrap_err().to_errno(), libc::EPERM);
        assert!(store.calls().is_empty());
    }

    #[test]
    fn test_handle_ids_are_unique_and_nonzero() {
        let table: HandleTable<&str> = HandleTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_ne!(a, 0);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);

        assert_eq!(table.remove(a), Some("a"));
        assert!(table.get(a).is_none());
        assert_eq!(*table.get(b).unwrap(), "b");
    }

    #[test]
    fn test_concurrent_handle_insert() {
        use std::thread;

        let table = Arc::new(HandleTable::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let table = Arc::clone(&table);
                thread::spawn(move || table.insert(i))
            })
            .collect();
        let mut ids: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    proptest! {
        #[test]
        fn prop_read_returns_min_of_request_and_remaining(
            data in prop::collection::vec(any::<u8>(), 0..256),
            offset in 0usize..300,
            len in 0usize..300,
        ) {
            let f = ZnodeFile::new("p", Arc::new(RecordingStore::new()), data.clone(), false);
            let result = f.read(offset as i64, len);
            if offset > data.len() {
                prop_assert!(result.is_err());
            } else {
                let chunk = result.unwrap();
                prop_assert_eq!(chunk.len(), len.min(data.len() - offset));
                prop_assert_eq!(chunk, &data[offset..offset + chunk.len()]);
            }
        }
    }
}
