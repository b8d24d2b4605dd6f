//! Inode management for the FUSE filesystem.
//!
//! The kernel addresses entries by inode number; the adapter addresses them
//! by mount-relative path. This table maps between the two. Nothing about
//! the node itself is stored here: attributes are re-fetched on every call.

use dashmap::DashMap;
use dashmap::mapref::one::Ref;
use std::sync::atomic::{AtomicU64, Ordering};

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

/// An entry in the inode table.
#[derive(Debug)]
pub struct InodeEntry {
    /// Mount-relative path; empty for the root.
    pub path: String,
    /// Lookup count for `forget()` handling.
    nlookup: AtomicU64,
}

impl InodeEntry {
    fn new(path: String, nlookup: u64) -> Self {
        Self {
            path,
            nlookup: AtomicU64::new(nlookup),
        }
    }

    /// Increments the lookup count and returns the new value.
    pub fn inc_nlookup(&self) -> u64 {
        self.nlookup.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrements the lookup count, returning `None` on underflow.
    pub fn dec_nlookup(&self, count: u64) -> Option<u64> {
        let old = self.nlookup.fetch_sub(count, Ordering::SeqCst);
        if old < count {
            self.nlookup.fetch_add(count, Ordering::SeqCst);
            None
        } else {
            Some(old - count)
        }
    }

    pub fn nlookup(&self) -> u64 {
        self.nlookup.load(Ordering::SeqCst)
    }
}

/// Joins a child name onto a mount-relative parent path.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Thread-safe bidirectional map between inodes and mount-relative paths.
#[derive(Debug)]
pub struct InodeTable {
    path_to_inode: DashMap<String, u64>,
    inode_to_entry: DashMap<u64, InodeEntry>,
    next_inode: AtomicU64,
}

impl InodeTable {
    /// Creates a table with the root pre-allocated.
    pub fn new() -> Self {
        let table = Self {
            path_to_inode: DashMap::new(),
            inode_to_entry: DashMap::new(),
            next_inode: AtomicU64::new(ROOT_INODE + 1),
        };
        table.path_to_inode.insert(String::new(), ROOT_INODE);
        table
            .inode_to_entry
            .insert(ROOT_INODE, InodeEntry::new(String::new(), 1));
        table
    }

    /// Returns the inode for `path`, allocating one if needed.
    /// An existing inode has its lookup count incremented.
    pub fn get_or_insert(&self, path: &str) -> u64 {
        if let Some(inode) = self.path_to_inode.get(path) {
            let ino = *inode;
            drop(inode);
            if let Some(entry) = self.inode_to_entry.get(&ino) {
                entry.inc_nlookup();
            }
            return ino;
        }
        self.allocate(path, 1)
    }

    /// Returns the inode for `path` without touching lookup counts.
    ///
    /// Used for readdir entries, which the kernel never forgets. A fresh
    /// entry starts at zero and is counted once a real lookup arrives.
    pub fn peek_or_allocate(&self, path: &str) -> u64 {
        match self.get_inode(path) {
            Some(ino) => ino,
            None => self.allocate(path, 0),
        }
    }

    fn allocate(&self, path: &str, nlookup: u64) -> u64 {
        let mut counted = true;
        let ino = *self
            .path_to_inode
            .entry(path.to_string())
            .or_insert_with(|| {
                counted = false;
                let ino = self.next_inode.fetch_add(1, Ordering::SeqCst);
                self.inode_to_entry
                    .insert(ino, InodeEntry::new(path.to_string(), nlookup));
                ino
            });
        // Lost a race with another allocation; count this lookup on the winner.
        if counted
            && nlookup > 0
            && let Some(entry) = self.inode_to_entry.get(&ino)
        {
            entry.inc_nlookup();
        }
        ino
    }

    pub fn get(&self, inode: u64) -> Option<Ref<'_, u64, InodeEntry>> {
        self.inode_to_entry.get(&inode)
    }

    /// Returns the path an inode stands for.
    pub fn path_of(&self, inode: u64) -> Option<String> {
        self.inode_to_entry.get(&inode).map(|e| e.path.clone())
    }

    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(path).map(|r| *r)
    }

    /// Decrements the lookup count; evicts at zero. Root is never evicted.
    /// Returns `true` if the inode was evicted.
    pub fn forget(&self, inode: u64, nlookup: u64) -> bool {
        if inode == ROOT_INODE {
            return false;
        }

        if let Some(entry) = self.inode_to_entry.get(&inode)
            && let Some(remaining) = entry.dec_nlookup(nlookup)
            && remaining == 0
        {
            drop(entry);
            return self.evict(inode);
        }
        false
    }

    fn evict(&self, inode: u64) -> bool {
        if let Some((_, entry)) = self.inode_to_entry.remove(&inode) {
            // Only drop the path mapping if it still points here.
            self.path_to_inode
                .remove_if(&entry.path, |_, &ino| ino == inode);
            true
        } else {
            false
        }
    }

    /// Drops the path mapping after the node was removed. The inode entry
    /// stays until the kernel forgets it.
    pub fn invalidate_path(&self, path: &str) {
        self.path_to_inode.remove(path);
    }

    pub fn len(&self) -> usize {
        self.inode_to_entry.len()
    }

    /// Returns true if the table only contains the root inode.
    pub fn is_empty(&self) -> bool {
        self.inode_to_entry.len() <= 1
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_inode_exists() {
        let table = InodeTable::new();
        assert_eq!(table.path_of(ROOT_INODE).as_deref(), Some(""));
        assert_eq!(table.get_inode(""), Some(ROOT_INODE));
        assert!(table.is_empty());
    }

    #[test]
    fn test_allocate_inode() {
        let table = InodeTable::new();
        let inode = table.get_or_insert("config");
        assert!(inode > ROOT_INODE);

        assert_eq!(table.get_or_insert("config"), inode);
        assert_eq!(table.get(inode).unwrap().nlookup(), 2);
        assert_eq!(table.path_of(inode).as_deref(), Some("config"));
    }

    #[test]
    fn test_forget_evicts() {
        let table = InodeTable::new();
        let inode = table.get_or_insert("temp");

        assert!(table.forget(inode, 1));
        assert!(table.get(inode).is_none());
        assert!(table.get_inode("temp").is_none());
    }

    #[test]
    fn test_forget_root_never_evicts() {
        let table = InodeTable::new();
        assert!(!table.forget(ROOT_INODE, 1));
        assert!(table.get(ROOT_INODE).is_some());
    }

    #[test]
    fn test_nlookup_increment_decrement() {
        let table = InodeTable::new();
        let inode = table.get_or_insert("a/b");
        table.get_or_insert("a/b");

        assert!(!table.forget(inode, 1));
        assert_eq!(table.get(inode).unwrap().nlookup(), 1);
        assert!(table.forget(inode, 1));
        assert!(table.get(inode).is_none());
    }

    #[test]
    fn test_invalidated_path_gets_fresh_inode() {
        let table = InodeTable::new();
        let old = table.get_or_insert("gone");

        table.invalidate_path("gone");
        assert!(table.get_inode("gone").is_none());
        assert!(table.get(old).is_some());

        let new = table.get_or_insert("gone");
        assert_ne!(old, new);

        // Forgetting the stale inode must not unmap the new one.
        assert!(table.forget(old, 1));
        assert_eq!(table.get_inode("gone"), Some(new));
    }

    #[test]
    fn test_listed_entry_evicted_after_single_forget() {
        let table = InodeTable::new();
        let listed = table.peek_or_allocate("dir/child");
        assert_eq!(table.get(listed).unwrap().nlookup(), 0);
        // Listing again must not inflate the count.
        assert_eq!(table.peek_or_allocate("dir/child"), listed);

        assert_eq!(table.get_or_insert("dir/child"), listed);
        assert_eq!(table.get(listed).unwrap().nlookup(), 1);
        assert!(table.forget(listed, 1));
        assert!(table.get_inode("dir/child").is_none());
    }

    #[test]
    fn test_peek_keeps_existing_count() {
        let table = InodeTable::new();
        let inode = table.get_or_insert("known");
        assert_eq!(table.peek_or_allocate("known"), inode);
        assert_eq!(table.get(inode).unwrap().nlookup(), 1);
    }

    #[test]
    fn test_child_path() {
        assert_eq!(child_path("", "x"), "x");
        assert_eq!(child_path("a/b", "c"), "a/b/c");
    }

    #[test]
    fn test_concurrent_allocation() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(InodeTable::new());
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let table = Arc::clone(&table);
                thread::spawn(move || table.get_or_insert(&format!("file_{i}")))
            })
            .collect();

        let mut inodes: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        inodes.sort_unstable();
        inodes.dedup();
        assert_eq!(inodes.len(), 10);
        assert_eq!(table.len(), 11);
    }
}
