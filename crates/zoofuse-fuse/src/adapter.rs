//! Path-level filesystem operations over a [`ZnodeStore`].
//!
//! [`ZooFs`] holds no state between calls: every operation re-queries the
//! store, so a node can flip between file and directory as its children
//! come and go. The kernel bridge in [`crate::filesystem`] turns inodes
//! into the mount-relative paths used here.

use crate::attr::{
    DirEntry, FILE_PERM_RO, NodeAttr, NodeKind, dir_permissions, file_permissions,
};
use crate::config::MountConfig;
use crate::error::{FsError, FsResult};
use crate::handles::ZnodeFile;
use crate::inode::child_path;
use crossbeam_channel::unbounded;
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};
use zoofuse_core::{AclPolicy, NodeMode, NodeStat, ZNODE_MARKER, ZnodeStore, is_marker_path};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Filesystem adapter over a path-translating store.
pub struct ZooFs {
    store: Arc<dyn ZnodeStore>,
    config: MountConfig,
    /// Reported as the root's timestamps.
    mounted_at: u64,
}

impl std::fmt::Debug for ZooFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZooFs")
            .field("config", &self.config)
            .field("mounted_at", &self.mounted_at)
            .finish_non_exhaustive()
    }
}

impl ZooFs {
    /// `store` must accept mount-relative paths (normally a `TreeGateway`).
    pub fn new(store: Arc<dyn ZnodeStore>, config: MountConfig) -> Self {
        Self {
            store,
            config,
            mounted_at: now_secs(),
        }
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    fn read_write(&self) -> bool {
        self.config.read_write
    }

    fn require_writable(&self, path: &str) -> FsResult<()> {
        if self.read_write() {
            Ok(())
        } else {
            Err(FsError::PermissionDenied(path.to_string()))
        }
    }

    fn attr_from_stat(&self, path: &str, stat: &NodeStat) -> NodeAttr {
        let (kind, perm) = if is_marker_path(path) {
            (NodeKind::File, FILE_PERM_RO)
        } else {
            match NodeKind::of(stat) {
                NodeKind::Directory => (NodeKind::Directory, dir_permissions(self.read_write())),
                NodeKind::File => (NodeKind::File, file_permissions(self.read_write())),
            }
        };
        NodeAttr {
            kind,
            perm,
            size: stat.data_length,
            mtime: stat.mtime_secs(),
            ctime: stat.ctime_secs(),
        }
    }

    /// Attributes of `path`, fetched fresh from the store.
    ///
    /// The root answers with a synthetic directory and no remote call.
    pub fn get_attributes(&self, path: &str) -> FsResult<NodeAttr> {
        if path.is_empty() {
            return Ok(NodeAttr {
                kind: NodeKind::Directory,
                perm: dir_permissions(self.read_write()),
                size: 0,
                mtime: self.mounted_at,
                ctime: self.mounted_at,
            });
        }

        match self.store.exists(path) {
            Ok(Some(stat)) => Ok(self.attr_from_stat(path, &stat)),
            Ok(None) => Err(FsError::NotFound(path.to_string())),
            Err(e) => {
                debug!(path, error = %e, "exists failed");
                Err(FsError::NotFound(path.to_string()))
            }
        }
    }

    /// Lists the children of `path` plus the marker entry.
    ///
    /// Each child is probed with `exists` to pick its kind, at most
    /// `probe_concurrency` at a time. Children that vanish or fail their
    /// probe are left out. Order is unspecified.
    pub fn list_directory(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let children = self.store.children(path).map_err(|e| {
            error!(path, error = %e, "Failed to list children");
            FsError::NotFound(path.to_string())
        })?;

        let mut entries = Vec::with_capacity(children.len() + 1);
        entries.push(DirEntry {
            name: ZNODE_MARKER.to_string(),
            kind: NodeKind::File,
        });
        if children.is_empty() {
            return Ok(entries);
        }

        let workers = self.config.probe_concurrency.clamp(1, children.len());
        let (work_tx, work_rx) = unbounded::<String>();
        for name in children {
            // Receivers outlive this loop; send cannot fail.
            let _ = work_tx.send(name);
        }
        drop(work_tx);

        let store = &self.store;
        let probed: Vec<Vec<DirEntry>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let work_rx = work_rx.clone();
                    scope.spawn(move || {
                        let mut found = Vec::new();
                        for name in work_rx.iter() {
                            let child = child_path(path, &name);
                            match store.exists(&child) {
                                Ok(Some(stat)) => found.push(DirEntry {
                                    kind: NodeKind::of(&stat),
                                    name,
                                }),
                                Ok(None) => {
                                    warn!(path = %child, "Child vanished during listing");
                                }
                                Err(e) => {
                                    warn!(path = %child, error = %e, "Dropping child after failed probe");
                                }
                            }
                        }
                        found
                    })
                })
                .collect();

            handles
                .into_iter()
                .filter_map(|h| h.join().ok())
                .collect()
        });

        entries.extend(probed.into_iter().flatten());
        Ok(entries)
    }

    /// Creates an empty persistent node and opens it.
    pub fn create(&self, path: &str, mode: u32) -> FsResult<ZnodeFile> {
        if is_marker_path(path) {
            return Err(FsError::PermissionDenied(path.to_string()));
        }
        self.require_writable(path)?;

        match self
            .store
            .create(path, &[], NodeMode::Persistent, AclPolicy::Open)
        {
            Ok(created) => {
                debug!(path, created = %created, mode, "Created znode");
                Ok(ZnodeFile::new(path, Arc::clone(&self.store), Vec::new(), true))
            }
            Err(e) => {
                error!(path, error = %e, "Failed to create znode");
                Err(FsError::NotFound(path.to_string()))
            }
        }
    }

    /// Opens `path`, snapshotting its payload.
    ///
    /// Write access is refused on read-only mounts and on the marker.
    pub fn open(&self, path: &str, flags: i32) -> FsResult<ZnodeFile> {
        let wants_write = flags & libc::O_ACCMODE != libc::O_RDONLY;
        if wants_write {
            if is_marker_path(path) {
                return Err(FsError::PermissionDenied(path.to_string()));
            }
            self.require_writable(path)?;
        }

        match self.store.get(path) {
            Ok((data, _)) => Ok(ZnodeFile::new(
                path,
                Arc::clone(&self.store),
                data,
                wants_write,
            )),
            Err(e) => {
                debug!(path, error = %e, "get failed");
                Err(FsError::NotFound(path.to_string()))
            }
        }
    }

    /// Deletes the node at `path` regardless of its version.
    pub fn unlink(&self, path: &str) -> FsResult<()> {
        if is_marker_path(path) {
            return Err(FsError::PermissionDenied(path.to_string()));
        }
        self.require_writable(path)?;

        self.store.delete(path).map_err(|e| {
            error!(path, error = %e, "Failed to delete znode");
            FsError::from_store(path, e)
        })
    }

    /// Deletes a node that currently has children.
    ///
    /// A childless node is a file, so it is rejected with `NotADirectory`.
    pub fn remove_directory(&self, path: &str) -> FsResult<()> {
        if is_marker_path(path) {
            return Err(FsError::PermissionDenied(path.to_string()));
        }
        self.require_writable(path)?;

        let stat = match self.store.exists(path) {
            Ok(Some(stat)) => stat,
            Ok(None) | Err(_) => return Err(FsError::NotFound(path.to_string())),
        };
        if !stat.is_directory() {
            return Err(FsError::NotADirectory(path.to_string()));
        }

        self.store.delete(path).map_err(|e| {
            error!(path, error = %e, "Failed to delete znode");
            FsError::from_store(path, e)
        })
    }

    /// Accepted and ignored: znode payloads are replaced whole.
    pub fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        debug!(path, size, "truncate ignored");
        Ok(())
    }

    /// Accepted and ignored: znode timestamps are set by the server.
    pub fn update_timestamps(
        &self,
        path: &str,
        atime: Option<SystemTime>,
        mtime: Option<SystemTime>,
    ) -> FsResult<()> {
        debug!(path, ?atime, ?mtime, "utimens ignored");
        Ok(())
    }

    /// Attributes reported for a freshly created file.
    pub fn created_attr(&self) -> NodeAttr {
        NodeAttr::empty_file(file_permissions(self.read_write()), now_secs())
    }
}
