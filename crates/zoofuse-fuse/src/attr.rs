//! Permission modes and node attributes.
//!
//! A znode has no type of its own: one with children is shown as a
//! directory, one without as a regular file. Permission bits depend only on
//! whether the mount is read-write.

use zoofuse_core::NodeStat;

/// Mode of directories on a read-write mount (rwxr-xr-x).
pub const DIR_PERM_RW: u16 = 0o755;

/// Mode of directories on a read-only mount (r-xr-xr-x).
pub const DIR_PERM_RO: u16 = 0o555;

/// Mode of files on a read-write mount (rw-r--r--).
pub const FILE_PERM_RW: u16 = 0o644;

/// Mode of files on a read-only mount, and of the marker entry (r--r--r--).
pub const FILE_PERM_RO: u16 = 0o444;

/// Returns the directory permission bits for the mount mode.
pub fn dir_permissions(read_write: bool) -> u16 {
    if read_write { DIR_PERM_RW } else { DIR_PERM_RO }
}

/// Returns the file permission bits for the mount mode.
pub fn file_permissions(read_write: bool) -> u16 {
    if read_write { FILE_PERM_RW } else { FILE_PERM_RO }
}

/// How a znode is presented to the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

impl NodeKind {
    /// Classifies a znode by its child count.
    pub fn of(stat: &NodeStat) -> Self {
        if stat.is_directory() {
            NodeKind::Directory
        } else {
            NodeKind::File
        }
    }

    pub fn file_type(self) -> fuser::FileType {
        match self {
            NodeKind::Directory => fuser::FileType::Directory,
            NodeKind::File => fuser::FileType::RegularFile,
        }
    }
}

/// Attributes of a path, freshly derived from the remote node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub kind: NodeKind,
    pub perm: u16,
    pub size: u64,
    /// Modification time in seconds since the epoch.
    pub mtime: u64,
    /// Change time in seconds since the epoch.
    pub ctime: u64,
}

impl NodeAttr {
    /// Attributes of a freshly created, empty file.
    pub fn empty_file(perm: u16, now: u64) -> Self {
        Self {
            kind: NodeKind::File,
            perm,
            size: 0,
            mtime: now,
            ctime: now,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// An entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
}
