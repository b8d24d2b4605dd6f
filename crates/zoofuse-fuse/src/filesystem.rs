//! FUSE filesystem implementation for ZooKeeper trees.
//!
//! This module implements the fuser `Filesystem` trait on top of [`ZooFs`].
//! Callbacks resolve inodes and handles, then hand the remote work to the
//! [`RequestPool`] together with the reply, so requests run in parallel.

use crate::adapter::ZooFs;
use crate::attr::{DirEntry, NodeAttr};
use crate::dispatch::RequestPool;
use crate::error::FsError;
use crate::handles::{HandleTable, ZnodeFile};
use crate::inode::{InodeTable, ROOT_INODE, child_path};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use std::ffi::OsStr;
use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace};

/// Block size reported in attributes.
const BLOCK_SIZE: u32 = 4096;

/// State shared by every worker.
struct Shared {
    fs: ZooFs,
    inodes: InodeTable,
    files: HandleTable<Arc<ZnodeFile>>,
    /// Listings snapshotted at opendir, paged through by readdir.
    dirs: HandleTable<Vec<DirEntry>>,
    uid: u32,
    gid: u32,
}

impl Shared {
    fn path_of(&self, ino: u64) -> Result<String, FsError> {
        self.inodes.path_of(ino).ok_or(FsError::InvalidInode(ino))
    }

    fn child_of(&self, parent: u64, name: &str) -> Result<String, FsError> {
        Ok(child_path(&self.path_of(parent)?, name))
    }

    fn file_attr(&self, ino: u64, attr: &NodeAttr) -> FileAttr {
        let mtime = UNIX_EPOCH + Duration::from_secs(attr.mtime);
        let ctime = UNIX_EPOCH + Duration::from_secs(attr.ctime);
        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(u64::from(BLOCK_SIZE)),
            atime: mtime,
            mtime,
            ctime,
            crtime: ctime,
            kind: attr.kind.file_type(),
            perm: attr.perm,
            nlink: if attr.is_dir() { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    /// Inode of the directory containing `path`.
    fn parent_inode(&self, path: &str) -> u64 {
        match path.rsplit_once('/') {
            Some((parent, _)) => self.inodes.get_inode(parent).unwrap_or(ROOT_INODE),
            None => ROOT_INODE,
        }
    }
}

/// FUSE filesystem backed by a [`ZooFs`] adapter.
pub struct ZooFuse {
    shared: Arc<Shared>,
    pool: RequestPool,
}

impl std::fmt::Debug for ZooFuse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZooFuse")
            .field("fs", &self.shared.fs)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl ZooFuse {
    /// Wraps `fs` and starts its request workers.
    pub fn new(fs: ZooFs) -> io::Result<Self> {
        let pool = RequestPool::new(fs.config().request_workers)?;

        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };

        info!(
            uid,
            gid,
            read_write = fs.config().read_write,
            "ZooFuse initialized"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                fs,
                inodes: InodeTable::new(),
                files: HandleTable::new(),
                dirs: HandleTable::new(),
                uid,
                gid,
            }),
            pool,
        })
    }

    /// Runs `job` on a worker with the shared state.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce(&Shared) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.pool.submit(move || job(&shared));
    }
}

fn time_or_now(t: TimeOrNow) -> SystemTime {
    match t {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    }
}

/// Converts a name to UTF-8; znode names always are.
fn utf8_name(name: &OsStr) -> Option<String> {
    name.to_str().map(str::to_string)
}

impl Filesystem for ZooFuse {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!(workers = self.pool.threads(), "FUSE session initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        info!("FUSE session destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = utf8_name(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        trace!(parent, name = %name, "lookup");

        self.spawn(move |s| {
            let path = match s.child_of(parent, &name) {
                Ok(p) => p,
                Err(e) => return reply.error(e.to_errno()),
            };
            let config = s.fs.config();
            match s.fs.get_attributes(&path) {
                Ok(attr) => {
                    let ino = s.inodes.get_or_insert(&path);
                    reply.entry(&config.entry_ttl, &s.file_attr(ino, &attr), 0);
                }
                Err(FsError::NotFound(_)) => {
                    // Negative entry: inode 0 lets the kernel cache the miss.
                    let attr = NodeAttr::empty_file(0, 0);
                    reply.entry(&config.negative_ttl, &s.file_attr(0, &attr), 0);
                }
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!(ino, nlookup, "forget");
        self.shared.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!(ino, "getattr");
        self.spawn(move |s| {
            let result = s.path_of(ino).and_then(|path| s.fs.get_attributes(&path));
            match result {
                Ok(attr) => reply.attr(&s.fs.config().attr_ttl, &s.file_attr(ino, &attr)),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        trace!(ino, ?mode, ?uid, ?gid, ?size, "setattr");
        self.spawn(move |s| {
            let result = s.path_of(ino).and_then(|path| {
                if let Some(size) = size {
                    s.fs.truncate(&path, size)?;
                }
                if atime.is_some() || mtime.is_some() {
                    s.fs.update_timestamps(
                        &path,
                        atime.map(time_or_now),
                        mtime.map(time_or_now),
                    )?;
                }
                s.fs.get_attributes(&path)
            });
            match result {
                Ok(attr) => reply.attr(&s.fs.config().attr_ttl, &s.file_attr(ino, &attr)),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!(ino, flags, "open");
        self.spawn(move |s| {
            let result = s.path_of(ino).and_then(|path| s.fs.open(&path, flags));
            match result {
                Ok(file) => {
                    let fh = s.files.insert(Arc::new(file));
                    debug!(ino, fh, "Opened file");
                    reply.opened(fh, 0);
                }
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(ino, fh, offset, size, "read");
        // Snapshot reads never touch the network.
        let Some(file) = self.shared.files.get(fh) else {
            reply.error(FsError::InvalidHandle(fh).to_errno());
            return;
        };
        match file.read(offset, size as usize) {
            Ok(data) => reply.data(data),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        trace!(ino, fh, offset, len = data.len(), "write");
        let data = data.to_vec();
        self.spawn(move |s| {
            // Clone out of the table so no shard lock is held across the set.
            let Some(file) = s.files.get(fh).map(|f| Arc::clone(f.value())) else {
                reply.error(FsError::InvalidHandle(fh).to_errno());
                return;
            };
            match file.write(&data, offset) {
                Ok(written) => reply.written(written),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        // Writes are already on the server.
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        trace!(fh, "release");
        self.shared.files.remove(fh);
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        trace!(ino, "opendir");
        self.spawn(move |s| {
            let result = s.path_of(ino).and_then(|path| s.fs.list_directory(&path));
            match result {
                Ok(entries) => {
                    debug!(ino, entries = entries.len(), "Listed directory");
                    reply.opened(s.dirs.insert(entries), 0);
                }
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!(ino, fh, offset, "readdir");
        let s = &self.shared;
        let Some(path) = s.inodes.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(listing) = s.dirs.get(fh) else {
            reply.error(FsError::InvalidHandle(fh).to_errno());
            return;
        };

        let parent = if ino == ROOT_INODE { ROOT_INODE } else { s.parent_inode(&path) };
        let dots = [".", ".."].into_iter().map(|name| (name, FileType::Directory));
        let children = listing
            .iter()
            .map(|entry| (entry.name.as_str(), entry.kind.file_type()));

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, (name, kind)) in dots.chain(children).enumerate().skip(skip) {
            let entry_ino = match i {
                0 => ino,
                1 => parent,
                _ => s.inodes.peek_or_allocate(&child_path(&path, name)),
            };
            // add returns true once the buffer is full
            if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        trace!(fh, "releasedir");
        self.shared.dirs.remove(fh);
        reply.ok();
    }

    // ==================== Write Operations ====================

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(name) = utf8_name(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        trace!(parent, name = %name, mode, "create");

        self.spawn(move |s| {
            let result = s
                .child_of(parent, &name)
                .and_then(|path| s.fs.create(&path, mode).map(|file| (path, file)));
            match result {
                Ok((path, file)) => {
                    let ino = s.inodes.get_or_insert(&path);
                    let fh = s.files.insert(Arc::new(file));
                    let attr = s.file_attr(ino, &s.fs.created_attr());
                    reply.created(&s.fs.config().entry_ttl, &attr, 0, fh, 0);
                }
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = utf8_name(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        trace!(parent, name = %name, "unlink");

        self.spawn(move |s| {
            let result = s.child_of(parent, &name).and_then(|path| {
                s.fs.unlink(&path)?;
                s.inodes.invalidate_path(&path);
                Ok(())
            });
            match result {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = utf8_name(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        trace!(parent, name = %name, "rmdir");

        self.spawn(move |s| {
            let result = s.child_of(parent, &name).and_then(|path| {
                s.fs.remove_directory(&path)?;
                s.inodes.invalidate_path(&path);
                Ok(())
            });
            match result {
                Ok(()) => reply.ok(),
                Err(e) => reply.error(e.to_errno()),
            }
        });
    }
}
