//! Error handling and mapping for the FUSE filesystem.
//!
//! The adapter classifies every failure into one [`FsError`] variant, which
//! maps to the narrowest POSIX error code the kernel understands.

use thiserror::Error;
use zoofuse_core::StoreError;

/// Filesystem-level failure conditions.
#[derive(Debug, Error)]
pub enum FsError {
    /// The target znode does not exist (or could not be created/opened).
    #[error("No such znode: {0}")]
    NotFound(String),

    /// A directory-only operation hit a childless znode.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Operation forbidden on the marker entry or on a read-only mount.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The write exceeds the znode payload bound.
    #[error("Payload of {size} bytes exceeds the znode limit of {max} bytes")]
    PayloadTooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// The enforced bound.
        max: usize,
    },

    /// Remote failure during set/delete that has no narrower classification.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Filesystem path of the failed operation.
        path: String,
        /// The gateway error.
        #[source]
        source: StoreError,
    },

    /// Read offset outside the file snapshot.
    #[error("Offset {offset} is beyond the end of {path} ({len} bytes)")]
    InvalidArgument {
        /// Filesystem path of the file.
        path: String,
        /// Requested offset.
        offset: i64,
        /// Snapshot length.
        len: usize,
    },

    /// Unknown inode.
    #[error("Invalid inode: {0}")]
    InvalidInode(u64),

    /// Unknown file or directory handle.
    #[error("Invalid file handle: {0}")]
    InvalidHandle(u64),
}

impl FsError {
    /// Converts this error to a libc error code for FUSE.
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) | FsError::InvalidInode(_) => libc::ENOENT,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::PermissionDenied(_) => libc::EPERM,
            FsError::PayloadTooLarge { .. } => libc::EFBIG,
            FsError::Io { .. } => libc::EIO,
            FsError::InvalidArgument { .. } => libc::EINVAL,
            FsError::InvalidHandle(_) => libc::EBADF,
        }
    }

    /// Classifies a gateway error raised by a write-path operation
    /// (set, delete).
    pub fn from_store(path: &str, e: StoreError) -> Self {
        match e {
            StoreError::PayloadTooLarge { size, max } => FsError::PayloadTooLarge { size, max },
            e => FsError::Io {
                path: path.to_string(),
                source: e,
            },
        }
    }
}

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use zoofuse_core::ZkError;

    #[test]
    fn test_condition_errno_mapping() {
        assert_eq!(FsError::NotFound("a".into()).to_errno(), libc::ENOENT);
        assert_eq!(FsError::NotADirectory("a".into()).to_errno(), libc::ENOTDIR);
        assert_eq!(FsError::PermissionDenied("a".into()).to_errno(), libc::EPERM);
        assert_eq!(
            FsError::PayloadTooLarge { size: 2, max: 1 }.to_errno(),
            libc::EFBIG
        );
        assert_eq!(
            FsError::Io {
                path: "a".into(),
                source: StoreError::Zk(ZkError::ConnectionLoss),
            }
            .to_errno(),
            libc::EIO
        );
        assert_eq!(
            FsError::InvalidArgument {
                path: "a".into(),
                offset: 9,
                len: 3,
            }
            .to_errno(),
            libc::EINVAL
        );
    }

    #[test]
    fn test_bridge_errno_mapping() {
        assert_eq!(FsError::InvalidInode(42).to_errno(), libc::ENOENT);
        assert_eq!(FsError::InvalidHandle(1).to_errno(), libc::EBADF);
    }

    #[test]
    fn test_store_classification() {
        let e = FsError::from_store("x", StoreError::PayloadTooLarge { size: 10, max: 5 });
        assert!(matches!(e, FsError::PayloadTooLarge { size: 10, max: 5 }));

        let e = FsError::from_store("x", StoreError::Zk(ZkError::NoNode));
        assert!(matches!(e, FsError::Io { ref path, .. } if path == "x"));

        let e = FsError::from_store("x", StoreError::Zk(ZkError::NotEmpty));
        assert_eq!(e.to_errno(), libc::EIO);

        let e = FsError::from_store("x", StoreError::Zk(ZkError::BadVersion));
        assert_eq!(e.to_errno(), libc::EIO);
    }

    #[test]
    fn test_error_display() {
        let e = FsError::InvalidInode(42);
        assert!(e.to_string().contains("42"));

        let e = FsError::NotFound("config/app".into());
        assert!(e.to_string().contains("config/app"));

        let e = FsError::InvalidArgument {
            path: "f".into(),
            offset: 10,
            len: 3,
        };
        assert!(e.to_string().contains("10"));
    }
}
