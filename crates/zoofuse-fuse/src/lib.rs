//! FUSE filesystem for ZooKeeper trees.
//!
//! Every znode appears as a file or a directory: nodes with children are
//! directories, the rest are regular files whose content is the node
//! payload. Each directory also carries a read-only `_znode` file exposing
//! the directory node's own payload.
//!
//! # Usage
//!
//! ```ignore
//! use zoofuse_fuse::{MountConfig, MountContext, ZooMount};
//! use zoofuse_core::ZkClient;
//!
//! let ctx = MountContext {
//!     client: ZkClient::connect("127.0.0.1:2181")?,
//!     endpoint: "127.0.0.1:2181".into(),
//!     root_alias: "/".into(),
//!     mountpoint: "/mnt/zk".into(),
//! };
//! ZooMount::mount(ctx, MountConfig::default())?.serve()?;
//! ```

pub mod adapter;
pub mod attr;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filesystem;
pub mod handles;
pub mod inode;
pub mod mount;

pub use adapter::ZooFs;
pub use attr::{DirEntry, NodeAttr, NodeKind, dir_permissions, file_permissions};
pub use config::MountConfig;
pub use error::{FsError, FsResult};
pub use filesystem::ZooFuse;
pub use handles::{HandleTable, ZnodeFile};
pub use inode::{InodeTable, ROOT_INODE};
pub use mount::{MountContext, Unmounter, ZooMount, mount_options};
