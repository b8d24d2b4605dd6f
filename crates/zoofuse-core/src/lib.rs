//! Remote-tree side of the zoofuse filesystem.
//!
//! This crate turns filesystem-relative paths into ZooKeeper paths and
//! defines the narrow capability surface the FUSE adapter talks to.
//!
//! # Components
//!
//! - [`PathTranslator`] - maps mount-relative paths under an optional root alias
//! - [`ZnodeStore`] - capability trait (exists, get, set, create, delete, children, close)
//! - [`TreeGateway`] - translating, size-checking, audit-logging [`ZnodeStore`]
//! - [`ZkClient`] - the ZooKeeper wire binding
//! - [`testing::RecordingStore`] - programmable double for tests
//!
//! # Usage
//!
//! ```ignore
//! use zoofuse_core::{PathTranslator, TreeGateway, ZkClient};
//!
//! let client = ZkClient::connect("127.0.0.1:2181")?;
//! let gateway = TreeGateway::new(client, PathTranslator::new("/chroot", "/mnt/zk"));
//! let (data, stat) = gateway.get("config/app")?;
//! ```

pub mod error;
pub mod gateway;
pub mod path;
pub mod store;
pub mod testing;
pub mod zk;

pub use error::{StoreError, StoreResult};
pub use gateway::{MAX_ZNODE_DATA, TreeGateway};
pub use path::{PathTranslator, ZNODE_MARKER, is_marker_path};
pub use store::{AclPolicy, NodeMode, NodeStat, ZnodeStore};
pub use zk::{SESSION_TIMEOUT, ZkClient};

/// Re-exported so callers can match on wire errors without naming the crate.
pub use zookeeper::ZkError;
