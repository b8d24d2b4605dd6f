//! Capability surface over a ZooKeeper-like tree.
//!
//! [`ZnodeStore`] is the seam between the filesystem adapter and the remote
//! tree. The wire binding ([`ZkClient`](crate::ZkClient)), the translating
//! gateway ([`TreeGateway`](crate::TreeGateway)) and the test double
//! ([`RecordingStore`](crate::testing::RecordingStore)) all implement it.

use crate::error::StoreResult;

/// Metadata of a remote node, reduced to what the filesystem needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStat {
    /// Payload length in bytes.
    pub data_length: u64,
    /// Number of direct children.
    pub num_children: u32,
    /// Creation time, milliseconds since the epoch.
    pub ctime_ms: i64,
    /// Last modification time, milliseconds since the epoch.
    pub mtime_ms: i64,
    /// Data version counter.
    pub version: i32,
}

impl NodeStat {
    /// Creates a stat with the given payload length and child count.
    pub fn new(data_length: u64, num_children: u32) -> Self {
        Self {
            data_length,
            num_children,
            ..Self::default()
        }
    }

    /// Sets both timestamps (milliseconds).
    #[must_use]
    pub fn with_times(mut self, ctime_ms: i64, mtime_ms: i64) -> Self {
        self.ctime_ms = ctime_ms;
        self.mtime_ms = mtime_ms;
        self
    }

    /// A node with children is presented as a directory.
    pub fn is_directory(&self) -> bool {
        self.num_children > 0
    }

    /// Modification time truncated to whole seconds.
    pub fn mtime_secs(&self) -> u64 {
        millis_to_secs(self.mtime_ms)
    }

    /// Creation time truncated to whole seconds.
    pub fn ctime_secs(&self) -> u64 {
        millis_to_secs(self.ctime_ms)
    }
}

fn millis_to_secs(ms: i64) -> u64 {
    u64::try_from(ms / 1000).unwrap_or(0)
}

impl From<zookeeper::Stat> for NodeStat {
    fn from(stat: zookeeper::Stat) -> Self {
        Self {
            data_length: u64::try_from(stat.data_length).unwrap_or(0),
            num_children: u32::try_from(stat.num_children).unwrap_or(0),
            ctime_ms: stat.ctime,
            mtime_ms: stat.mtime,
            version: stat.version,
        }
    }
}

/// Lifetime and naming of a node created through the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeMode {
    /// Survives the creating session.
    #[default]
    Persistent,
    /// Removed when the creating session ends.
    Ephemeral,
    /// Persistent, with a monotonically increasing suffix appended.
    PersistentSequential,
    /// Ephemeral, with a monotonically increasing suffix appended.
    EphemeralSequential,
}

/// Access control applied to a created node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AclPolicy {
    /// Anyone may do anything (`world:anyone`, all permissions).
    #[default]
    Open,
    /// Anyone may read, nobody may modify.
    ReadOnly,
    /// Only the creating identity has access.
    CreatorAll,
}

/// Operations the filesystem needs from the remote tree.
///
/// Paths are passed through as given; implementations decide whether they
/// are already absolute (wire binding) or need translating (gateway).
/// `set` and `delete` never carry a version: writes are unconditional.
pub trait ZnodeStore: Send + Sync {
    /// Returns the node's metadata, or `None` if it does not exist.
    fn exists(&self, path: &str) -> StoreResult<Option<NodeStat>>;

    /// Fetches the node's payload and metadata.
    fn get(&self, path: &str) -> StoreResult<(Vec<u8>, NodeStat)>;

    /// Replaces the node's payload.
    fn set(&self, path: &str, data: &[u8]) -> StoreResult<NodeStat>;

    /// Creates a node and returns its actual path.
    fn create(&self, path: &str, data: &[u8], mode: NodeMode, acl: AclPolicy)
    -> StoreResult<String>;

    /// Removes a node.
    fn delete(&self, path: &str) -> StoreResult<()>;

    /// Lists the names of the node's direct children.
    fn children(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Releases the connection.
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_classification() {
        assert!(!NodeStat::new(10, 0).is_directory());
        assert!(NodeStat::new(0, 1).is_directory());
        assert!(NodeStat::new(5, 42).is_directory());
    }

    #[test]
    fn test_millisecond_timestamps_truncate() {
        let stat = NodeStat::new(0, 0).with_times(1_600_000_000_999, 1_700_000_000_500);
        assert_eq!(stat.ctime_secs(), 1_600_000_000);
        assert_eq!(stat.mtime_secs(), 1_700_000_000);
    }

    #[test]
    fn test_negative_timestamps_clamp_to_zero() {
        let stat = NodeStat::new(0, 0).with_times(-5000, -1);
        assert_eq!(stat.ctime_secs(), 0);
        assert_eq!(stat.mtime_secs(), 0);
    }

    #[test]
    fn test_from_wire_stat() {
        let wire = zookeeper::Stat {
            czxid: 1,
            mzxid: 2,
            ctime: 3000,
            mtime: 4000,
            version: 7,
            cversion: 0,
            aversion: 0,
            ephemeral_owner: 0,
            data_length: 12,
            num_children: 3,
            pzxid: 2,
        };
        let stat = NodeStat::from(wire);
        assert_eq!(stat.data_length, 12);
        assert_eq!(stat.num_children, 3);
        assert_eq!(stat.ctime_secs(), 3);
        assert_eq!(stat.mtime_secs(), 4);
        assert_eq!(stat.version, 7);
    }
}
