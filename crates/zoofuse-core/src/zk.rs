//! ZooKeeper wire binding.
//!
//! [`ZkClient`] adapts the blocking `zookeeper` client to [`ZnodeStore`].
//! Paths must already be absolute. The client handle is shared by every
//! FUSE worker thread; the underlying session multiplexes concurrent calls.

use crate::error::StoreResult;
use crate::store::{AclPolicy, NodeMode, NodeStat, ZnodeStore};
use std::time::Duration;
use tracing::{debug, info, warn};
use zookeeper::{Acl, CreateMode, KeeperState, WatchedEvent, Watcher, ZooKeeper};

/// Session timeout negotiated with the ensemble.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Logs session state transitions. Node watches are never registered.
struct SessionWatcher;

impl Watcher for SessionWatcher {
    fn handle(&self, event: WatchedEvent) {
        match event.keeper_state {
            KeeperState::Disconnected | KeeperState::Expired => {
                warn!(state = ?event.keeper_state, "ZooKeeper session state changed");
            }
            _ => debug!(state = ?event.keeper_state, path = ?event.path, "ZooKeeper event"),
        }
    }
}

/// Connected ZooKeeper client.
pub struct ZkClient {
    zk: ZooKeeper,
}

impl std::fmt::Debug for ZkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZkClient").finish_non_exhaustive()
    }
}

impl ZkClient {
    /// Connects to the ensemble given as `host:port[,host:port...]`.
    pub fn connect(endpoint: &str) -> StoreResult<Self> {
        Self::connect_with_timeout(endpoint, SESSION_TIMEOUT)
    }

    /// Connects with a custom session timeout.
    pub fn connect_with_timeout(endpoint: &str, timeout: Duration) -> StoreResult<Self> {
        let zk = ZooKeeper::connect(endpoint, timeout, SessionWatcher)?;
        info!(endpoint = %endpoint, timeout = ?timeout, "Connected to ZooKeeper");
        Ok(Self { zk })
    }
}

fn create_mode(mode: NodeMode) -> CreateMode {
    match mode {
        NodeMode::Persistent => CreateMode::Persistent,
        NodeMode::Ephemeral => CreateMode::Ephemeral,
        NodeMode::PersistentSequential => CreateMode::PersistentSequential,
        NodeMode::EphemeralSequential => CreateMode::EphemeralSequential,
    }
}

fn acl_list(acl: AclPolicy) -> Vec<Acl> {
    match acl {
        AclPolicy::Open => Acl::open_unsafe().clone(),
        AclPolicy::ReadOnly => Acl::read_unsafe().clone(),
        AclPolicy::CreatorAll => Acl::creator_all().clone(),
    }
}

impl ZnodeStore for ZkClient {
    fn exists(&self, path: &str) -> StoreResult<Option<NodeStat>> {
        Ok(self.zk.exists(path, false)?.map(NodeStat::from))
    }

    fn get(&self, path: &str) -> StoreResult<(Vec<u8>, NodeStat)> {
        let (data, stat) = self.zk.get_data(path, false)?;
        Ok((data, stat.into()))
    }

    fn set(&self, path: &str, data: &[u8]) -> StoreResult<NodeStat> {
        // None: match any version
        Ok(self.zk.set_data(path, data.to_vec(), None)?.into())
    }

    fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: NodeMode,
        acl: AclPolicy,
    ) -> StoreResult<String> {
        Ok(self
            .zk
            .create(path, data.to_vec(), acl_list(acl), create_mode(mode))?)
    }

    fn delete(&self, path: &str) -> StoreResult<()> {
        Ok(self.zk.delete(path, None)?)
    }

    fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        Ok(self.zk.get_children(path, false)?)
    }

    fn close(&self) {
        if let Err(e) = self.zk.close() {
            warn!(error = ?e, "Failed to close ZooKeeper session");
        } else {
            info!("ZooKeeper session closed");
        }
    }
}
