//! Errors surfaced by the remote tree gateway.

use thiserror::Error;
use zookeeper::ZkError;

/// Errors returned by [`ZnodeStore`](crate::ZnodeStore) implementations.
///
/// Wire errors are carried unchanged; the only condition this layer adds
/// itself is the payload size bound.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A `set` payload exceeded the znode size bound. Raised before any
    /// network call.
    #[error("payload of {size} bytes exceeds the znode limit of {max} bytes")]
    PayloadTooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// The enforced bound.
        max: usize,
    },

    /// Error reported by the ZooKeeper client.
    #[error("zookeeper: {0:?}")]
    Zk(#[from] ZkError),
}

impl StoreError {
    /// Returns true if the remote node does not exist.
    pub fn is_no_node(&self) -> bool {
        matches!(self, StoreError::Zk(ZkError::NoNode))
    }
}

/// Result type for gateway operations.
pub type StoreResult<T> = Result<T, StoreError>;
