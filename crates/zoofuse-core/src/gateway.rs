//! The translating gateway between the filesystem and the remote tree.
//!
//! Every call resolves its path through a [`PathTranslator`], writes an audit
//! record, and delegates to the wrapped store. Results, including errors, are
//! returned unchanged and nothing is retried.

use crate::error::{StoreError, StoreResult};
use crate::path::PathTranslator;
use crate::store::{AclPolicy, NodeMode, NodeStat, ZnodeStore};
use tracing::debug;

/// Maximum payload size of a single znode (ZooKeeper's default `jute.maxbuffer`).
pub const MAX_ZNODE_DATA: usize = 1_048_576;

/// A [`ZnodeStore`] that accepts mount-relative paths.
#[derive(Debug)]
pub struct TreeGateway<S> {
    inner: S,
    translator: PathTranslator,
}

impl<S: ZnodeStore> TreeGateway<S> {
    /// Wraps `inner`, resolving all paths through `translator`.
    pub fn new(inner: S, translator: PathTranslator) -> Self {
        Self { inner, translator }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: ZnodeStore> ZnodeStore for TreeGateway<S> {
    fn exists(&self, path: &str) -> StoreResult<Option<NodeStat>> {
        let path = self.translator.resolve(path);
        debug!(op = "exists", path = %path);
        self.inner.exists(&path)
    }

    fn get(&self, path: &str) -> StoreResult<(Vec<u8>, NodeStat)> {
        let path = self.translator.resolve(path);
        debug!(op = "get", path = %path);
        self.inner.get(&path)
    }

    fn set(&self, path: &str, data: &[u8]) -> StoreResult<NodeStat> {
        if data.len() > MAX_ZNODE_DATA {
            return Err(StoreError::PayloadTooLarge {
                size: data.len(),
                max: MAX_ZNODE_DATA,
            });
        }
        let path = self.translator.resolve(path);
        debug!(op = "set", path = %path, size = data.len());
        self.inner.set(&path, data)
    }

    fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: NodeMode,
        acl: AclPolicy,
    ) -> StoreResult<String> {
        let path = self.translator.resolve(path);
        debug!(op = "create", path = %path, size = data.len(), ?mode, ?acl);
        self.inner.create(&path, data, mode, acl)
    }

    fn delete(&self, path: &str) -> StoreResult<()> {
        let path = self.translator.resolve(path);
        debug!(op = "delete", path = %path);
        self.inner.delete(&path)
    }

    fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        let path = self.translator.resolve(path);
        debug!(op = "children", path = %path);
        self.inner.children(&path)
    }

    fn close(&self) {
        debug!(op = "close", root = %self.translator.root());
        self.inner.close();
    }
}
