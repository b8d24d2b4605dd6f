//! Test double for [`ZnodeStore`].
//!
//! [`RecordingStore`] answers every call from results programmed up front and
//! records the calls it receives. It holds no tree model: a path that was not
//! programmed for an operation answers `NoNode`.
//!
//! ```
//! use zoofuse_core::testing::{RecordingStore, StoreCall};
//! use zoofuse_core::{NodeStat, ZnodeStore};
//!
//! let store = RecordingStore::new().on_exists("/a", Ok(Some(NodeStat::new(2, 0))));
//! assert_eq!(store.exists("/a").unwrap(), Some(NodeStat::new(2, 0)));
//! assert!(store.exists("/b").is_err());
//! assert_eq!(store.calls(), vec![StoreCall::Exists("/a".into()), StoreCall::Exists("/b".into())]);
//! ```

use crate::error::{StoreError, StoreResult};
use crate::store::{AclPolicy, NodeMode, NodeStat, ZnodeStore};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use zookeeper::ZkError;

/// A call received by a [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Exists(String),
    Get(String),
    Set(String, Vec<u8>),
    Create {
        path: String,
        data: Vec<u8>,
        mode: NodeMode,
        acl: AclPolicy,
    },
    Delete(String),
    Children(String),
    Close,
}

/// Programmable, call-recording [`ZnodeStore`].
#[derive(Debug, Default)]
pub struct RecordingStore {
    exists: HashMap<String, StoreResult<Option<NodeStat>>>,
    get: HashMap<String, StoreResult<(Vec<u8>, NodeStat)>>,
    set: HashMap<String, StoreResult<NodeStat>>,
    create: HashMap<String, StoreResult<String>>,
    delete: HashMap<String, StoreResult<()>>,
    children: HashMap<String, StoreResult<Vec<String>>>,
    latency: Duration,
    calls: Mutex<Vec<StoreCall>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

fn no_node<T>() -> StoreResult<T> {
    Err(StoreError::Zk(ZkError::NoNode))
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call by `latency`, so concurrent callers overlap.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub fn on_exists(mut self, path: &str, result: StoreResult<Option<NodeStat>>) -> Self {
        self.exists.insert(path.to_string(), result);
        self
    }

    #[must_use]
    pub fn on_get(mut self, path: &str, result: StoreResult<(Vec<u8>, NodeStat)>) -> Self {
        self.get.insert(path.to_string(), result);
        self
    }

    #[must_use]
    pub fn on_set(mut self, path: &str, result: StoreResult<NodeStat>) -> Self {
        self.set.insert(path.to_string(), result);
        self
    }

    #[must_use]
    pub fn on_create(mut self, path: &str, result: StoreResult<String>) -> Self {
        self.create.insert(path.to_string(), result);
        self
    }

    #[must_use]
    pub fn on_delete(mut self, path: &str, result: StoreResult<()>) -> Self {
        self.delete.insert(path.to_string(), result);
        self
    }

    #[must_use]
    pub fn on_children(mut self, path: &str, result: StoreResult<Vec<String>>) -> Self {
        self.children.insert(path.to_string(), result);
        self
    }

    /// All calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn record<T: Clone>(&self, call: StoreCall, table: &HashMap<String, StoreResult<T>>, path: &str) -> StoreResult<T> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        std::thread::sleep(self.latency);
        let result = table.get(path).cloned().unwrap_or_else(no_node);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl ZnodeStore for RecordingStore {
    fn exists(&self, path: &str) -> StoreResult<Option<NodeStat>> {
        self.record(StoreCall::Exists(path.to_string()), &self.exists, path)
    }

    fn get(&self, path: &str) -> StoreResult<(Vec<u8>, NodeStat)> {
        self.record(StoreCall::Get(path.to_string()), &self.get, path)
    }

    fn set(&self, path: &str, data: &[u8]) -> StoreResult<NodeStat> {
        self.record(StoreCall::Set(path.to_string(), data.to_vec()), &self.set, path)
    }

    fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: NodeMode,
        acl: AclPolicy,
    ) -> StoreResult<String> {
        let call = StoreCall::Create {
            path: path.to_string(),
            data: data.to_vec(),
            mode,
            acl,
        };
        self.record(call, &self.create, path)
    }

    fn delete(&self, path: &str) -> StoreResult<()> {
        self.record(StoreCall::Delete(path.to_string()), &self.delete, path)
    }

    fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        self.record(StoreCall::Children(path.to_string()), &self.children, path)
    }

    fn close(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(StoreCall::Close);
        }
    }
}
