//! Node handles crossing the adapter boundary.

use std::fmt;
use std::sync::{Arc, Weak};

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::store::HeapStore;
use crate::types::{NodeId, StoreError, StoreResult};

/// Non-owning reference to one node of an open store.
///
/// The store owns node lifetime; once every strong reference to it is dropped
/// the handle stops resolving and store calls fail with [`StoreError::Closed`].
/// Two handles are equal when they name the same node of the same open store.
#[derive(Clone)]
pub struct GraphHandle {
    store: Weak<dyn HeapStore>,
    node: NodeId,
}

impl GraphHandle {
    /// Creates a handle without checking that `node` exists.
    pub fn new(store: &Arc<dyn HeapStore>, node: NodeId) -> Self {
        Self {
            store: Arc::downgrade(store),
            node,
        }
    }

    /// Creates a handle after confirming the store knows `node`.
    pub fn try_new(store: &Arc<dyn HeapStore>, node: NodeId) -> StoreResult<Self> {
        store.node_kind(node)?;
        Ok(Self::new(store, node))
    }

    /// Identifier of the referenced node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Handle to another node of the same store.
    pub fn sibling(&self, node: NodeId) -> Self {
        Self {
            store: Weak::clone(&self.store),
            node,
        }
    }

    /// Backing store, or [`StoreError::Closed`] once it has been dropped.
    pub fn store(&self) -> StoreResult<Arc<dyn HeapStore>> {
        self.store.upgrade().ok_or(StoreError::Closed)
    }

    /// Whether the backing store is still open.
    pub fn is_open(&self) -> bool {
        self.store.strong_count() > 0
    }

    /// Whether both handles point into the same store.
    pub fn same_store(&self, other: &GraphHandle) -> bool {
        Weak::ptr_eq(&self.store, &other.store)
    }
}

impl PartialEq for GraphHandle {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.same_store(other) && self.is_open()
    }
}

impl fmt::Debug for GraphHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GraphHandle({})", self.node)
    }
}

impl fmt::Display for GraphHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(store) = self.store() else {
            return write!(f, "<closed>{}", self.node);
        };
        let class = store
            .class_of(self.node)
            .and_then(|class| store.class_name(class).map(|name| name.into_owned()));
        match (class, store.object_address(self.node)) {
            (Ok(class), Ok(address)) => write!(f, "{class}@{address:#x}"),
            _ => write!(f, "<unknown>{}", self.node),
        }
    }
}

impl Serialize for GraphHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let store = self.store().ok();
        let address = store
            .as_ref()
            .and_then(|s| s.object_address(self.node).ok())
            .map(|a| format!("{a:#x}"));
        let class = store.as_ref().and_then(|s| {
            s.class_of(self.node)
                .and_then(|c| s.class_name(c).map(|n| n.into_owned()))
                .ok()
        });
        let mut state = serializer.serialize_struct("GraphHandle", 3)?;
        state.serialize_field("node", &self.node)?;
        state.serialize_field("address", &address)?;
        state.serialize_field("class", &class)?;
        state.end()
    }
}
