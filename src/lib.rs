//! Heap snapshot adapter for relational queries.
//!
//! A [`store::HeapStore`] exposes the object graph of a captured heap. The
//! [`query`] module turns its nodes into handles and values a query engine can
//! filter, project, and iterate, and [`snapshot`] provides an in-memory store
//! loaded from JSON.

#![warn(missing_docs)]

pub mod config;
pub mod extract;
pub mod query;
pub mod snapshot;
pub mod store;
pub mod types;

pub use config::HeapQlConfig;
pub use query::{
    CollectionBridge, FieldPath, FunctionLibrary, GraphHandle, RelationalValue,
    VirtualAttributeCatalog,
};
pub use snapshot::MemoryHeap;
pub use store::{HeapStore, RawValue};
pub use types::{HeapError, NodeId, NodeKind, Result, StoreError};
