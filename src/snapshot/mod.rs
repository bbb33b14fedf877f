//! In-memory heap snapshot implementing [`HeapStore`].
//!
//! Nodes are stored densely by [`NodeId`]. The builder resolves references,
//! validates class links, and computes the dominator tree once; after that the
//! snapshot is immutable and can be shared by any number of concurrent queries.

mod dominators;
mod file;

use std::borrow::Cow;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{Field, HeapStore, RawValue};
use crate::types::{NodeId, NodeKind, StoreError, StoreResult};

pub use file::{SnapshotError, SnapshotFile};

/// Base address assigned to nodes that do not carry one.
pub const DEFAULT_BASE_ADDRESS: u64 = 0x1000_0000;
/// Object header footprint used when a node omits its shallow size.
pub const DEFAULT_HEADER_BYTES: u64 = 16;
/// Per-slot footprint used when a node omits its shallow size.
pub const DEFAULT_SLOT_BYTES: u64 = 8;

/// Description of a single node, as written in snapshot files.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSpec {
    /// Class object.
    Class {
        /// Fully qualified name.
        name: String,
        /// Superclass, absent at the hierarchy root.
        #[serde(default)]
        superclass: Option<NodeId>,
        /// Defining loader, absent for the bootstrap loader.
        #[serde(default)]
        loader: Option<NodeId>,
        /// Static fields.
        #[serde(default)]
        statics: Vec<Field>,
        /// Captured address.
        #[serde(default)]
        address: Option<u64>,
        /// Own footprint in bytes.
        #[serde(default)]
        shallow: Option<u64>,
    },
    /// Object instance.
    Instance {
        /// Class object of the instance.
        class: NodeId,
        /// Instance fields, most-derived class first.
        #[serde(default)]
        fields: Vec<Field>,
        /// Captured address.
        #[serde(default)]
        address: Option<u64>,
        /// Own footprint in bytes.
        #[serde(default)]
        shallow: Option<u64>,
    },
    /// Class loader instance.
    ClassLoader {
        /// Class object of the loader.
        class: NodeId,
        /// Instance fields.
        #[serde(default)]
        fields: Vec<Field>,
        /// Captured address.
        #[serde(default)]
        address: Option<u64>,
        /// Own footprint in bytes.
        #[serde(default)]
        shallow: Option<u64>,
    },
    /// Object or primitive array.
    Array {
        /// Array class, e.g. `java.lang.Object[]`.
        class: NodeId,
        /// Slot values.
        #[serde(default)]
        elements: Vec<RawValue>,
        /// Captured address.
        #[serde(default)]
        address: Option<u64>,
        /// Own footprint in bytes.
        #[serde(default)]
        shallow: Option<u64>,
    },
}

#[derive(Debug)]
struct NodeRecord {
    kind: NodeKind,
    class: NodeId,
    address: u64,
    shallow: u64,
    name: Option<String>,
    superclass: Option<NodeId>,
    loader: Option<NodeId>,
    fields: Vec<Field>,
    elements: Vec<RawValue>,
}

impl NodeRecord {
    fn references(&self, self_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let class = (self.class != self_id).then_some(self.class);
        class
            .into_iter()
            .chain(self.superclass)
            .chain(self.loader)
            .chain(self.fields.iter().filter_map(|f| f.value.as_ref_id()))
            .chain(self.elements.iter().filter_map(RawValue::as_ref_id))
    }
}

/// Incrementally assembles a [`MemoryHeap`].
#[derive(Debug, Default)]
pub struct HeapBuilder {
    specs: Vec<NodeSpec>,
    roots: Vec<NodeId>,
}

impl HeapBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an arbitrary node description and returns its identifier.
    pub fn push(&mut self, spec: NodeSpec) -> NodeId {
        let id = NodeId(self.specs.len() as u64);
        self.specs.push(spec);
        id
    }

    /// Adds a class with the given superclass and static fields.
    pub fn add_class(
        &mut self,
        name: impl Into<String>,
        superclass: Option<NodeId>,
        statics: Vec<Field>,
    ) -> NodeId {
        self.push(NodeSpec::Class {
            name: name.into(),
            superclass,
            loader: None,
            statics,
            address: None,
            shallow: None,
        })
    }

    /// Adds a class defined by a specific class loader.
    pub fn add_class_with_loader(
        &mut self,
        name: impl Into<String>,
        superclass: Option<NodeId>,
        loader: NodeId,
    ) -> NodeId {
        self.push(NodeSpec::Class {
            name: name.into(),
            superclass,
            loader: Some(loader),
            statics: Vec::new(),
            address: None,
            shallow: None,
        })
    }

    /// Adds an instance of `class`.
    pub fn add_instance(&mut self, class: NodeId, fields: Vec<Field>) -> NodeId {
        self.push(NodeSpec::Instance {
            class,
            fields,
            address: None,
            shallow: None,
        })
    }

    /// Adds a class loader instance of `class`.
    pub fn add_loader(&mut self, class: NodeId) -> NodeId {
        self.push(NodeSpec::ClassLoader {
            class,
            fields: Vec::new(),
            address: None,
            shallow: None,
        })
    }

    /// Adds an array of `class` holding `elements`.
    pub fn add_array(&mut self, class: NodeId, elements: Vec<RawValue>) -> NodeId {
        self.push(NodeSpec::Array {
            class,
            elements,
            address: None,
            shallow: None,
        })
    }

    /// Overrides the shallow size of an already added node.
    pub fn set_shallow(&mut self, node: NodeId, bytes: u64) {
        if let Some(spec) = self.specs.get_mut(node.0 as usize) {
            match spec {
                NodeSpec::Class { shallow, .. }
                | NodeSpec::Instance { shallow, .. }
                | NodeSpec::ClassLoader { shallow, .. }
                | NodeSpec::Array { shallow, .. } => *shallow = Some(bytes),
            }
        }
    }

    /// Marks `node` as a garbage-collection root.
    pub fn add_root(&mut self, node: NodeId) {
        self.roots.push(node);
    }

    /// Identifier the next added node will receive.
    pub fn next_id(&self) -> NodeId {
        NodeId(self.specs.len() as u64)
    }

    /// Validates references and computes the dominator tree.
    pub fn build(self) -> Result<MemoryHeap, SnapshotError> {
        MemoryHeap::from_parts(self.specs, self.roots)
    }
}

/// Immutable in-memory heap snapshot.
#[derive(Debug)]
pub struct MemoryHeap {
    nodes: Vec<NodeRecord>,
    roots: Vec<NodeId>,
    by_address: FxHashMap<u64, NodeId>,
    idom: Vec<Option<NodeId>>,
    retained: Vec<u64>,
}

impl MemoryHeap {
    /// Starts a new builder.
    pub fn builder() -> HeapBuilder {
        HeapBuilder::new()
    }

    pub(crate) fn from_parts(
        specs: Vec<NodeSpec>,
        roots: Vec<NodeId>,
    ) -> Result<Self, SnapshotError> {
        let count = specs.len() as u64;
        // Dominator indices are u32 with one slot for the synthetic root.
        if count >= u64::from(u32::MAX) {
            return Err(SnapshotError::Invalid(format!(
                "{count} nodes exceed the supported snapshot size"
            )));
        }
        let class_class = specs.iter().position(|spec| {
            matches!(spec, NodeSpec::Class { name, .. } if name == "java.lang.Class")
        });

        let mut nodes = Vec::with_capacity(specs.len());
        for (idx, spec) in specs.into_iter().enumerate() {
            let id = NodeId(idx as u64);
            let default_address = DEFAULT_BASE_ADDRESS + (idx as u64) * 0x10;
            let record = match spec {
                NodeSpec::Class {
                    name,
                    superclass,
                    loader,
                    statics,
                    address,
                    shallow,
                } => NodeRecord {
                    kind: NodeKind::Class,
                    class: class_class.map_or(id, |c| NodeId(c as u64)),
                    address: address.unwrap_or(default_address),
                    shallow: shallow.unwrap_or(
                        DEFAULT_HEADER_BYTES * 4 + DEFAULT_SLOT_BYTES * statics.len() as u64,
                    ),
                    name: Some(name),
                    superclass,
                    loader,
                    fields: statics,
                    elements: Vec::new(),
                },
                NodeSpec::Instance {
                    class,
                    fields,
                    address,
                    shallow,
                } => NodeRecord {
                    kind: NodeKind::Instance,
                    class,
                    address: address.unwrap_or(default_address),
                    shallow: shallow.unwrap_or(
                        DEFAULT_HEADER_BYTES + DEFAULT_SLOT_BYTES * fields.len() as u64,
                    ),
                    name: None,
                    superclass: None,
                    loader: None,
                    fields,
                    elements: Vec::new(),
                },
                NodeSpec::ClassLoader {
                    class,
                    fields,
                    address,
                    shallow,
                } => NodeRecord {
                    kind: NodeKind::ClassLoader,
                    class,
                    address: address.unwrap_or(default_address),
                    shallow: shallow.unwrap_or(
                        DEFAULT_HEADER_BYTES + DEFAULT_SLOT_BYTES * fields.len() as u64,
                    ),
                    name: None,
                    superclass: None,
                    loader: None,
                    fields,
                    elements: Vec::new(),
                },
                NodeSpec::Array {
                    class,
                    elements,
                    address,
                    shallow,
                } => NodeRecord {
                    kind: NodeKind::Array,
                    class,
                    address: address.unwrap_or(default_address),
                    shallow: shallow.unwrap_or(
                        DEFAULT_HEADER_BYTES + DEFAULT_SLOT_BYTES * elements.len() as u64,
                    ),
                    name: None,
                    superclass: None,
                    loader: None,
                    fields: Vec::new(),
                    elements,
                },
            };
            nodes.push(record);
        }

        for (idx, node) in nodes.iter().enumerate() {
            let id = NodeId(idx as u64);
            if let Some(bad) = node.references(id).find(|r| r.0 >= count) {
                return Err(SnapshotError::Invalid(format!(
                    "node {id} references missing node {bad}"
                )));
            }
            if nodes[node.class.0 as usize].kind != NodeKind::Class {
                return Err(SnapshotError::Invalid(format!(
                    "class of node {id} is not a class node"
                )));
            }
            if let Some(sup) = node.superclass {
                if nodes[sup.0 as usize].kind != NodeKind::Class {
                    return Err(SnapshotError::Invalid(format!(
                        "superclass of node {id} is not a class node"
                    )));
                }
            }
            let foreign = node.fields.iter().filter_map(|f| f.declared_by).find(|c| {
                nodes
                    .get(c.0 as usize)
                    .map_or(true, |r| r.kind != NodeKind::Class)
            });
            if let Some(bad) = foreign {
                return Err(SnapshotError::Invalid(format!(
                    "field of node {id} is declared by {bad}, which is not a class node"
                )));
            }
        }
        check_hierarchy(&nodes)?;
        if let Some(bad) = roots.iter().find(|r| r.0 >= count) {
            return Err(SnapshotError::Invalid(format!("GC root {bad} does not exist")));
        }

        let mut by_address = FxHashMap::default();
        for (idx, node) in nodes.iter().enumerate() {
            if by_address.insert(node.address, NodeId(idx as u64)).is_some() {
                return Err(SnapshotError::Invalid(format!(
                    "duplicate address {:#x}",
                    node.address
                )));
            }
        }

        let edges: Vec<Vec<u32>> = nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| {
                node.references(NodeId(idx as u64))
                    .map(|r| r.0 as u32)
                    .collect()
            })
            .collect();
        let root_idx: Vec<u32> = roots.iter().map(|r| r.0 as u32).collect();
        let shallow: Vec<u64> = nodes.iter().map(|n| n.shallow).collect();
        let tree = dominators::compute(&edges, &root_idx, &shallow);
        debug!(
            nodes = nodes.len(),
            roots = roots.len(),
            reachable = tree.reachable,
            "snapshot.dominators_computed"
        );

        Ok(Self {
            nodes,
            roots,
            by_address,
            idom: tree
                .idom
                .into_iter()
                .map(|d| d.map(|v| NodeId(v as u64)))
                .collect(),
            retained: tree.retained,
        })
    }

    fn record(&self, node: NodeId) -> StoreResult<&NodeRecord> {
        self.nodes
            .get(node.0 as usize)
            .ok_or(StoreError::NodeNotFound(node))
    }

    fn class_record(&self, class: NodeId) -> StoreResult<&NodeRecord> {
        let record = self.record(class)?;
        if record.kind != NodeKind::Class {
            return Err(StoreError::Corruption("expected a class node"));
        }
        Ok(record)
    }

    /// Iterates over every node identifier in the snapshot.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u64).map(NodeId)
    }

    /// Counts nodes of each kind.
    pub fn kind_counts(&self) -> FxHashMap<NodeKind, usize> {
        let mut counts = FxHashMap::default();
        for node in &self.nodes {
            *counts.entry(node.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Finds the first class with the given fully qualified name.
    pub fn class_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.kind == NodeKind::Class && n.name.as_deref() == Some(name))
            .map(|idx| NodeId(idx as u64))
    }
}

impl HeapStore for MemoryHeap {
    fn node_kind(&self, node: NodeId) -> StoreResult<NodeKind> {
        Ok(self.record(node)?.kind)
    }

    fn instance_fields(&self, node: NodeId) -> StoreResult<Cow<'_, [Field]>> {
        let record = self.record(node)?;
        match record.kind {
            NodeKind::Instance | NodeKind::ClassLoader => Ok(Cow::Borrowed(&record.fields)),
            NodeKind::Class | NodeKind::Array => Ok(Cow::Borrowed(&[])),
        }
    }

    fn static_fields(&self, class: NodeId) -> StoreResult<Cow<'_, [Field]>> {
        Ok(Cow::Borrowed(&self.class_record(class)?.fields))
    }

    fn class_of(&self, node: NodeId) -> StoreResult<NodeId> {
        Ok(self.record(node)?.class)
    }

    fn superclass(&self, class: NodeId) -> StoreResult<Option<NodeId>> {
        Ok(self.class_record(class)?.superclass)
    }

    fn class_loader(&self, class: NodeId) -> StoreResult<Option<NodeId>> {
        Ok(self.class_record(class)?.loader)
    }

    fn class_name(&self, class: NodeId) -> StoreResult<Cow<'_, str>> {
        self.class_record(class)?
            .name
            .as_deref()
            .map(Cow::Borrowed)
            .ok_or(StoreError::Corruption("class without a name"))
    }

    fn shallow_size(&self, node: NodeId) -> StoreResult<u64> {
        Ok(self.record(node)?.shallow)
    }

    fn retained_size(&self, node: NodeId) -> StoreResult<u64> {
        self.retained
            .get(node.0 as usize)
            .copied()
            .ok_or(StoreError::NodeNotFound(node))
    }

    fn immediate_dominator(&self, node: NodeId) -> StoreResult<Option<NodeId>> {
        self.idom
            .get(node.0 as usize)
            .copied()
            .ok_or(StoreError::NodeNotFound(node))
    }

    fn object_address(&self, node: NodeId) -> StoreResult<u64> {
        Ok(self.record(node)?.address)
    }

    fn array_length(&self, node: NodeId) -> StoreResult<Option<u32>> {
        let record = self.record(node)?;
        Ok((record.kind == NodeKind::Array).then_some(record.elements.len() as u32))
    }

    fn array_element(&self, node: NodeId, index: u32) -> StoreResult<Option<RawValue>> {
        let record = self.record(node)?;
        if record.kind != NodeKind::Array {
            return Ok(None);
        }
        Ok(record.elements.get(index as usize).cloned())
    }

    fn find_by_address(&self, address: u64) -> Option<NodeId> {
        self.by_address.get(&address).copied()
    }

    fn gc_roots(&self) -> Cow<'_, [NodeId]> {
        Cow::Borrowed(&self.roots)
    }

    fn node_count(&self) -> u64 {
        self.nodes.len() as u64
    }
}

/// Rejects superclass chains that loop back on themselves.
fn check_hierarchy(nodes: &[NodeRecord]) -> Result<(), SnapshotError> {
    // 0 unvisited, 1 on the current walk, 2 known to terminate.
    let mut state = vec![0u8; nodes.len()];
    let mut walk = Vec::new();
    for start in 0..nodes.len() {
        let mut current = Some(start);
        while let Some(idx) = current {
            match state[idx] {
                2 => break,
                1 => {
                    return Err(SnapshotError::Invalid(format!(
                        "superclass chain of node {} is cyclic",
                        NodeId(idx as u64)
                    )));
                }
                _ => {}
            }
            state[idx] = 1;
            walk.push(idx);
            current = nodes[idx].superclass.map(|sup| sup.0 as usize);
        }
        for idx in walk.drain(..) {
            state[idx] = 2;
        }
    }
    Ok(())
}
