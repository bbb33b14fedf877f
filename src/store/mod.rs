//! Contract between the adapter layer and the backing heap snapshot.
//!
//! The adapter never owns node data. Everything it knows about a node comes
//! through [`HeapStore`], which a snapshot implementation provides read-only for
//! the lifetime of a query session.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{NodeId, NodeKind, StoreError, StoreResult};

/// Value stored in a field or array slot of the snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum RawValue {
    /// Null reference.
    Null,
    /// Java `boolean`.
    Bool(bool),
    /// Java `byte`.
    Byte(i8),
    /// Java `char` (UTF-16 code unit).
    Char(u16),
    /// Java `short`.
    Short(i16),
    /// Java `int`.
    Int(i32),
    /// Java `long`.
    Long(i64),
    /// Java `float`.
    Float(f32),
    /// Java `double`.
    Double(f64),
    /// Decoded text carried inline by the snapshot.
    Text(String),
    /// Reference to another node.
    Ref(NodeId),
    /// Integer wider than 64 bits.
    #[serde(skip)]
    Wide(i128),
    /// Value whose type the snapshot could not classify.
    Opaque(String),
}

impl RawValue {
    /// Referenced node, if this value is a non-null reference.
    pub fn as_ref_id(&self) -> Option<NodeId> {
        match self {
            RawValue::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Integer view of integral primitives.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            RawValue::Byte(v) => Some(v as i64),
            RawValue::Char(v) => Some(v as i64),
            RawValue::Short(v) => Some(v as i64),
            RawValue::Int(v) => Some(v as i64),
            RawValue::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Type name used in diagnostics.
    pub fn type_name(&self) -> &str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "boolean",
            RawValue::Byte(_) => "byte",
            RawValue::Char(_) => "char",
            RawValue::Short(_) => "short",
            RawValue::Int(_) => "int",
            RawValue::Long(_) => "long",
            RawValue::Float(_) => "float",
            RawValue::Double(_) => "double",
            RawValue::Text(_) => "text",
            RawValue::Ref(_) => "reference",
            RawValue::Wide(_) => "int128",
            RawValue::Opaque(name) => name,
        }
    }
}

impl From<NodeId> for RawValue {
    fn from(value: NodeId) -> Self {
        RawValue::Ref(value)
    }
}

impl From<Option<NodeId>> for RawValue {
    fn from(value: Option<NodeId>) -> Self {
        value.map_or(RawValue::Null, RawValue::Ref)
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        RawValue::Int(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Long(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_owned())
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => write!(f, "null"),
            RawValue::Bool(v) => write!(f, "{v}"),
            RawValue::Byte(v) => write!(f, "{v}"),
            RawValue::Char(v) => match char::from_u32(*v as u32) {
                Some(c) => write!(f, "{c}"),
                None => write!(f, "\\u{v:04x}"),
            },
            RawValue::Short(v) => write!(f, "{v}"),
            RawValue::Int(v) => write!(f, "{v}"),
            RawValue::Long(v) => write!(f, "{v}"),
            RawValue::Float(v) => write!(f, "{v}"),
            RawValue::Double(v) => write!(f, "{v}"),
            RawValue::Text(v) => write!(f, "{v}"),
            RawValue::Ref(id) => write!(f, "{id}"),
            RawValue::Wide(v) => write!(f, "{v}"),
            RawValue::Opaque(name) => write!(f, "<{name}>"),
        }
    }
}

/// Named field value as stored on an instance or class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Declared field name.
    pub name: String,
    /// Stored value.
    pub value: RawValue,
    /// Class declaring an instance field; `None` means the node's own class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_by: Option<NodeId>,
}

impl Field {
    /// Creates a new field entry.
    pub fn new(name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            declared_by: None,
        }
    }

    /// Marks the field as declared by `class`.
    pub fn declared_by(mut self, class: NodeId) -> Self {
        self.declared_by = Some(class);
        self
    }
}

/// Read-only access to a captured object graph.
///
/// Implementations must be safe to share across concurrently executing
/// queries; none of these calls mutate the snapshot.
pub trait HeapStore: Send + Sync {
    /// Returns the shape of `node`.
    fn node_kind(&self, node: NodeId) -> StoreResult<NodeKind>;

    /// Instance fields of `node`, ordered most-derived declaring class first.
    ///
    /// Fields without [`Field::declared_by`] count as declared by the class of
    /// `node`.
    fn instance_fields(&self, node: NodeId) -> StoreResult<Cow<'_, [Field]>>;

    /// Static fields declared by `class`.
    fn static_fields(&self, class: NodeId) -> StoreResult<Cow<'_, [Field]>>;

    /// Class object of `node`.
    fn class_of(&self, node: NodeId) -> StoreResult<NodeId>;

    /// Superclass of `class`, `None` at the root of the hierarchy.
    fn superclass(&self, class: NodeId) -> StoreResult<Option<NodeId>>;

    /// Defining loader of `class`, `None` for the bootstrap loader.
    fn class_loader(&self, class: NodeId) -> StoreResult<Option<NodeId>>;

    /// Fully qualified name of `class`.
    fn class_name(&self, class: NodeId) -> StoreResult<Cow<'_, str>>;

    /// Bytes occupied by `node` itself.
    fn shallow_size(&self, node: NodeId) -> StoreResult<u64>;

    /// Bytes freed if `node` were collected (dominator subtree sum).
    fn retained_size(&self, node: NodeId) -> StoreResult<u64>;

    /// Immediate dominator of `node`, `None` for roots and unreachable nodes.
    fn immediate_dominator(&self, node: NodeId) -> StoreResult<Option<NodeId>>;

    /// Address of `node` in the captured process.
    fn object_address(&self, node: NodeId) -> StoreResult<u64>;

    /// Element count when `node` is an array.
    fn array_length(&self, node: NodeId) -> StoreResult<Option<u32>>;

    /// Element `index` of array `node`; `None` when out of range or not an array.
    fn array_element(&self, node: NodeId, index: u32) -> StoreResult<Option<RawValue>>;

    /// Looks up a node by its captured address.
    fn find_by_address(&self, address: u64) -> Option<NodeId>;

    /// Nodes designated as garbage-collection roots.
    fn gc_roots(&self) -> Cow<'_, [NodeId]>;

    /// Total number of nodes in the snapshot.
    fn node_count(&self) -> u64;
}

/// Walks a class and its superclasses, most-derived first.
///
/// A walk longer than the store's node count can only come from a cyclic
/// hierarchy and ends with [`StoreError::Corruption`].
pub struct ClassChain<'s> {
    store: &'s dyn HeapStore,
    next: Option<NodeId>,
    steps: u64,
}

impl<'s> ClassChain<'s> {
    /// Starts the walk at `class`.
    pub fn new(store: &'s dyn HeapStore, class: NodeId) -> Self {
        Self {
            store,
            next: Some(class),
            steps: 0,
        }
    }
}

impl Iterator for ClassChain<'_> {
    type Item = StoreResult<NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        if self.steps >= self.store.node_count() {
            return Some(Err(StoreError::Corruption("superclass chain does not terminate")));
        }
        self.steps += 1;
        match self.store.superclass(current) {
            Ok(sup) => {
                self.next = sup;
                Some(Ok(current))
            }
            Err(err) => Some(Err(err)),
        }
    }
}
