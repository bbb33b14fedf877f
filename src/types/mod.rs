#![forbid(unsafe_code)]

//! Identifiers and error types shared by the store, the adapter layer, and the CLI.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dense identifier of a node inside a heap snapshot.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        NodeId(value)
    }
}

impl From<NodeId> for u64 {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

/// Shape of a node as reported by the store.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Plain object instance.
    Instance,
    /// Object or primitive array.
    Array,
    /// Class object.
    Class,
    /// Class loader instance.
    ClassLoader,
}

impl NodeKind {
    /// Lowercase name used in diagnostics and CLI output.
    pub const fn as_str(self) -> &'static str {
        match self {
            NodeKind::Instance => "instance",
            NodeKind::Array => "array",
            NodeKind::Class => "class",
            NodeKind::ClassLoader => "class_loader",
        }
    }
}

/// Failures raised by a [`crate::store::HeapStore`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Identifier does not name a node in the snapshot.
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    /// Snapshot indices are inconsistent.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// The store backing a handle has been closed.
    #[error("store closed")]
    Closed,
}

/// Result alias for store collaborator calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors surfaced to the query engine as query-execution failures.
///
/// Normal outcomes of heterogeneous data (absent field, non-collection node,
/// non-numeric text) are reported with sentinel values instead; these variants
/// are reserved for inconsistent stores and structurally impossible requests.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HeapError {
    /// No instance, static, or inherited field carries the name.
    #[error("field '{field}' not found on {class}")]
    FieldNotFound {
        /// Requested field name.
        field: String,
        /// Class name of the node that was searched.
        class: String,
    },
    /// Path continues past a value that is not a node.
    #[error("cannot navigate into '{segment}': current value is {found}")]
    InvalidPathSegment {
        /// Segment that could not be applied.
        segment: String,
        /// Shape of the value the segment was applied to.
        found: &'static str,
    },
    /// Path text could not be parsed.
    #[error("malformed field path '{path}': {reason}")]
    MalformedPath {
        /// Offending path text.
        path: String,
        /// Parser diagnostic.
        reason: &'static str,
    },
    /// Raw value has no relational counterpart.
    #[error("unsupported value type: {0}")]
    UnsupportedType(String),
    /// The store could not answer a well-formed request.
    #[error("cannot {op} for {node}: {source}")]
    StoreComputation {
        /// Operation that was attempted.
        op: &'static str,
        /// Node the operation targeted.
        node: NodeId,
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },
    /// Text could not be decoded as the requested literal.
    #[error("invalid {kind} literal '{text}'")]
    InvalidLiteral {
        /// Literal kind, e.g. `integer`.
        kind: &'static str,
        /// Offending text.
        text: String,
    },
    /// Function name is not part of the library.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    /// Function called with the wrong number of arguments.
    #[error("{function} expects {expected} argument(s), got {got}")]
    Arity {
        /// Canonical function name.
        function: &'static str,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        got: usize,
    },
    /// Argument has a type the function cannot accept.
    #[error("{function} argument {index} must be {expected}")]
    ArgumentType {
        /// Canonical function name.
        function: &'static str,
        /// Zero-based argument position.
        index: usize,
        /// Human-readable expected type.
        expected: &'static str,
    },
}

impl HeapError {
    /// Wraps a store failure with the operation and node it occurred on.
    pub fn store(op: &'static str, node: NodeId, source: StoreError) -> Self {
        HeapError::StoreComputation { op, node, source }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            HeapError::FieldNotFound { .. } => "FieldNotFound",
            HeapError::InvalidPathSegment { .. } => "InvalidPathSegment",
            HeapError::MalformedPath { .. } => "MalformedPath",
            HeapError::UnsupportedType(_) => "UnsupportedType",
            HeapError::StoreComputation { .. } => "StoreComputationError",
            HeapError::InvalidLiteral { .. } => "InvalidLiteral",
            HeapError::UnknownFunction(_) => "UnknownFunction",
            HeapError::Arity { .. } => "Arity",
            HeapError::ArgumentType { .. } => "ArgumentType",
        }
    }
}

/// Result alias for adapter operations.
pub type Result<T> = std::result::Result<T, HeapError>;

/// Attaches operation context to store results.
pub(crate) trait StoreContext<T> {
    fn context(self, op: &'static str, node: NodeId) -> Result<T>;
}

impl<T> StoreContext<T> for StoreResult<T> {
    fn context(self, op: &'static str, node: NodeId) -> Result<T> {
        self.map_err(|source| HeapError::store(op, node, source))
    }
}
