//! Query-facing adapter over a heap store.
//!
//! Nodes cross into the query engine as [`GraphHandle`]s and every value the
//! engine sees is a [`RelationalValue`]. Field paths, virtual attributes,
//! collection views, and the scalar function library all go through
//! [`resolve`] so that raw store values are converted in exactly one place.

/// Virtual `@` attributes computed from node metadata.
pub mod attrs;
/// Sequence and map views over collection-shaped nodes.
pub mod collections;
/// Scalar functions callable from query text.
pub mod functions;
/// Non-owning node handles.
pub mod handle;
/// Field-path parsing and navigation.
pub mod path;
/// Raw value to relational value conversion.
pub mod resolve;
/// Display text of nodes.
pub mod text;
/// Relational value model.
pub mod value;

pub use attrs::{Applicability, VirtualAttribute, VirtualAttributeCatalog, SIGIL};
pub use collections::{CollectionBridge, CollectionView, MapView, UNKNOWN_SIZE};
pub use functions::{EpochFormatter, FunctionLibrary, FunctionSignature, ValueType};
pub use handle::GraphHandle;
pub use path::{FieldPath, Segment};
pub use resolve::resolve;
pub use value::RelationalValue;
