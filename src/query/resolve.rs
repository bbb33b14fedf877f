//! Single entry point turning raw snapshot values into relational values.

use crate::store::RawValue;
use crate::types::{HeapError, Result};

use super::handle::GraphHandle;
use super::value::RelationalValue;

/// Converts `raw`, read from a node of `owner`'s store, into a relational value.
///
/// Null references become [`RelationalValue::Null`], primitives keep their
/// full precision, and references become handles into the same store.
/// Integers wider than 64 bits and unclassified values are rejected.
pub fn resolve(owner: &GraphHandle, raw: RawValue) -> Result<RelationalValue> {
    Ok(match raw {
        RawValue::Null => RelationalValue::Null,
        RawValue::Bool(v) => RelationalValue::Boolean(v),
        RawValue::Byte(v) => RelationalValue::Integer(v.into()),
        RawValue::Short(v) => RelationalValue::Integer(v.into()),
        RawValue::Int(v) => RelationalValue::Integer(v.into()),
        RawValue::Long(v) => RelationalValue::Integer(v),
        RawValue::Char(v) => RelationalValue::Text(String::from_utf16_lossy(&[v])),
        RawValue::Float(v) => RelationalValue::Real(v.into()),
        RawValue::Double(v) => RelationalValue::Real(v),
        RawValue::Text(v) => RelationalValue::Text(v),
        RawValue::Ref(node) => RelationalValue::Handle(owner.sibling(node)),
        RawValue::Wide(_) => return Err(HeapError::UnsupportedType("int128".into())),
        RawValue::Opaque(name) => return Err(HeapError::UnsupportedType(name)),
    })
}
