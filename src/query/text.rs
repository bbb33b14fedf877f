//! Display text of nodes: string contents, boxed primitives, and the
//! `class@address` fallback.

use crate::extract::read_field;
use crate::store::{HeapStore, RawValue};
use crate::types::{NodeId, Result, StoreContext, StoreResult};

use super::handle::GraphHandle;
use super::value::RelationalValue;

const STRING_CLASSES: &[&str] = &[
    "java.lang.String",
    "java.lang.StringBuilder",
    "java.lang.StringBuffer",
];

const BOXED_CLASSES: &[&str] = &[
    "java.lang.Boolean",
    "java.lang.Byte",
    "java.lang.Character",
    "java.lang.Short",
    "java.lang.Integer",
    "java.lang.Long",
    "java.lang.Float",
    "java.lang.Double",
];

const LATIN1: i64 = 0;

/// Decodes the character content of a string-like node.
///
/// Returns `None` when `node` is not a `String`, `StringBuilder`, or
/// `StringBuffer`. `limit` bounds the number of characters read.
pub fn string_content(
    store: &dyn HeapStore,
    node: NodeId,
    limit: Option<usize>,
) -> StoreResult<Option<String>> {
    let class = store.class_of(node)?;
    let class_name = store.class_name(class)?;
    if !STRING_CLASSES.contains(&&*class_name) {
        return Ok(None);
    }
    let value = match read_field(store, node, "value")? {
        Some(RawValue::Text(text)) => {
            let text = match limit {
                Some(limit) => text.chars().take(limit).collect(),
                None => text,
            };
            return Ok(Some(text));
        }
        Some(RawValue::Ref(array)) => array,
        _ => return Ok(Some(String::new())),
    };
    let len = store.array_length(value)?.unwrap_or(0);
    let coder = read_field(store, node, "coder")?
        .and_then(|v| v.as_i64())
        .unwrap_or(LATIN1);

    let mut units: Vec<u16> = Vec::new();
    let mut index = 0u32;
    let mut pending_low: Option<u8> = None;
    while index < len {
        match store.array_element(value, index)? {
            Some(RawValue::Char(c)) => units.push(c),
            Some(RawValue::Byte(b)) if coder == LATIN1 => units.push(u16::from(b as u8)),
            Some(RawValue::Byte(b)) => match pending_low.take() {
                None => pending_low = Some(b as u8),
                Some(low) => units.push(u16::from_le_bytes([low, b as u8])),
            },
            _ => {}
        }
        index += 1;
    }
    if let Some(count) = read_field(store, node, "count")?.and_then(|v| v.as_i64()) {
        units.truncate(usize::try_from(count).unwrap_or(0));
    }
    let text: String = char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    Ok(Some(text))
}

fn boxed_content(store: &dyn HeapStore, node: NodeId) -> StoreResult<Option<RawValue>> {
    let class = store.class_of(node)?;
    let class_name = store.class_name(class)?;
    if !BOXED_CLASSES.contains(&&*class_name) {
        return Ok(None);
    }
    read_field(store, node, "value")
}

/// Text form of a node as shown to users and compared by `getByKey`.
pub fn handle_text(handle: &GraphHandle) -> Result<String> {
    let node = handle.node();
    let store = handle.store().context("render node", node)?;
    if let Some(text) = string_content(&*store, node, None).context("render node", node)? {
        return Ok(text);
    }
    if let Some(raw) = boxed_content(&*store, node).context("render node", node)? {
        return Ok(raw.to_string());
    }
    Ok(handle.to_string())
}

/// Text form of any relational value; `None` for null.
pub fn display_text(value: &RelationalValue) -> Result<Option<String>> {
    match value {
        RelationalValue::Null => Ok(None),
        RelationalValue::Handle(handle) => handle_text(handle).map(Some),
        other => Ok(Some(other.to_string())),
    }
}
