//! Scalar functions exposed to query text.
//!
//! Every function is total over heterogeneous input: a value that is not a
//! node handle yields a documented sentinel (`-1`, empty text, or null)
//! instead of an error. Errors are reserved for stores that cannot answer
//! and for requests that are impossible by construction.

use std::sync::Arc;

use time::format_description::{BorrowedFormatItem, OwnedFormatItem};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::warn;

use crate::config::{ConfigError, FormatSection, HeapQlConfig, DEFAULT_EPOCH_PATTERN};
use crate::extract::ExtractorRegistry;
use crate::types::{HeapError, Result, StoreContext};

use super::collections::{CollectionBridge, UNKNOWN_SIZE};
use super::handle::GraphHandle;
use super::path::{resolve_segment, Segment};
use super::resolve::resolve;
use super::text::{display_text, string_content};
use super::value::RelationalValue;

/// Numeric sentinel for non-node input.
pub const UNKNOWN_NUMBER: i64 = -1;

const BUILTIN_EPOCH: &[BorrowedFormatItem<'static>] =
    format_description!("[day].[month].[year] [hour]:[minute]:[second]");

enum EpochPattern {
    Builtin,
    Custom(OwnedFormatItem),
}

/// Renders millisecond epochs for `convertEpoch`.
pub struct EpochFormatter {
    pattern: EpochPattern,
    offset: UtcOffset,
    wrong_type: String,
}

impl Default for EpochFormatter {
    fn default() -> Self {
        Self {
            pattern: EpochPattern::Builtin,
            offset: UtcOffset::UTC,
            wrong_type: crate::config::DEFAULT_WRONG_TYPE.to_string(),
        }
    }
}

impl EpochFormatter {
    /// Compiles the pattern and offset from configuration.
    pub fn from_config(section: &FormatSection) -> std::result::Result<Self, ConfigError> {
        let pattern = if section.epoch_pattern == DEFAULT_EPOCH_PATTERN {
            EpochPattern::Builtin
        } else {
            let items = time::format_description::parse_owned::<2>(&section.epoch_pattern).map_err(
                |source| ConfigError::InvalidPattern {
                    pattern: section.epoch_pattern.clone(),
                    source,
                },
            )?;
            EpochPattern::Custom(items)
        };
        let offset = UtcOffset::from_whole_seconds(section.utc_offset_minutes.saturating_mul(60))
            .map_err(|_| ConfigError::InvalidOffset {
                minutes: section.utc_offset_minutes,
            })?;
        Ok(Self {
            pattern,
            offset,
            wrong_type: section.wrong_type.clone(),
        })
    }

    /// Formats `millis` since the Unix epoch, `None` if out of range.
    pub fn format_millis(&self, millis: i64) -> Option<String> {
        let nanos = i128::from(millis) * 1_000_000
            + i128::from(self.offset.whole_seconds()) * 1_000_000_000;
        let local = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()?
            .replace_offset(self.offset);
        match &self.pattern {
            EpochPattern::Builtin => local.format(BUILTIN_EPOCH).ok(),
            EpochPattern::Custom(items) => local.format(items).ok(),
        }
    }

    /// Diagnostic returned for input that is not an integer.
    pub fn wrong_type(&self) -> &str {
        &self.wrong_type
    }
}

/// Parameter or result type of a library function.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ValueType {
    /// Any relational value.
    Any,
    /// Integer value.
    Integer,
    /// Text value.
    Text,
    /// Node handle or null.
    Handle,
}

impl ValueType {
    /// Lowercase name shown in signature listings.
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Any => "any",
            ValueType::Integer => "integer",
            ValueType::Text => "text",
            ValueType::Handle => "handle",
        }
    }
}

/// Signature published to the query engine.
#[derive(Copy, Clone, Debug)]
pub struct FunctionSignature {
    /// Canonical name; lookups ignore case.
    pub name: &'static str,
    /// Parameter types in order.
    pub params: &'static [ValueType],
    /// Result type.
    pub returns: ValueType,
}

const fn sig(
    name: &'static str,
    params: &'static [ValueType],
    returns: ValueType,
) -> FunctionSignature {
    FunctionSignature {
        name,
        params,
        returns,
    }
}

use ValueType::{Any, Handle, Integer, Text};

static SIGNATURES: &[FunctionSignature] = &[
    sig("getId", &[Any], Integer),
    sig("getClass", &[Any], Handle),
    sig("getType", &[Any], Text),
    sig("toString", &[Any], Text),
    sig("convertEpoch", &[Any], Text),
    sig("getStringContent", &[Any, Integer], Text),
    sig("introspect", &[Any], Text),
    sig("getByKey", &[Any, Text], Any),
    sig("getSize", &[Any], Integer),
    sig("length", &[Any], Integer),
    sig("getElement", &[Any, Integer], Any),
    sig("shallowSize", &[Any], Integer),
    sig("retainedSize", &[Any], Integer),
    sig("getField", &[Any, Text], Any),
    sig("getAddress", &[Any], Integer),
    sig("toLong", &[Text], Integer),
    sig("getDominator", &[Any], Handle),
];

fn text_arg<'a>(
    sig: &FunctionSignature,
    args: &'a [RelationalValue],
    index: usize,
) -> Result<Option<&'a str>> {
    match &args[index] {
        RelationalValue::Text(text) => Ok(Some(text)),
        RelationalValue::Null => Ok(None),
        _ => Err(HeapError::ArgumentType {
            function: sig.name,
            index,
            expected: "text",
        }),
    }
}

fn int_arg(sig: &FunctionSignature, args: &[RelationalValue], index: usize) -> Result<Option<i64>> {
    match &args[index] {
        RelationalValue::Integer(value) => Ok(Some(*value)),
        RelationalValue::Null => Ok(None),
        _ => Err(HeapError::ArgumentType {
            function: sig.name,
            index,
            expected: "integer",
        }),
    }
}

/// Decodes decimal, `0x`/`#` hexadecimal, or leading-zero octal integers.
fn decode_long(text: &str) -> Option<i64> {
    let (negative, rest) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = if let Some(hex) = rest
        .strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))
        .or_else(|| rest.strip_prefix('#'))
    {
        (16, hex)
    } else if rest.len() > 1 && rest.starts_with('0') {
        (8, &rest[1..])
    } else {
        (10, rest)
    };
    if digits.is_empty() || digits.starts_with(['-', '+']) {
        return None;
    }
    let magnitude = u64::from_str_radix(digits, radix).ok()?;
    if negative {
        0i64.checked_sub_unsigned(magnitude)
    } else {
        i64::try_from(magnitude).ok()
    }
}

/// The query-visible function set.
pub struct FunctionLibrary {
    collections: CollectionBridge,
    epoch: EpochFormatter,
}

impl Default for FunctionLibrary {
    fn default() -> Self {
        Self::new(ExtractorRegistry::builtin(), EpochFormatter::default())
    }
}

impl FunctionLibrary {
    /// Creates a library over `registry` rendering epochs with `epoch`.
    pub fn new(registry: Arc<ExtractorRegistry>, epoch: EpochFormatter) -> Self {
        Self {
            collections: CollectionBridge::new(registry),
            epoch,
        }
    }

    /// Library with the built-in extractors and the configured formatting.
    pub fn from_config(config: &HeapQlConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(
            ExtractorRegistry::builtin(),
            EpochFormatter::from_config(&config.format)?,
        ))
    }

    /// Collection bridge used by `getSize` and `getByKey`.
    pub fn collections(&self) -> &CollectionBridge {
        &self.collections
    }

    /// Signatures of every function [`FunctionLibrary::invoke`] accepts.
    pub fn signatures() -> &'static [FunctionSignature] {
        SIGNATURES
    }

    /// Node identifier, or `-1`.
    pub fn get_id(&self, value: &RelationalValue) -> i64 {
        value
            .as_handle()
            .and_then(|h| i64::try_from(h.node().0).ok())
            .unwrap_or(UNKNOWN_NUMBER)
    }

    /// Class object of the node, or null.
    pub fn get_class(&self, value: &RelationalValue) -> Result<RelationalValue> {
        let Some(handle) = value.as_handle() else {
            return Ok(RelationalValue::Null);
        };
        let node = handle.node();
        let store = handle.store().context("resolve class", node)?;
        let class = store.class_of(node).context("resolve class", node)?;
        Ok(RelationalValue::Handle(handle.sibling(class)))
    }

    /// Fully qualified class name of the node, or empty text.
    pub fn get_type(&self, value: &RelationalValue) -> Result<String> {
        let Some(handle) = value.as_handle() else {
            return Ok(String::new());
        };
        let node = handle.node();
        let store = handle.store().context("resolve type", node)?;
        let class = store.class_of(node).context("resolve type", node)?;
        let name = store.class_name(class).context("resolve type", class)?;
        Ok(name.into_owned())
    }

    /// Display text of the value, null for null.
    pub fn to_text(&self, value: &RelationalValue) -> Result<RelationalValue> {
        Ok(display_text(value)?.map_or(RelationalValue::Null, RelationalValue::Text))
    }

    /// Formats the value's text, read as epoch milliseconds.
    ///
    /// Input that does not parse as a signed 64-bit integer yields the
    /// configured diagnostic text instead of an error.
    pub fn convert_epoch(&self, value: &RelationalValue) -> String {
        let text = match display_text(value) {
            Ok(Some(text)) => text,
            _ => return self.epoch.wrong_type().to_owned(),
        };
        text.parse::<i64>()
            .ok()
            .and_then(|millis| self.epoch.format_millis(millis))
            .unwrap_or_else(|| self.epoch.wrong_type().to_owned())
    }

    /// Contents of a string-like node, at most `limit` characters when
    /// `limit` is non-negative.
    pub fn get_string_content(
        &self,
        value: &RelationalValue,
        limit: i64,
    ) -> Result<RelationalValue> {
        let Some(handle) = value.as_handle() else {
            return Ok(RelationalValue::Text(String::new()));
        };
        let node = handle.node();
        let store = handle.store().context("represent as string", node)?;
        let limit = usize::try_from(limit).ok();
        let text = string_content(&*store, node, limit).context("represent as string", node)?;
        Ok(text.map_or(RelationalValue::Null, RelationalValue::Text))
    }

    /// One-line description of the value's runtime shape.
    pub fn introspect(&self, value: &RelationalValue) -> String {
        match value {
            RelationalValue::Handle(handle) => format!("HeapReference: {handle}"),
            other => format!("Primitive type: {other}"),
        }
    }

    /// Description of an engine-side array argument.
    pub fn introspect_array(&self, values: &[RelationalValue]) -> String {
        format!("Array, length = {}", values.len())
    }

    /// Map value whose key text equals `key`, or null.
    pub fn get_by_key(&self, value: &RelationalValue, key: &str) -> Result<RelationalValue> {
        match value.as_handle() {
            Some(handle) => self.collections.get_by_key(handle, key),
            None => Ok(RelationalValue::Null),
        }
    }

    /// Collection size, or `-1` when unknown or not a collection.
    pub fn get_size(&self, value: &RelationalValue) -> Result<i64> {
        match value.as_handle() {
            Some(handle) => self.collections.size(handle),
            None => Ok(UNKNOWN_SIZE),
        }
    }

    /// Array length, or `-1` for anything that is not an array.
    pub fn length(&self, value: &RelationalValue) -> Result<i64> {
        let Some(handle) = value.as_handle() else {
            return Ok(UNKNOWN_NUMBER);
        };
        let node = handle.node();
        let store = handle.store().context("read array length", node)?;
        let len = store.array_length(node).context("read array length", node)?;
        Ok(len.map_or(UNKNOWN_NUMBER, i64::from))
    }

    /// Array element at `index`, or null when out of range or not an array.
    pub fn get_element(&self, value: &RelationalValue, index: i64) -> Result<RelationalValue> {
        let (Some(handle), Ok(index)) = (value.as_handle(), u32::try_from(index)) else {
            return Ok(RelationalValue::Null);
        };
        let node = handle.node();
        let store = handle.store().context("read array element", node)?;
        match store.array_element(node, index).context("read array element", node)? {
            Some(raw) => resolve(handle, raw),
            None => Ok(RelationalValue::Null),
        }
    }

    fn size_of(
        &self,
        value: &RelationalValue,
        read: impl Fn(&GraphHandle) -> Result<u64>,
    ) -> Result<i64> {
        let Some(handle) = value.as_handle() else {
            return Ok(UNKNOWN_NUMBER);
        };
        Ok(i64::try_from(read(handle)?).unwrap_or(i64::MAX))
    }

    /// Bytes occupied by the node itself, or `-1`.
    pub fn shallow_size(&self, value: &RelationalValue) -> Result<i64> {
        self.size_of(value, |h| {
            let node = h.node();
            let store = h.store().context("calculate shallow size", node)?;
            store.shallow_size(node).context("calculate shallow size", node)
        })
    }

    /// Bytes retained by the node, or `-1`.
    pub fn retained_size(&self, value: &RelationalValue) -> Result<i64> {
        self.size_of(value, |h| {
            let node = h.node();
            let store = h.store().context("calculate retained size", node)?;
            store.retained_size(node).context("calculate retained size", node)
        })
    }

    /// Single field or virtual attribute; null when absent.
    pub fn get_field(&self, value: &RelationalValue, name: &str) -> Result<RelationalValue> {
        let Some(handle) = value.as_handle() else {
            return Ok(RelationalValue::Null);
        };
        if name.is_empty() {
            return Ok(RelationalValue::Null);
        }
        match resolve_segment(handle, &Segment::new(name)) {
            Err(HeapError::FieldNotFound { .. }) => Ok(RelationalValue::Null),
            other => other,
        }
    }

    /// Captured address of the node, or `-1`.
    pub fn get_address(&self, value: &RelationalValue) -> Result<i64> {
        let Some(handle) = value.as_handle() else {
            return Ok(UNKNOWN_NUMBER);
        };
        let node = handle.node();
        let store = handle.store().context("read object address", node)?;
        let address = store.object_address(node).context("read object address", node)?;
        // Addresses are reported as signed 64-bit values.
        Ok(address as i64)
    }

    /// Decodes an integer literal (decimal, `0x`/`#` hex, leading-zero octal).
    pub fn to_long(&self, text: &str) -> Result<i64> {
        decode_long(text).ok_or_else(|| HeapError::InvalidLiteral {
            kind: "integer",
            text: text.to_owned(),
        })
    }

    /// Immediate dominator of the node, null for roots and unreachable nodes.
    pub fn get_dominator(&self, value: &RelationalValue) -> Result<RelationalValue> {
        let Some(handle) = value.as_handle() else {
            return Ok(RelationalValue::Null);
        };
        let node = handle.node();
        let store = handle.store().context("obtain immediate dominator", node)?;
        let dominator = store
            .immediate_dominator(node)
            .context("obtain immediate dominator", node)?;
        Ok(dominator.map(|d| handle.sibling(d)).into())
    }

    /// Calls the function named `name` (case-insensitive) with `args`.
    pub fn invoke(&self, name: &str, args: &[RelationalValue]) -> Result<RelationalValue> {
        let sig = SIGNATURES
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| HeapError::UnknownFunction(name.to_owned()))?;
        if args.len() != sig.params.len() {
            return Err(HeapError::Arity {
                function: sig.name,
                expected: sig.params.len(),
                got: args.len(),
            });
        }
        let result = self.dispatch(sig, args);
        if let Err(err @ HeapError::StoreComputation { .. }) = &result {
            warn!(function = sig.name, error = %err, "query.store_failure");
        }
        result
    }

    fn dispatch(
        &self,
        sig: &FunctionSignature,
        args: &[RelationalValue],
    ) -> Result<RelationalValue> {
        let value = &args[0];
        Ok(match sig.name {
            "getId" => self.get_id(value).into(),
            "getClass" => self.get_class(value)?,
            "getType" => self.get_type(value)?.into(),
            "toString" => self.to_text(value)?,
            "convertEpoch" => self.convert_epoch(value).into(),
            "getStringContent" => match int_arg(sig, args, 1)? {
                Some(limit) => self.get_string_content(value, limit)?,
                None => RelationalValue::Null,
            },
            "introspect" => self.introspect(value).into(),
            "getByKey" => match text_arg(sig, args, 1)? {
                Some(key) => self.get_by_key(value, key)?,
                None => RelationalValue::Null,
            },
            "getSize" => self.get_size(value)?.into(),
            "length" => self.length(value)?.into(),
            "getElement" => match int_arg(sig, args, 1)? {
                Some(index) => self.get_element(value, index)?,
                None => RelationalValue::Null,
            },
            "shallowSize" => self.shallow_size(value)?.into(),
            "retainedSize" => self.retained_size(value)?.into(),
            "getField" => match text_arg(sig, args, 1)? {
                Some(name) => self.get_field(value, name)?,
                None => RelationalValue::Null,
            },
            "getAddress" => self.get_address(value)?.into(),
            "toLong" => match text_arg(sig, args, 0)? {
                Some(text) => self.to_long(text)?.into(),
                None => RelationalValue::Null,
            },
            "getDominator" => self.get_dominator(value)?,
            other => return Err(HeapError::UnknownFunction(other.to_owned())),
        })
    }
}
