//! Field-path parsing and navigation.
//!
//! A path such as `this['owner.name']` or `owner.@retained` is parsed once per
//! query expression into a [`FieldPath`] and then evaluated against every row.
//! Each segment is resolved in a fixed order: virtual attributes (sigil
//! prefix) first, then instance fields, then static fields of the class and
//! of each superclass in turn.

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;
use tracing::trace;

use crate::store::{ClassChain, HeapStore};
use crate::types::{HeapError, NodeKind, Result, StoreContext};

use super::attrs::{VirtualAttributeCatalog, SIGIL};
use super::handle::GraphHandle;
use super::resolve::resolve;
use super::value::RelationalValue;

/// One step of a field path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Segment {
    /// Declared field name.
    Field(String),
    /// Sigil-prefixed virtual attribute name, sigil included.
    Virtual(String),
}

impl Segment {
    /// Classifies `name` by its sigil.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.starts_with(SIGIL) {
            Segment::Virtual(name)
        } else {
            Segment::Field(name)
        }
    }

    /// Segment text as written.
    pub fn name(&self) -> &str {
        match self {
            Segment::Field(name) | Segment::Virtual(name) => name,
        }
    }
}

/// Parsed field path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldPath {
    segments: SmallVec<[Segment; 4]>,
}

fn malformed(path: &str, reason: &'static str) -> HeapError {
    HeapError::MalformedPath {
        path: path.to_owned(),
        reason,
    }
}

impl FieldPath {
    /// Parses dotted and bracketed path text.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(malformed(text, "empty path"));
        }
        let mut rest = trimmed;
        if let Some(after) = rest.strip_prefix("this") {
            if after.is_empty() || after.starts_with('[') {
                rest = after;
            } else if let Some(after_dot) = after.strip_prefix('.') {
                if after_dot.is_empty() {
                    return Err(malformed(text, "path ends with '.'"));
                }
                rest = after_dot;
            }
        }

        let mut segments = SmallVec::new();
        while !rest.is_empty() {
            if let Some(inner) = rest.strip_prefix('[') {
                let quote = inner
                    .chars()
                    .next()
                    .filter(|c| *c == '\'' || *c == '"')
                    .ok_or_else(|| malformed(text, "expected quoted name after '['"))?;
                let body = &inner[1..];
                let close = body
                    .find(quote)
                    .ok_or_else(|| malformed(text, "unterminated quote"))?;
                for piece in body[..close].split('.') {
                    if piece.is_empty() {
                        return Err(malformed(text, "empty segment"));
                    }
                    segments.push(Segment::new(piece));
                }
                rest = body[close + 1..]
                    .strip_prefix(']')
                    .ok_or_else(|| malformed(text, "expected ']'"))?;
            } else {
                let end = rest.find(['.', '[']).unwrap_or(rest.len());
                let name = &rest[..end];
                if name.is_empty() {
                    return Err(malformed(text, "empty segment"));
                }
                if name.contains([']', '\'', '"']) || name.contains(char::is_whitespace) {
                    return Err(malformed(text, "unexpected character in name"));
                }
                segments.push(Segment::new(name));
                rest = &rest[end..];
            }
            if let Some(after_dot) = rest.strip_prefix('.') {
                if after_dot.is_empty() {
                    return Err(malformed(text, "path ends with '.'"));
                }
                if after_dot.starts_with('[') {
                    return Err(malformed(text, "unexpected '[' after '.'"));
                }
                rest = after_dot;
            } else if !rest.is_empty() && !rest.starts_with('[') {
                return Err(malformed(text, "trailing characters"));
            }
        }
        Ok(Self { segments })
    }

    /// Path of exactly one segment, taken literally.
    pub fn single(name: impl Into<String>) -> Self {
        let mut segments = SmallVec::new();
        segments.push(Segment::new(name));
        Self { segments }
    }

    /// Parsed segments in evaluation order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Evaluates the path starting at `start`.
    ///
    /// A null intermediate value short-circuits to [`RelationalValue::Null`];
    /// any other non-handle intermediate value is an
    /// [`HeapError::InvalidPathSegment`].
    pub fn resolve(&self, start: &GraphHandle) -> Result<RelationalValue> {
        let mut current = RelationalValue::Handle(start.clone());
        for segment in &self.segments {
            let handle = match &current {
                RelationalValue::Handle(handle) => handle,
                RelationalValue::Null => return Ok(RelationalValue::Null),
                other => {
                    return Err(HeapError::InvalidPathSegment {
                        segment: segment.name().to_owned(),
                        found: other.type_name(),
                    })
                }
            };
            current = resolve_segment(handle, segment)?;
        }
        Ok(current)
    }
}

impl FromStr for FieldPath {
    type Err = HeapError;

    fn from_str(s: &str) -> Result<Self> {
        FieldPath::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "this['")?;
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment.name())?;
        }
        write!(f, "']")
    }
}

/// Resolves one segment against `handle`.
pub fn resolve_segment(handle: &GraphHandle, segment: &Segment) -> Result<RelationalValue> {
    let node = handle.node();
    let store = handle.store().context("navigate fields", node)?;
    if let Segment::Virtual(name) = segment {
        let kind = store.node_kind(node).context("navigate fields", node)?;
        if let Some(attr) = VirtualAttributeCatalog::global().find_applicable(name, kind) {
            return (attr.compute)(handle);
        }
        trace!(%node, attribute = %name, kind = kind.as_str(), "query.virtual_fallthrough");
    }
    lookup_field(&*store, handle, segment.name())
}

fn lookup_field(
    store: &dyn HeapStore,
    handle: &GraphHandle,
    name: &str,
) -> Result<RelationalValue> {
    let node = handle.node();
    let fields = store
        .instance_fields(node)
        .context("read instance fields", node)?;
    let kind = store.node_kind(node).context("navigate fields", node)?;
    let own_class = if kind == NodeKind::Class {
        node
    } else {
        store.class_of(node).context("navigate fields", node)?
    };

    // Each level: fields its class declares on the instance, then its statics.
    for class in ClassChain::new(store, own_class) {
        let class = class.context("walk superclass chain", own_class)?;
        let declared = fields
            .iter()
            .find(|f| f.name == name && f.declared_by.unwrap_or(own_class) == class);
        if let Some(field) = declared {
            return resolve(handle, field.value.clone());
        }
        let raw = store
            .static_fields(class)
            .context("read static fields", class)?
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.clone());
        if let Some(raw) = raw {
            return resolve(handle, raw);
        }
    }
    if let Some(field) = fields.iter().find(|f| f.name == name) {
        return resolve(handle, field.value.clone());
    }

    let class_name = store
        .class_name(own_class)
        .context("resolve class name", own_class)?
        .into_owned();
    Err(HeapError::FieldNotFound {
        field: name.to_owned(),
        class: class_name,
    })
}
