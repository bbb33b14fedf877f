//! Synthetic attributes addressed with the `@` sigil.

use std::sync::OnceLock;

use tracing::debug;

use crate::types::{NodeKind, Result, StoreContext};

use super::handle::GraphHandle;
use super::value::RelationalValue;

/// Prefix distinguishing virtual attributes from declared fields.
pub const SIGIL: char = '@';

/// Node kinds an attribute applies to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Applicability {
    /// Every node.
    AnyNode,
    /// Class nodes only; other nodes fall through to field lookup.
    ClassNode,
}

impl Applicability {
    fn admits(self, kind: NodeKind) -> bool {
        match self {
            Applicability::AnyNode => true,
            Applicability::ClassNode => kind == NodeKind::Class,
        }
    }
}

/// Computation bound to a virtual attribute.
pub type Compute = fn(&GraphHandle) -> Result<RelationalValue>;

/// Named synthetic attribute.
#[derive(Clone, Copy)]
pub struct VirtualAttribute {
    /// Query-text name including the sigil.
    pub name: &'static str,
    /// Nodes the attribute is defined on.
    pub applicability: Applicability,
    /// Value computation.
    pub compute: Compute,
}

impl std::fmt::Debug for VirtualAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualAttribute")
            .field("name", &self.name)
            .field("applicability", &self.applicability)
            .finish()
    }
}

fn size_value(bytes: u64) -> RelationalValue {
    RelationalValue::Integer(i64::try_from(bytes).unwrap_or(i64::MAX))
}

fn shallow(h: &GraphHandle) -> Result<RelationalValue> {
    let node = h.node();
    let store = h.store().context("compute shallow size", node)?;
    let bytes = store.shallow_size(node).context("compute shallow size", node)?;
    Ok(size_value(bytes))
}

fn retained(h: &GraphHandle) -> Result<RelationalValue> {
    let node = h.node();
    let store = h.store().context("compute retained size", node)?;
    let bytes = store.retained_size(node).context("compute retained size", node)?;
    Ok(size_value(bytes))
}

fn class_name(h: &GraphHandle) -> Result<RelationalValue> {
    let node = h.node();
    let store = h.store().context("resolve class name", node)?;
    let class = store.class_of(node).context("resolve class name", node)?;
    let name = store.class_name(class).context("resolve class name", class)?;
    Ok(RelationalValue::Text(name.into_owned()))
}

fn class(h: &GraphHandle) -> Result<RelationalValue> {
    let node = h.node();
    let store = h.store().context("resolve class", node)?;
    let class = store.class_of(node).context("resolve class", node)?;
    Ok(RelationalValue::Handle(h.sibling(class)))
}

fn class_loader(h: &GraphHandle) -> Result<RelationalValue> {
    let node = h.node();
    let store = h.store().context("resolve class loader", node)?;
    let loader = store.class_loader(node).context("resolve class loader", node)?;
    Ok(loader.map(|l| h.sibling(l)).into())
}

fn superclass(h: &GraphHandle) -> Result<RelationalValue> {
    let node = h.node();
    let store = h.store().context("resolve superclass", node)?;
    let sup = store.superclass(node).context("resolve superclass", node)?;
    Ok(sup.map(|s| h.sibling(s)).into())
}

/// Immutable registry of virtual attributes, built once per process.
#[derive(Debug)]
pub struct VirtualAttributeCatalog {
    entries: Vec<VirtualAttribute>,
}

impl VirtualAttributeCatalog {
    fn build() -> Self {
        let entries = vec![
            VirtualAttribute {
                name: "@shallow",
                applicability: Applicability::AnyNode,
                compute: shallow,
            },
            VirtualAttribute {
                name: "@retained",
                applicability: Applicability::AnyNode,
                compute: retained,
            },
            VirtualAttribute {
                name: "@className",
                applicability: Applicability::AnyNode,
                compute: class_name,
            },
            VirtualAttribute {
                name: "@class",
                applicability: Applicability::AnyNode,
                compute: class,
            },
            VirtualAttribute {
                name: "@classLoader",
                applicability: Applicability::ClassNode,
                compute: class_loader,
            },
            VirtualAttribute {
                name: "@super",
                applicability: Applicability::ClassNode,
                compute: superclass,
            },
        ];
        debug!(entries = entries.len(), "query.attribute_catalog_built");
        Self { entries }
    }

    /// Process-wide catalog.
    pub fn global() -> &'static VirtualAttributeCatalog {
        static CATALOG: OnceLock<VirtualAttributeCatalog> = OnceLock::new();
        CATALOG.get_or_init(Self::build)
    }

    /// All entries in lookup order.
    pub fn entries(&self) -> &[VirtualAttribute] {
        &self.entries
    }

    /// Case-insensitive lookup by name, ignoring applicability.
    pub fn lookup(&self, name: &str) -> Option<&VirtualAttribute> {
        self.entries
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
    }

    /// Case-insensitive lookup restricted to attributes defined on `kind`.
    pub fn find_applicable(&self, name: &str, kind: NodeKind) -> Option<&VirtualAttribute> {
        self.lookup(name)
            .filter(|attr| attr.applicability.admits(kind))
    }
}
