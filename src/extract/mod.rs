//! Collection extractor strategies and their registry.
//!
//! An extractor knows how one collection implementation lays out its
//! elements in the heap (backing arrays, bucket chains, size counters). The
//! registry maps class names to extractors and is consulted along the
//! superclass chain, so user subclasses of a known collection reuse its
//! strategy.

use std::sync::{Arc, OnceLock};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::store::{ClassChain, HeapStore, RawValue};
use crate::types::{NodeId, StoreError, StoreResult};

/// Boxed lazy iterator over raw store values.
pub type RawIter<'s, T> = Box<dyn Iterator<Item = StoreResult<T>> + 's>;

/// Whether an extractor enumerates single values or key/value pairs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Shape {
    /// Ordered elements.
    Sequence,
    /// Key/value entries.
    Map,
}

/// Strategy for enumerating one collection representation.
pub trait Extractor: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Shape of the collections this extractor handles.
    fn shape(&self) -> Shape;

    /// Whether [`Extractor::size`] can answer without enumerating.
    fn has_size(&self) -> bool;

    /// Stored element count of `node`.
    fn size(&self, store: &dyn HeapStore, node: NodeId) -> StoreResult<u32>;

    /// Elements of a sequence-shaped `node`.
    fn elements<'s>(
        &self,
        store: &'s dyn HeapStore,
        node: NodeId,
    ) -> StoreResult<RawIter<'s, RawValue>> {
        let _ = (store, node);
        Err(StoreError::Corruption("extractor does not enumerate elements"))
    }

    /// Entries of a map-shaped `node`.
    fn entries<'s>(
        &self,
        store: &'s dyn HeapStore,
        node: NodeId,
    ) -> StoreResult<RawIter<'s, (RawValue, RawValue)>> {
        let _ = (store, node);
        Err(StoreError::Corruption("extractor does not enumerate entries"))
    }
}

/// Reads the first instance field named `name`.
pub fn read_field(
    store: &dyn HeapStore,
    node: NodeId,
    name: &str,
) -> StoreResult<Option<RawValue>> {
    Ok(store
        .instance_fields(node)?
        .iter()
        .find(|f| f.name == name)
        .map(|f| f.value.clone()))
}

fn read_count(store: &dyn HeapStore, node: NodeId, name: &str) -> StoreResult<u32> {
    match read_field(store, node, name)? {
        Some(value) => value
            .as_i64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or(StoreError::Corruption("collection size is not a non-negative integer")),
        None => Err(StoreError::Corruption("collection size field missing")),
    }
}

/// Lazily walks the slots of an array node.
pub(crate) struct ArraySlots<'s> {
    store: &'s dyn HeapStore,
    array: NodeId,
    index: u32,
    end: u32,
}

impl<'s> ArraySlots<'s> {
    /// Iterates slots `0..min(limit, length)`; a missing array yields nothing.
    pub(crate) fn new(
        store: &'s dyn HeapStore,
        array: Option<NodeId>,
        limit: Option<u32>,
    ) -> StoreResult<Self> {
        let (array, len) = match array {
            Some(array) => (array, store.array_length(array)?.unwrap_or(0)),
            None => (NodeId(0), 0),
        };
        Ok(Self {
            store,
            array,
            index: 0,
            end: limit.map_or(len, |l| l.min(len)),
        })
    }
}

impl Iterator for ArraySlots<'_> {
    type Item = StoreResult<RawValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.end {
            return None;
        }
        let idx = self.index;
        self.index += 1;
        Some(
            self.store
                .array_element(self.array, idx)
                .and_then(|v| v.ok_or(StoreError::Corruption("array slot out of range"))),
        )
    }
}

/// List backed by an array plus an explicit element count
/// (`java.util.ArrayList`, `java.util.Vector`).
pub struct SizedListExtractor {
    /// Field holding the element count.
    pub size_field: &'static str,
    /// Field referencing the backing array.
    pub array_field: &'static str,
}

impl Extractor for SizedListExtractor {
    fn name(&self) -> &'static str {
        "sized-list"
    }

    fn shape(&self) -> Shape {
        Shape::Sequence
    }

    fn has_size(&self) -> bool {
        true
    }

    fn size(&self, store: &dyn HeapStore, node: NodeId) -> StoreResult<u32> {
        read_count(store, node, self.size_field)
    }

    fn elements<'s>(
        &self,
        store: &'s dyn HeapStore,
        node: NodeId,
    ) -> StoreResult<RawIter<'s, RawValue>> {
        let size = self.size(store, node)?;
        let array = read_field(store, node, self.array_field)?.and_then(|v| v.as_ref_id());
        Ok(Box::new(ArraySlots::new(store, array, Some(size))?))
    }
}

/// Chained hash table (`java.util.HashMap`, `java.util.Hashtable`, ...).
pub struct HashMapExtractor {
    /// Field holding the entry count.
    pub size_field: &'static str,
    /// Field referencing the bucket array.
    pub table_field: &'static str,
}

struct BucketChains<'s> {
    store: &'s dyn HeapStore,
    buckets: ArraySlots<'s>,
    pending: Option<NodeId>,
    visited: FxHashSet<NodeId>,
    failed: bool,
}

impl BucketChains<'_> {
    fn entry(&mut self, node: NodeId) -> StoreResult<(RawValue, RawValue)> {
        let key = read_field(self.store, node, "key")?.unwrap_or(RawValue::Null);
        let value = read_field(self.store, node, "value")?
            .or(read_field(self.store, node, "val")?)
            .unwrap_or(RawValue::Null);
        self.pending = read_field(self.store, node, "next")?.and_then(|v| v.as_ref_id());
        Ok((key, value))
    }
}

impl Iterator for BucketChains<'_> {
    type Item = StoreResult<(RawValue, RawValue)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(node) = self.pending.take() {
                if !self.visited.insert(node) {
                    self.failed = true;
                    return Some(Err(StoreError::Corruption("cyclic bucket chain")));
                }
                return Some(self.entry(node));
            }
            match self.buckets.next()? {
                Ok(RawValue::Ref(node)) => self.pending = Some(node),
                Ok(_) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl HashMapExtractor {
    fn chains<'s>(&self, store: &'s dyn HeapStore, node: NodeId) -> StoreResult<BucketChains<'s>> {
        let table = read_field(store, node, self.table_field)?.and_then(|v| v.as_ref_id());
        Ok(BucketChains {
            store,
            buckets: ArraySlots::new(store, table, None)?,
            pending: None,
            visited: FxHashSet::default(),
            failed: false,
        })
    }
}

impl Extractor for HashMapExtractor {
    fn name(&self) -> &'static str {
        "hash-map"
    }

    fn shape(&self) -> Shape {
        Shape::Map
    }

    fn has_size(&self) -> bool {
        true
    }

    fn size(&self, store: &dyn HeapStore, node: NodeId) -> StoreResult<u32> {
        read_count(store, node, self.size_field)
    }

    fn entries<'s>(
        &self,
        store: &'s dyn HeapStore,
        node: NodeId,
    ) -> StoreResult<RawIter<'s, (RawValue, RawValue)>> {
        Ok(Box::new(self.chains(store, node)?))
    }
}

/// Set backed by a map's key set (`java.util.HashSet`).
pub struct KeySetExtractor {
    /// Field referencing the backing map.
    pub map_field: &'static str,
    /// Extractor for the backing map.
    pub map: HashMapExtractor,
}

impl KeySetExtractor {
    fn backing(&self, store: &dyn HeapStore, node: NodeId) -> StoreResult<NodeId> {
        read_field(store, node, self.map_field)?
            .and_then(|v| v.as_ref_id())
            .ok_or(StoreError::Corruption("set has no backing map"))
    }
}

impl Extractor for KeySetExtractor {
    fn name(&self) -> &'static str {
        "key-set"
    }

    fn shape(&self) -> Shape {
        Shape::Sequence
    }

    fn has_size(&self) -> bool {
        true
    }

    fn size(&self, store: &dyn HeapStore, node: NodeId) -> StoreResult<u32> {
        let map = self.backing(store, node)?;
        self.map.size(store, map)
    }

    fn elements<'s>(
        &self,
        store: &'s dyn HeapStore,
        node: NodeId,
    ) -> StoreResult<RawIter<'s, RawValue>> {
        let map = self.backing(store, node)?;
        let keys = self.map.chains(store, map)?.map(|entry| entry.map(|(k, _)| k));
        Ok(Box::new(keys))
    }
}

/// Class-name keyed extractor lookup.
#[derive(Default)]
pub struct ExtractorRegistry {
    by_class: FxHashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `extractor` for instances of `class_name` and its subclasses.
    pub fn register(&mut self, class_name: impl Into<String>, extractor: Arc<dyn Extractor>) {
        self.by_class.insert(class_name.into(), extractor);
    }

    /// Registry with the JDK collection strategies.
    pub fn with_jdk_collections() -> Self {
        let mut registry = Self::new();
        let list = Arc::new(SizedListExtractor {
            size_field: "size",
            array_field: "elementData",
        });
        registry.register("java.util.ArrayList", list);
        registry.register(
            "java.util.Vector",
            Arc::new(SizedListExtractor {
                size_field: "elementCount",
                array_field: "elementData",
            }),
        );
        let hash_map: Arc<dyn Extractor> = Arc::new(HashMapExtractor {
            size_field: "size",
            table_field: "table",
        });
        registry.register("java.util.HashMap", Arc::clone(&hash_map));
        registry.register("java.util.LinkedHashMap", hash_map);
        registry.register(
            "java.util.Hashtable",
            Arc::new(HashMapExtractor {
                size_field: "count",
                table_field: "table",
            }),
        );
        registry.register(
            "java.util.concurrent.ConcurrentHashMap",
            Arc::new(HashMapExtractor {
                size_field: "baseCount",
                table_field: "table",
            }),
        );
        let set: Arc<dyn Extractor> = Arc::new(KeySetExtractor {
            map_field: "map",
            map: HashMapExtractor {
                size_field: "size",
                table_field: "table",
            },
        });
        registry.register("java.util.HashSet", Arc::clone(&set));
        registry.register("java.util.LinkedHashSet", set);
        registry
    }

    /// Process-wide registry with the JDK strategies, built on first use.
    pub fn builtin() -> Arc<ExtractorRegistry> {
        static BUILTIN: OnceLock<Arc<ExtractorRegistry>> = OnceLock::new();
        Arc::clone(BUILTIN.get_or_init(|| {
            let registry = ExtractorRegistry::with_jdk_collections();
            debug!(entries = registry.len(), "extract.registry_built");
            Arc::new(registry)
        }))
    }

    /// Number of registered class names.
    pub fn len(&self) -> usize {
        self.by_class.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_class.is_empty()
    }

    /// Finds the extractor for `node` by walking its class hierarchy.
    pub fn find_extractor(
        &self,
        store: &dyn HeapStore,
        node: NodeId,
    ) -> StoreResult<Option<Arc<dyn Extractor>>> {
        if self.by_class.is_empty() {
            return Ok(None);
        }
        for class in ClassChain::new(store, store.class_of(node)?) {
            let class = class?;
            if let Some(found) = self.by_class.get(&*store.class_name(class)?) {
                return Ok(Some(Arc::clone(found)));
            }
        }
        Ok(None)
    }
}
