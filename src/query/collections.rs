//! Uniform sequence and map iteration over collection-shaped nodes.

use std::sync::Arc;

use crate::extract::{ArraySlots, Extractor, ExtractorRegistry, RawIter, Shape};
use crate::store::{HeapStore, RawValue};
use crate::types::{NodeKind, Result, StoreContext};

use super::handle::GraphHandle;
use super::resolve::resolve;
use super::text::display_text;
use super::value::RelationalValue;

/// Size reported when a node has no known element count.
///
/// The sentinel is indistinguishable from a failed lookup on some shapes but
/// query text compares against the literal `-1`, so it is kept as is.
pub const UNKNOWN_SIZE: i64 = -1;

enum SequenceSource {
    Extractor(Arc<dyn Extractor>),
    Array,
}

/// Restartable lazy view over the elements of a sequence-shaped node.
///
/// Each call to [`CollectionView::iter`] enumerates from the start; nothing
/// is cached between calls.
pub struct CollectionView {
    store: Arc<dyn HeapStore>,
    handle: GraphHandle,
    source: SequenceSource,
}

impl CollectionView {
    /// Node being enumerated.
    pub fn handle(&self) -> &GraphHandle {
        &self.handle
    }

    /// Enumerates elements as relational values.
    pub fn iter(&self) -> Result<impl Iterator<Item = Result<RelationalValue>> + '_> {
        let node = self.handle.node();
        let raw: RawIter<'_, RawValue> = match &self.source {
            SequenceSource::Extractor(extractor) => extractor
                .elements(&*self.store, node)
                .context("enumerate elements", node)?,
            SequenceSource::Array => Box::new(
                ArraySlots::new(&*self.store, Some(node), None)
                    .context("enumerate elements", node)?,
            ),
        };
        Ok(raw.map(move |item| {
            item.context("read element", node)
                .and_then(|raw| resolve(&self.handle, raw))
        }))
    }
}

/// Restartable lazy view over the entries of a map-shaped node.
pub struct MapView {
    store: Arc<dyn HeapStore>,
    handle: GraphHandle,
    extractor: Arc<dyn Extractor>,
}

impl MapView {
    /// Node being enumerated.
    pub fn handle(&self) -> &GraphHandle {
        &self.handle
    }

    fn raw_entries(&self) -> Result<RawIter<'_, (RawValue, RawValue)>> {
        let node = self.handle.node();
        self.extractor
            .entries(&*self.store, node)
            .context("enumerate entries", node)
    }

    /// Enumerates `(key, value)` pairs as relational values.
    pub fn iter(
        &self,
    ) -> Result<impl Iterator<Item = Result<(RelationalValue, RelationalValue)>> + '_> {
        let node = self.handle.node();
        let raw = self.raw_entries()?;
        Ok(raw.map(move |item| {
            let (key, value) = item.context("read entry", node)?;
            Ok((resolve(&self.handle, key)?, resolve(&self.handle, value)?))
        }))
    }
}

/// Adapts collection and map nodes through the extractor registry.
#[derive(Clone)]
pub struct CollectionBridge {
    registry: Arc<ExtractorRegistry>,
}

impl Default for CollectionBridge {
    fn default() -> Self {
        Self::new(ExtractorRegistry::builtin())
    }
}

impl CollectionBridge {
    /// Creates a bridge over `registry`.
    pub fn new(registry: Arc<ExtractorRegistry>) -> Self {
        Self { registry }
    }

    fn extractor(
        &self,
        store: &dyn HeapStore,
        handle: &GraphHandle,
    ) -> Result<Option<Arc<dyn Extractor>>> {
        let node = handle.node();
        self.registry
            .find_extractor(store, node)
            .context("find collection extractor", node)
    }

    /// Sequence view of `handle`, or `None` if it is not sequence-shaped.
    pub fn as_sequence(&self, handle: &GraphHandle) -> Result<Option<CollectionView>> {
        let node = handle.node();
        let store = handle.store().context("open collection", node)?;
        let source = match self.extractor(&*store, handle)? {
            Some(extractor) if extractor.shape() == Shape::Sequence => {
                SequenceSource::Extractor(extractor)
            }
            Some(_) => return Ok(None),
            None => match store.node_kind(node).context("open collection", node)? {
                NodeKind::Array => SequenceSource::Array,
                _ => return Ok(None),
            },
        };
        Ok(Some(CollectionView {
            store,
            handle: handle.clone(),
            source,
        }))
    }

    /// Map view of `handle`, or `None` if it is not map-shaped.
    pub fn as_map(&self, handle: &GraphHandle) -> Result<Option<MapView>> {
        let node = handle.node();
        let store = handle.store().context("open map", node)?;
        match self.extractor(&*store, handle)? {
            Some(extractor) if extractor.shape() == Shape::Map => Ok(Some(MapView {
                store,
                handle: handle.clone(),
                extractor,
            })),
            _ => Ok(None),
        }
    }

    /// Element count, the live slot count for arrays, or [`UNKNOWN_SIZE`].
    pub fn size(&self, handle: &GraphHandle) -> Result<i64> {
        let node = handle.node();
        let store = handle.store().context("obtain collection size", node)?;
        if let Some(extractor) = self.extractor(&*store, handle)? {
            if extractor.has_size() {
                let size = extractor
                    .size(&*store, node)
                    .context("obtain collection size", node)?;
                return Ok(size.into());
            }
        }
        if store.node_kind(node).context("obtain collection size", node)? != NodeKind::Array {
            return Ok(UNKNOWN_SIZE);
        }
        let mut live = 0i64;
        for slot in ArraySlots::new(&*store, Some(node), None).context("count live slots", node)? {
            if slot.context("count live slots", node)? != RawValue::Null {
                live += 1;
            }
        }
        Ok(live)
    }

    /// Value of the first entry whose key text equals `key`, or null.
    ///
    /// Keys are compared by display text, so this is a linear scan.
    pub fn get_by_key(&self, handle: &GraphHandle, key: &str) -> Result<RelationalValue> {
        let Some(map) = self.as_map(handle)? else {
            return Ok(RelationalValue::Null);
        };
        let node = handle.node();
        for entry in map.raw_entries()? {
            let (raw_key, raw_value) = entry.context("read entry", node)?;
            let k = resolve(map.handle(), raw_key)?;
            if display_text(&k)?.as_deref() == Some(key) {
                return resolve(map.handle(), raw_value);
            }
        }
        Ok(RelationalValue::Null)
    }
}
