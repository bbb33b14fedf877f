#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use heapql::extract::{read_field, Extractor, ExtractorRegistry, RawIter, Shape};
use heapql::query::{CollectionBridge, GraphHandle, RelationalValue};
use heapql::store::Field;
use heapql::types::StoreResult;
use heapql::{HeapStore, MemoryHeap, NodeId, RawValue};

use common::demo;

fn drain(bridge: &CollectionBridge, d: &common::Demo, node: NodeId) -> Vec<RelationalValue> {
    let view = bridge.as_sequence(&d.handle(node)).unwrap().expect("sequence");
    view.iter().unwrap().collect::<heapql::Result<_>>().unwrap()
}

#[test]
fn list_elements_stop_at_size() {
    let d = demo();
    let bridge = CollectionBridge::default();
    assert_eq!(
        drain(&bridge, &d, d.list),
        vec![d.value(d.item_a), d.value(d.item_b)]
    );
}

#[test]
fn views_are_restartable() {
    let d = demo();
    let bridge = CollectionBridge::default();
    let view = bridge.as_sequence(&d.handle(d.list)).unwrap().unwrap();
    let first: Vec<_> = view.iter().unwrap().collect::<heapql::Result<_>>().unwrap();
    let second: Vec<_> = view.iter().unwrap().collect::<heapql::Result<_>>().unwrap();
    assert_eq!(first, second);
    assert_eq!(view.handle(), &d.handle(d.list));
}

#[test]
fn set_enumerates_backing_map_keys() {
    let d = demo();
    let bridge = CollectionBridge::default();
    assert_eq!(drain(&bridge, &d, d.set), vec![d.value(d.alpha)]);
}

#[test]
fn arrays_are_sequences_including_null_slots() {
    let d = demo();
    let bridge = CollectionBridge::default();
    assert_eq!(
        drain(&bridge, &d, d.ints),
        vec![
            RelationalValue::Integer(4),
            RelationalValue::Null,
            RelationalValue::Integer(6)
        ]
    );
}

#[test]
fn map_entries_follow_bucket_chains() {
    let d = demo();
    let bridge = CollectionBridge::default();
    let view = bridge.as_map(&d.handle(d.map)).unwrap().expect("map");
    let entries: Vec<_> = view.iter().unwrap().collect::<heapql::Result<_>>().unwrap();
    assert_eq!(
        entries,
        vec![
            (d.value(d.alpha), d.value(d.boxed)),
            (d.value(d.beta), d.value(d.item_a)),
        ]
    );
}

#[test]
fn shapes_do_not_cross() {
    let d = demo();
    let bridge = CollectionBridge::default();
    assert!(bridge.as_sequence(&d.handle(d.map)).unwrap().is_none());
    assert!(bridge.as_map(&d.handle(d.list)).unwrap().is_none());
    assert!(bridge.as_map(&d.handle(d.ints)).unwrap().is_none());
    assert!(bridge.as_sequence(&d.handle(d.item_a)).unwrap().is_none());
    assert_eq!(bridge.size(&d.handle(d.item_a)).unwrap(), -1);
}

/// Walks a singly linked `next` chain starting at the node itself.
struct NextChain;

impl Extractor for NextChain {
    fn name(&self) -> &'static str {
        "next-chain"
    }

    fn shape(&self) -> Shape {
        Shape::Sequence
    }

    fn has_size(&self) -> bool {
        false
    }

    fn size(&self, _store: &dyn HeapStore, _node: NodeId) -> StoreResult<u32> {
        Ok(0)
    }

    fn elements<'s>(
        &self,
        store: &'s dyn HeapStore,
        node: NodeId,
    ) -> StoreResult<RawIter<'s, RawValue>> {
        let mut next = Some(node);
        Ok(Box::new(std::iter::from_fn(move || {
            let current = next.take()?;
            match read_field(store, current, "next") {
                Ok(value) => {
                    next = value.and_then(|v| v.as_ref_id());
                    Some(Ok(RawValue::Ref(current)))
                }
                Err(err) => Some(Err(err)),
            }
        })))
    }
}

#[test]
fn custom_extractors_plug_into_the_bridge() {
    let d = demo();
    let mut registry = ExtractorRegistry::new();
    registry.register("demo.Base", Arc::new(NextChain));
    let bridge = CollectionBridge::new(Arc::new(registry));

    // demo.Item inherits the strategy registered for demo.Base
    assert_eq!(
        drain(&bridge, &d, d.item_a),
        vec![d.value(d.item_a), d.value(d.item_b)]
    );
    assert_eq!(bridge.size(&d.handle(d.item_a)).unwrap(), -1);
    // arrays still work without a registered extractor
    assert_eq!(bridge.size(&d.handle(d.ints)).unwrap(), 2);
    assert!(bridge.as_sequence(&d.handle(d.list)).unwrap().is_none());
}

/// Classes shared by the hand-built maps below; ids 0..=4.
fn map_classes(b: &mut heapql::snapshot::HeapBuilder) -> (NodeId, NodeId, NodeId, NodeId) {
    let object = b.add_class("java.lang.Object", None, Vec::new());
    let hash_map = b.add_class("java.util.HashMap", Some(object), Vec::new());
    let entry = b.add_class("java.util.HashMap$Node", Some(object), Vec::new());
    let buckets = b.add_class("java.util.HashMap$Node[]", Some(object), Vec::new());
    let hash_set = b.add_class("java.util.HashSet", Some(object), Vec::new());
    (hash_map, entry, buckets, hash_set)
}

#[test]
fn cyclic_bucket_chain_is_reported_not_followed() {
    let mut b = MemoryHeap::builder();
    let (hash_map, entry_class, buckets, hash_set) = map_classes(&mut b);
    let looped = NodeId(5);
    let entry = b.add_instance(
        entry_class,
        vec![
            Field::new("key", RawValue::from("k")),
            Field::new("value", 1),
            Field::new("next", looped),
        ],
    );
    assert_eq!(entry, looped);
    let table = b.add_array(buckets, vec![entry.into()]);
    let map = b.add_instance(
        hash_map,
        vec![Field::new("size", 1), Field::new("table", table)],
    );
    let set = b.add_instance(hash_set, vec![Field::new("map", map)]);
    let store: Arc<dyn HeapStore> = Arc::new(b.build().unwrap());
    let bridge = CollectionBridge::default();
    let map = GraphHandle::new(&store, map);

    // a hit before the revisit still answers
    assert_eq!(
        bridge.get_by_key(&map, "k").unwrap(),
        RelationalValue::Integer(1)
    );
    let err = bridge.get_by_key(&map, "absent").unwrap_err();
    assert_eq!(err.code(), "StoreComputationError");

    let view = bridge.as_map(&map).unwrap().unwrap();
    let entries: Vec<_> = view.iter().unwrap().collect();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].is_ok());
    assert!(entries[1].is_err());

    let set = bridge
        .as_sequence(&GraphHandle::new(&store, set))
        .unwrap()
        .unwrap();
    let keys = set.iter().unwrap().collect::<heapql::Result<Vec<_>>>();
    assert!(keys.is_err());
}

#[test]
fn lookup_skips_values_of_other_keys() {
    let mut b = MemoryHeap::builder();
    let (hash_map, entry_class, buckets, _) = map_classes(&mut b);
    let wanted = b.add_instance(
        entry_class,
        vec![
            Field::new("key", RawValue::from("want")),
            Field::new("value", 5),
            Field::new("next", RawValue::Null),
        ],
    );
    let skipped = b.add_instance(
        entry_class,
        vec![
            Field::new("key", RawValue::from("skip")),
            Field::new("value", RawValue::Opaque("frame".into())),
            Field::new("next", wanted),
        ],
    );
    let table = b.add_array(buckets, vec![skipped.into()]);
    let map = b.add_instance(
        hash_map,
        vec![Field::new("size", 2), Field::new("table", table)],
    );
    let store: Arc<dyn HeapStore> = Arc::new(b.build().unwrap());
    let bridge = CollectionBridge::default();
    let map = GraphHandle::new(&store, map);

    assert_eq!(
        bridge.get_by_key(&map, "want").unwrap(),
        RelationalValue::Integer(5)
    );
    assert!(bridge.get_by_key(&map, "skip").is_err());
}
