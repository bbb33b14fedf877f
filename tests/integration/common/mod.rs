#![allow(dead_code)]

use std::sync::Arc;

use heapql::query::{GraphHandle, RelationalValue};
use heapql::store::Field;
use heapql::{HeapStore, MemoryHeap, NodeId, RawValue};

/// Small application heap exercising strings, lists, maps, sets, statics,
/// inheritance, and a custom class loader.
pub struct Demo {
    pub store: Arc<dyn HeapStore>,
    pub object: NodeId,
    pub string: NodeId,
    pub base: NodeId,
    pub item: NodeId,
    pub plugin: NodeId,
    pub loader: NodeId,
    pub alpha: NodeId,
    pub beta: NodeId,
    pub item_a: NodeId,
    pub item_b: NodeId,
    pub list: NodeId,
    pub list_array: NodeId,
    pub map: NodeId,
    pub set: NodeId,
    pub boxed: NodeId,
    pub ints: NodeId,
    pub plain: NodeId,
}

impl Demo {
    pub fn handle(&self, node: NodeId) -> GraphHandle {
        GraphHandle::new(&self.store, node)
    }

    pub fn value(&self, node: NodeId) -> RelationalValue {
        RelationalValue::Handle(self.handle(node))
    }
}

pub fn chars(text: &str) -> Vec<RawValue> {
    text.encode_utf16().map(RawValue::Char).collect()
}

pub fn demo() -> Demo {
    let mut b = MemoryHeap::builder();
    let object = b.add_class("java.lang.Object", None, Vec::new());
    let string = b.add_class("java.lang.String", Some(object), Vec::new());
    let char_array = b.add_class("char[]", Some(object), Vec::new());
    let int_array = b.add_class("int[]", Some(object), Vec::new());
    let object_array = b.add_class("java.lang.Object[]", Some(object), Vec::new());
    let array_list = b.add_class("java.util.ArrayList", Some(object), Vec::new());
    let hash_map = b.add_class("java.util.HashMap", Some(object), Vec::new());
    let map_node = b.add_class("java.util.HashMap$Node", Some(object), Vec::new());
    let node_array = b.add_class("java.util.HashMap$Node[]", Some(object), Vec::new());
    let hash_set = b.add_class("java.util.HashSet", Some(object), Vec::new());
    let integer = b.add_class("java.lang.Integer", Some(object), Vec::new());
    let base = b.add_class("demo.Base", Some(object), vec![Field::new("VERSION", 3)]);
    let item = b.add_class("demo.Item", Some(base), vec![Field::new("COUNT", 2)]);
    let loader_class = b.add_class("demo.AppLoader", Some(object), Vec::new());
    let loader = b.add_loader(loader_class);
    let plugin = b.add_class_with_loader("demo.Plugin", Some(object), loader);

    let alpha_chars = b.add_array(char_array, chars("alpha"));
    let alpha = b.add_instance(string, vec![Field::new("value", alpha_chars)]);
    let beta_chars = b.add_array(char_array, chars("beta"));
    let beta = b.add_instance(string, vec![Field::new("value", beta_chars)]);

    let item_b = b.add_instance(
        item,
        vec![
            Field::new("name", beta),
            Field::new("next", RawValue::Null),
            Field::new("id", 2),
        ],
    );
    let item_a = b.add_instance(
        item,
        vec![
            Field::new("name", alpha),
            Field::new("next", item_b),
            Field::new("id", 1),
        ],
    );

    let list_array = b.add_array(
        object_array,
        vec![item_a.into(), item_b.into(), RawValue::Null, RawValue::Null],
    );
    let list = b.add_instance(
        array_list,
        vec![Field::new("size", 2), Field::new("elementData", list_array)],
    );

    let boxed = b.add_instance(integer, vec![Field::new("value", 7)]);
    let second = b.add_instance(
        map_node,
        vec![
            Field::new("key", beta),
            Field::new("value", item_a),
            Field::new("next", RawValue::Null),
        ],
    );
    let first = b.add_instance(
        map_node,
        vec![
            Field::new("key", alpha),
            Field::new("value", boxed),
            Field::new("next", second),
        ],
    );
    let table = b.add_array(
        node_array,
        vec![RawValue::Null, first.into(), RawValue::Null, RawValue::Null],
    );
    let map = b.add_instance(
        hash_map,
        vec![Field::new("size", 2), Field::new("table", table)],
    );

    let set_entry = b.add_instance(
        map_node,
        vec![
            Field::new("key", alpha),
            Field::new("value", RawValue::Null),
            Field::new("next", RawValue::Null),
        ],
    );
    let set_table = b.add_array(node_array, vec![set_entry.into(), RawValue::Null]);
    let set_map = b.add_instance(
        hash_map,
        vec![Field::new("size", 1), Field::new("table", set_table)],
    );
    let set = b.add_instance(hash_set, vec![Field::new("map", set_map)]);

    let ints = b.add_array(
        int_array,
        vec![RawValue::Int(4), RawValue::Null, RawValue::Int(6)],
    );
    let plain = b.add_instance(object, Vec::new());

    b.add_root(list);
    b.add_root(map);
    b.add_root(set);
    b.add_root(ints);

    let store: Arc<dyn HeapStore> = Arc::new(b.build().expect("demo heap"));
    Demo {
        store,
        object,
        string,
        base,
        item,
        plugin,
        loader,
        alpha,
        beta,
        item_a,
        item_b,
        list,
        list_array,
        map,
        set,
        boxed,
        ints,
        plain,
    }
}
