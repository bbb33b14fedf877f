#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use heapql::query::{FieldPath, FunctionLibrary, GraphHandle, RelationalValue};
use heapql::store::Field;
use heapql::{HeapError, HeapStore, MemoryHeap};

use common::demo;

fn eval(path: &str, start: &GraphHandle) -> heapql::Result<RelationalValue> {
    FieldPath::parse(path)?.resolve(start)
}

#[test]
fn instance_fields_follow_references() {
    let d = demo();
    let a = d.handle(d.item_a);
    assert_eq!(eval("name", &a).unwrap(), d.value(d.alpha));
    assert_eq!(eval("next", &a).unwrap(), d.value(d.item_b));
    assert_eq!(eval("next.id", &a).unwrap(), RelationalValue::Integer(2));
    assert_eq!(eval("this['next.id']", &a).unwrap(), RelationalValue::Integer(2));
    assert_eq!(eval("this.next.id", &a).unwrap(), RelationalValue::Integer(2));
}

#[test]
fn null_intermediate_short_circuits() {
    let d = demo();
    let a = d.handle(d.item_a);
    assert_eq!(eval("next.next", &a).unwrap(), RelationalValue::Null);
    assert_eq!(eval("next.next.id", &a).unwrap(), RelationalValue::Null);
}

#[test]
fn scalar_intermediate_is_an_error() {
    let d = demo();
    let err = eval("id.value", &d.handle(d.item_a)).unwrap_err();
    assert_eq!(
        err,
        HeapError::InvalidPathSegment {
            segment: "value".into(),
            found: "integer",
        }
    );
    assert_eq!(err.code(), "InvalidPathSegment");
}

#[test]
fn statics_resolve_through_the_class_chain() {
    let d = demo();
    let a = d.handle(d.item_a);
    assert_eq!(eval("COUNT", &a).unwrap(), RelationalValue::Integer(2));
    assert_eq!(eval("VERSION", &a).unwrap(), RelationalValue::Integer(3));

    let class = d.handle(d.item);
    assert_eq!(eval("COUNT", &class).unwrap(), RelationalValue::Integer(2));
    assert_eq!(eval("VERSION", &class).unwrap(), RelationalValue::Integer(3));
}

#[test]
fn missing_field_names_the_class() {
    let d = demo();
    let err = eval("next.missing", &d.handle(d.item_a)).unwrap_err();
    assert_eq!(
        err,
        HeapError::FieldNotFound {
            field: "missing".into(),
            class: "demo.Item".into(),
        }
    );
}

#[test]
fn virtual_attributes_on_any_node() {
    let d = demo();
    let a = d.handle(d.item_a);
    assert_eq!(eval("@className", &a).unwrap(), RelationalValue::from("demo.Item"));
    assert_eq!(eval("@CLASSNAME", &a).unwrap(), RelationalValue::from("demo.Item"));
    assert_eq!(eval("next.@className", &a).unwrap(), RelationalValue::from("demo.Item"));
    assert_eq!(eval("@class", &a).unwrap(), d.value(d.item));
    assert_eq!(eval("@class.@super", &a).unwrap(), d.value(d.base));
    // three fields on a 16 byte header
    assert_eq!(eval("@shallow", &a).unwrap(), RelationalValue::Integer(40));
    let retained = eval("@retained", &a).unwrap().as_i64().unwrap();
    assert!(retained >= 40, "retained {retained}");
}

#[test]
fn class_only_attributes() {
    let d = demo();
    assert_eq!(eval("@super", &d.handle(d.item)).unwrap(), d.value(d.base));
    assert_eq!(eval("@super", &d.handle(d.object)).unwrap(), RelationalValue::Null);
    assert_eq!(eval("@classLoader", &d.handle(d.plugin)).unwrap(), d.value(d.loader));
    assert_eq!(eval("@classLoader", &d.handle(d.item)).unwrap(), RelationalValue::Null);
}

#[test]
fn class_only_attribute_on_instance_falls_through_to_fields() {
    let d = demo();
    let err = eval("@super", &d.handle(d.item_a)).unwrap_err();
    assert_eq!(
        err,
        HeapError::FieldNotFound {
            field: "@super".into(),
            class: "demo.Item".into(),
        }
    );
}

#[test]
fn malformed_paths_are_rejected() {
    for bad in ["", "a..b", "a.", "this['a", "this[a]", "a b"] {
        let err = FieldPath::parse(bad).unwrap_err();
        assert_eq!(err.code(), "MalformedPath", "{bad:?}");
    }
}

#[test]
fn closed_store_fails_navigation() {
    let d = demo();
    let a = d.handle(d.item_a);
    drop(d);
    let err = eval("name", &a).unwrap_err();
    assert_eq!(err.code(), "StoreComputationError");
}

#[test]
fn subclass_declarations_shadow_superclass_ones() {
    let mut b = MemoryHeap::builder();
    let object = b.add_class("java.lang.Object", None, Vec::new());
    let base = b.add_class("demo.Shape", Some(object), vec![Field::new("x", 10)]);
    let sub = b.add_class("demo.Circle", Some(base), vec![Field::new("x", 1)]);
    let both = b.add_instance(
        sub,
        vec![
            Field::new("x", 2).declared_by(sub),
            Field::new("x", 3).declared_by(base),
        ],
    );
    let inherited = b.add_instance(sub, vec![Field::new("x", 3).declared_by(base)]);
    let undeclared = b.add_instance(sub, vec![Field::new("x", 4)]);
    let bare = b.add_instance(sub, Vec::new());
    let store: Arc<dyn HeapStore> = Arc::new(b.build().unwrap());
    let lib = FunctionLibrary::default();
    let x = |node| {
        lib.get_field(&RelationalValue::Handle(GraphHandle::new(&store, node)), "x")
            .unwrap()
    };

    // subclass instance field beats the superclass one with the same name
    assert_eq!(x(both), RelationalValue::Integer(2));
    // subclass static beats an instance field the superclass declares
    assert_eq!(x(inherited), RelationalValue::Integer(1));
    // fields without a declaring class belong to the node's own class
    assert_eq!(x(undeclared), RelationalValue::Integer(4));
    assert_eq!(x(bare), RelationalValue::Integer(1));
    assert_eq!(x(sub), RelationalValue::Integer(1));
    assert_eq!(x(base), RelationalValue::Integer(10));
}
