#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use heapql::config::HeapQlConfig;
use heapql::query::{FunctionLibrary, GraphHandle, RelationalValue};
use heapql::snapshot::NodeSpec;
use heapql::store::Field;
use heapql::{HeapError, HeapStore, MemoryHeap, RawValue};

use common::demo;

#[test]
fn identity_and_type_functions() {
    let d = demo();
    let lib = FunctionLibrary::default();
    let a = d.value(d.item_a);

    assert_eq!(lib.get_id(&a), d.item_a.0 as i64);
    assert_eq!(lib.get_class(&a).unwrap(), d.value(d.item));
    assert_eq!(lib.get_type(&a).unwrap(), "demo.Item");
    assert_eq!(
        lib.get_address(&a).unwrap(),
        d.store.object_address(d.item_a).unwrap() as i64
    );
}

#[test]
fn text_rendering() {
    let d = demo();
    let lib = FunctionLibrary::default();

    assert_eq!(lib.to_text(&d.value(d.alpha)).unwrap(), RelationalValue::from("alpha"));
    assert_eq!(lib.to_text(&d.value(d.boxed)).unwrap(), RelationalValue::from("7"));
    let plain = lib.to_text(&d.value(d.plain)).unwrap();
    assert!(
        plain.as_text().unwrap().starts_with("java.lang.Object@0x"),
        "{plain}"
    );
    assert_eq!(lib.to_text(&RelationalValue::Integer(5)).unwrap(), RelationalValue::from("5"));
}

#[test]
fn string_content_respects_limits() {
    let d = demo();
    let lib = FunctionLibrary::default();
    let alpha = d.value(d.alpha);

    assert_eq!(lib.get_string_content(&alpha, -1).unwrap(), RelationalValue::from("alpha"));
    assert_eq!(lib.get_string_content(&alpha, 3).unwrap(), RelationalValue::from("alp"));
    assert_eq!(lib.get_string_content(&alpha, 0).unwrap(), RelationalValue::from(""));
    assert_eq!(
        lib.get_string_content(&d.value(d.item_a), -1).unwrap(),
        RelationalValue::Null
    );
}

#[test]
fn introspect_describes_handles() {
    let d = demo();
    let lib = FunctionLibrary::default();
    let text = lib.introspect(&d.value(d.item_a));
    assert!(text.starts_with("HeapReference: demo.Item@0x"), "{text}");
    assert_eq!(lib.introspect(&RelationalValue::from("x")), "Primitive type: x");
}

#[test]
fn collection_functions() {
    let d = demo();
    let lib = FunctionLibrary::default();

    assert_eq!(lib.get_size(&d.value(d.list)).unwrap(), 2);
    assert_eq!(lib.get_size(&d.value(d.map)).unwrap(), 2);
    assert_eq!(lib.get_size(&d.value(d.set)).unwrap(), 1);
    assert_eq!(lib.get_size(&d.value(d.ints)).unwrap(), 2);
    assert_eq!(lib.get_size(&d.value(d.item_a)).unwrap(), -1);

    let map = d.value(d.map);
    assert_eq!(lib.get_by_key(&map, "alpha").unwrap(), d.value(d.boxed));
    assert_eq!(lib.get_by_key(&map, "beta").unwrap(), d.value(d.item_a));
    assert_eq!(lib.get_by_key(&map, "gamma").unwrap(), RelationalValue::Null);
    assert_eq!(
        lib.get_by_key(&map, "beta").unwrap(),
        lib.get_by_key(&map, "beta").unwrap()
    );
    assert_eq!(lib.get_by_key(&d.value(d.list), "alpha").unwrap(), RelationalValue::Null);
}

#[test]
fn array_functions() {
    let d = demo();
    let lib = FunctionLibrary::default();
    let ints = d.value(d.ints);

    assert_eq!(lib.length(&ints).unwrap(), 3);
    assert_eq!(lib.length(&d.value(d.list)).unwrap(), -1);
    assert_eq!(lib.get_element(&ints, 0).unwrap(), RelationalValue::Integer(4));
    assert_eq!(lib.get_element(&ints, 1).unwrap(), RelationalValue::Null);
    assert_eq!(lib.get_element(&ints, 3).unwrap(), RelationalValue::Null);
    assert_eq!(lib.get_element(&ints, -1).unwrap(), RelationalValue::Null);
    assert_eq!(
        lib.get_element(&d.value(d.list_array), 0).unwrap(),
        d.value(d.item_a)
    );
}

#[test]
fn size_and_dominator_functions() {
    let d = demo();
    let lib = FunctionLibrary::default();
    let ints = d.value(d.ints);

    assert_eq!(lib.shallow_size(&ints).unwrap(), 40);
    assert!(lib.retained_size(&ints).unwrap() >= 40);
    assert_eq!(lib.get_dominator(&d.value(d.list)).unwrap(), RelationalValue::Null);
    assert_eq!(lib.get_dominator(&d.value(d.list_array)).unwrap(), d.value(d.list));
}

#[test]
fn oversized_footprints_clamp_to_i64_max() {
    let mut b = MemoryHeap::builder();
    let object = b.add_class("java.lang.Object", None, Vec::new());
    let huge = b.push(NodeSpec::Instance {
        class: object,
        fields: Vec::new(),
        address: None,
        shallow: Some(u64::MAX),
    });
    let holder = b.add_instance(object, vec![Field::new("payload", huge)]);
    b.add_root(holder);
    let store: Arc<dyn HeapStore> = Arc::new(b.build().unwrap());
    let lib = FunctionLibrary::default();
    let huge = RelationalValue::Handle(GraphHandle::new(&store, huge));
    let holder = RelationalValue::Handle(GraphHandle::new(&store, holder));

    assert_eq!(lib.shallow_size(&huge).unwrap(), i64::MAX);
    assert_eq!(lib.retained_size(&holder).unwrap(), i64::MAX);
    assert_eq!(lib.shallow_size(&RelationalValue::Integer(3)).unwrap(), -1);
}

#[test]
fn get_field_maps_absence_to_null() {
    let d = demo();
    let lib = FunctionLibrary::default();
    let a = d.value(d.item_a);

    assert_eq!(lib.get_field(&a, "name").unwrap(), d.value(d.alpha));
    assert_eq!(lib.get_field(&a, "missing").unwrap(), RelationalValue::Null);
    assert_eq!(lib.get_field(&a, "").unwrap(), RelationalValue::Null);
    assert_eq!(lib.get_field(&a, "@className").unwrap(), RelationalValue::from("demo.Item"));
}

#[test]
fn to_long_decodes_literals() {
    let lib = FunctionLibrary::default();
    assert_eq!(lib.to_long("123").unwrap(), 123);
    assert_eq!(lib.to_long("0x7f").unwrap(), 127);
    assert_eq!(
        lib.to_long("twelve").unwrap_err(),
        HeapError::InvalidLiteral {
            kind: "integer",
            text: "twelve".into(),
        }
    );
}

#[test]
fn invoke_dispatches_by_name() {
    let d = demo();
    let lib = FunctionLibrary::default();

    assert_eq!(
        lib.invoke("getsize", &[d.value(d.list)]).unwrap(),
        RelationalValue::Integer(2)
    );
    assert_eq!(
        lib.invoke("getByKey", &[d.value(d.map), "alpha".into()]).unwrap(),
        d.value(d.boxed)
    );
    assert_eq!(
        lib.invoke("getStringContent", &[d.value(d.beta), RelationalValue::Integer(-1)])
            .unwrap(),
        RelationalValue::from("beta")
    );
    assert_eq!(
        lib.invoke("getElement", &[d.value(d.ints), RelationalValue::Null]).unwrap(),
        RelationalValue::Null
    );
}

#[test]
fn invoke_reports_closed_store() {
    let d = demo();
    let lib = FunctionLibrary::default();
    let a = d.value(d.item_a);
    drop(d);
    let err = lib.invoke("getType", &[a]).unwrap_err();
    assert_eq!(err.code(), "StoreComputationError");
}

#[test]
fn configured_epoch_formatting() {
    let mut config = HeapQlConfig::default();
    config.format.epoch_pattern = "[year]/[month]/[day]".into();
    config.format.utc_offset_minutes = -60;
    config.format.wrong_type = "n/a".into();
    let lib = FunctionLibrary::from_config(&config).unwrap();

    assert_eq!(lib.convert_epoch(&"0".into()), "1969/12/31");
    assert_eq!(lib.convert_epoch(&"3600000".into()), "1970/01/01");
    assert_eq!(lib.convert_epoch(&"soon".into()), "n/a");
}

#[test]
fn length_counts_every_slot() {
    let mut b = MemoryHeap::builder();
    let object = b.add_class("java.lang.Object", None, Vec::new());
    let longs = b.add_class("long[]", Some(object), Vec::new());
    let empty = b.add_array(longs, Vec::new());
    let one = b.add_array(longs, vec![RawValue::Long(9)]);
    let holder = b.add_instance(object, vec![Field::new("data", one)]);
    let store: Arc<dyn HeapStore> = Arc::new(b.build().unwrap());
    let lib = FunctionLibrary::default();
    let value = |node| RelationalValue::Handle(GraphHandle::new(&store, node));

    assert_eq!(lib.length(&value(empty)).unwrap(), 0);
    assert_eq!(lib.length(&value(one)).unwrap(), 1);
    assert_eq!(lib.length(&value(holder)).unwrap(), -1);
    assert_eq!(lib.get_element(&value(one), 0).unwrap(), RelationalValue::Integer(9));
    assert_eq!(lib.get_size(&value(empty)).unwrap(), 0);
}
