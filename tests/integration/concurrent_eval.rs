#![allow(missing_docs)]

mod common;

use std::thread;

use heapql::query::{
    CollectionBridge, FieldPath, FunctionLibrary, RelationalValue, VirtualAttributeCatalog,
};

use common::demo;

const THREADS: usize = 8;
const ROUNDS: usize = 200;

#[test]
fn concurrent_queries_agree_with_sequential_results() {
    let d = demo();
    let lib = FunctionLibrary::default();
    let bridge = CollectionBridge::default();
    let path = FieldPath::parse("next.name").unwrap();

    let evaluate = || -> Vec<RelationalValue> {
        let a = d.handle(d.item_a);
        let mut out = vec![
            path.resolve(&a).unwrap(),
            lib.invoke("getSize", &[d.value(d.map)]).unwrap(),
            lib.invoke("getByKey", &[d.value(d.map), "beta".into()]).unwrap(),
            lib.invoke("retainedSize", &[d.value(d.list)]).unwrap(),
            lib.invoke("toString", &[d.value(d.beta)]).unwrap(),
        ];
        let view = bridge.as_sequence(&d.handle(d.list)).unwrap().unwrap();
        for item in view.iter().unwrap() {
            out.push(item.unwrap());
        }
        out
    };

    let expected = evaluate();
    thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    for _ in 0..ROUNDS {
                        assert_eq!(evaluate(), expected);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
    });
}

#[test]
fn catalog_initialises_once_under_contention() {
    let pointers: Vec<usize> = thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| VirtualAttributeCatalog::global() as *const _ as usize)
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });
    assert!(pointers.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(VirtualAttributeCatalog::global().entries().len(), 6);
}

#[test]
fn handles_survive_store_sharing_and_fail_after_close() {
    let d = demo();
    let handles: Vec<_> = (0..THREADS).map(|_| d.handle(d.item_b)).collect();
    let lib = FunctionLibrary::default();

    thread::scope(|scope| {
        for handle in &handles {
            let lib = &lib;
            scope.spawn(move || {
                let value = RelationalValue::Handle(handle.clone());
                assert_eq!(lib.get_type(&value).unwrap(), "demo.Item");
            });
        }
    });

    drop(d);
    for handle in handles {
        assert!(!handle.is_open());
        let err = lib.get_type(&RelationalValue::Handle(handle)).unwrap_err();
        assert_eq!(err.code(), "StoreComputationError");
    }
}
