//! Benchmarks for the hot paths of the binding engine.
//!
//! - Marshalling: primitives and containers in both directions
//! - Calls: a registered method invoked the way scripting code would
//! - Wrapping: fresh host objects vs. existing-object reuse
//!
//! ```bash
//! cargo bench --bench marshal_benchmarks
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use scriptbind::prelude::*;
use std::collections::HashMap;
use std::hint::black_box;

#[derive(Debug, Default, Clone)]
struct Vec3 {
    x: f64,
    y: f64,
    z: f64,
}

fn setup() -> (Isolate, TypeRegistry) {
    let isolate = Isolate::new();
    let registry = TypeRegistry::new(&isolate);
    registry
        .class::<Vec3>("Vec3")
        .constructor("Vec3", |x: f64, y: f64, z: f64| Vec3 { x, y, z })
        .unwrap()
        .member("x", |v: &Vec3| v.x, |v: &mut Vec3, x: f64| v.x = x)
        .unwrap()
        .method("dot", |v: &Vec3, other: Obj<Vec3>| -> Result<f64, BindError> {
            let other = other.read()?;
            Ok(v.x * other.x + v.y * other.y + v.z * other.z)
        })
        .unwrap()
        .method("length", |v: &Vec3| (v.x * v.x + v.y * v.y + v.z * v.z).sqrt())
        .unwrap()
        .finalize(false)
        .unwrap();
    (isolate, registry)
}

fn bench_primitives(c: &mut Criterion) {
    let (_isolate, registry) = setup();
    let mut group = c.benchmark_group("primitives");

    group.bench_function("i64_round_trip", |b| {
        b.iter(|| {
            let host = registry.to_script(black_box(42_i64)).unwrap();
            registry.from_script::<i64>(&host).unwrap()
        })
    });

    group.bench_function("string_round_trip", |b| {
        let text = "the quick brown fox".to_string();
        b.iter(|| {
            let host = registry.to_script(black_box(text.clone())).unwrap();
            registry.from_script::<String>(&host).unwrap()
        })
    });

    group.finish();
}

fn bench_containers(c: &mut Criterion) {
    let (isolate, registry) = setup();
    let mut group = c.benchmark_group("containers");

    for size in [16_usize, 256, 4096] {
        let values: Vec<i32> = (0..size as i32).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("vec_i32", size), &values, |b, values| {
            b.iter(|| {
                let host = registry.to_script(values.clone()).unwrap();
                registry.from_script::<Vec<i32>>(&host).unwrap()
            })
        });
        isolate.collect_garbage();
    }

    let map: HashMap<String, f64> = (0..64).map(|i| (format!("key{i}"), i as f64)).collect();
    group.bench_function("hashmap_64", |b| {
        b.iter(|| {
            let host = registry.to_script(map.clone()).unwrap();
            registry.from_script::<HashMap<String, f64>>(&host).unwrap()
        })
    });

    group.finish();
}

fn bench_calls(c: &mut Criterion) {
    let (isolate, registry) = setup();
    let ctor = isolate.get(isolate.global(), "Vec3").unwrap();
    let args = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
    let a = isolate.construct(&ctor, args.clone()).unwrap();
    let b_vec = isolate.construct(&ctor, args).unwrap();
    // keep both alive across collections
    let _roots = (
        Global::new(&isolate, a.as_object().unwrap()),
        Global::new(&isolate, b_vec.as_object().unwrap()),
    );

    let mut group = c.benchmark_group("calls");

    let length = isolate.get(a.as_object().unwrap(), "length").unwrap();
    group.bench_function("method_no_args", |b| {
        b.iter(|| isolate.call(&length, a.clone(), Vec::new()).unwrap())
    });

    let dot = isolate.get(a.as_object().unwrap(), "dot").unwrap();
    group.bench_function("method_native_arg", |b| {
        b.iter(|| isolate.call(&dot, a.clone(), vec![b_vec.clone()]).unwrap())
    });

    group.bench_function("member_get", |b| {
        b.iter(|| isolate.get(a.as_object().unwrap(), "x").unwrap())
    });

    group.bench_function("construct", |b| {
        b.iter(|| {
            let args = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
            isolate.construct(&ctor, args).unwrap()
        })
    });
    isolate.collect_garbage();

    group.finish();
}

fn bench_wrapping(c: &mut Criterion) {
    let (isolate, registry) = setup();
    let mut group = c.benchmark_group("wrapping");

    let shared = Native::new(Vec3::default());
    let _kept = registry.to_script(shared.clone()).unwrap();
    group.bench_function("existing_object", |b| {
        b.iter(|| registry.to_script(black_box(shared.clone())).unwrap())
    });

    group.bench_function("fresh_object", |b| {
        b.iter(|| registry.to_script(ByValue(Vec3::default())).unwrap())
    });
    isolate.collect_garbage();

    group.finish();
}

criterion_group!(
    benches,
    bench_primitives,
    bench_containers,
    bench_calls,
    bench_wrapping
);
criterion_main!(benches);
