//! Benchmarks for ember-stores
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ember_stores::{cloned, computed, store};

// =============================================================================
// STORE BENCHMARKS
// =============================================================================

fn bench_store_create(c: &mut Criterion) {
    c.bench_function("store_create", |b| b.iter(|| black_box(store(0i32))));
}

fn bench_store_get(c: &mut Criterion) {
    let s = store(42i32);
    c.bench_function("store_get", |b| b.iter(|| black_box(s.get())));
}

fn bench_store_set(c: &mut Criterion) {
    let s = store(0i32);
    let mut n = 0i32;
    c.bench_function("store_set", |b| {
        b.iter(|| {
            n = n.wrapping_add(1);
            s.set(black_box(n))
        })
    });
}

fn bench_store_set_same_value(c: &mut Criterion) {
    let s = store(42i32);
    c.bench_function("store_set_same_value", |b| b.iter(|| s.set(black_box(42))));
}

fn bench_store_set_with_subscribers(c: &mut Criterion) {
    let s = store(0i32);
    for _ in 0..10 {
        let _sub = s.listen(|v| {
            black_box(*v);
        });
    }
    let mut n = 0i32;
    c.bench_function("store_set_10_subscribers", |b| {
        b.iter(|| {
            n = n.wrapping_add(1);
            s.set(black_box(n))
        })
    });
}

// =============================================================================
// COMPUTED BENCHMARKS
// =============================================================================

fn bench_computed_create(c: &mut Criterion) {
    let s = store(0i32);
    c.bench_function("computed_create", |b| {
        b.iter(|| black_box(computed(cloned!(s => move || s.get() * 2))))
    });
}

fn bench_computed_propagation(c: &mut Criterion) {
    let s = store(0i32);
    let doubled = computed(cloned!(s => move || s.get() * 2));
    let mut n = 0i32;
    c.bench_function("computed_propagation", |b| {
        b.iter(|| {
            n = n.wrapping_add(1);
            s.set(n);
            black_box(doubled.get())
        })
    });
}

fn bench_computed_chain_depth_10(c: &mut Criterion) {
    let base = store(0i64);
    let mut tip = computed(cloned!(base => move || base.get() + 1));
    for _ in 0..9 {
        tip = computed(cloned!(tip => move || tip.get() + 1));
    }
    let mut n = 0i64;
    c.bench_function("computed_chain_depth_10", |b| {
        b.iter(|| {
            n = n.wrapping_add(1);
            base.set(n);
            black_box(tip.get())
        })
    });
}

criterion_group!(
    benches,
    bench_store_create,
    bench_store_get,
    bench_store_set,
    bench_store_set_same_value,
    bench_store_set_with_subscribers,
    bench_computed_create,
    bench_computed_propagation,
    bench_computed_chain_depth_10,
);
criterion_main!(benches);
