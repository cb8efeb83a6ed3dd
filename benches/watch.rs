//! Benchmarks for spark-watch
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spark_watch::{batch, computed, signal, watch, watch_computed, Computed};

// =============================================================================
// SIGNAL BENCHMARKS
// =============================================================================

fn bench_signal_set(c: &mut Criterion) {
    let s = signal(0i32);
    let mut i = 0;
    c.bench_function("signal_set", |b| {
        b.iter(|| {
            i += 1;
            s.set(black_box(i))
        })
    });
}

fn bench_signal_set_same_value(c: &mut Criterion) {
    let s = signal(42i32);
    let _w = watch(&s, |_, _| {});
    c.bench_function("signal_set_same_value", |b| {
        b.iter(|| s.set(black_box(42)))
    });
}

// =============================================================================
// WATCH BENCHMARKS
// =============================================================================

fn bench_watch_create(c: &mut Criterion) {
    let s = signal(0i32);
    c.bench_function("watch_create", |b| {
        b.iter(|| black_box(watch(&s, |_, _| {})))
    });
}

fn bench_watch_forced(c: &mut Criterion) {
    let s = signal(0i32);
    let _w = watch(&s, |new: &i32, _old: &i32| {
        black_box(*new);
    });
    let mut i = 0;
    c.bench_function("watch_forced", |b| {
        b.iter(|| {
            i += 1;
            s.set(i)
        })
    });
}

fn bench_watch_computed_quiet(c: &mut Criterion) {
    let s = signal(0i32);
    let parity = computed({
        let s = s.clone();
        move || s.get() % 2
    });
    let _w = watch_computed(&parity, |_, _| {});
    let mut i = 0;
    c.bench_function("watch_computed_quiet", |b| {
        b.iter(|| {
            // step by 2: parity never changes, the watch never fires
            i += 2;
            s.set(i)
        })
    });
}

fn bench_watch_batched(c: &mut Criterion) {
    let s = signal(0i32);
    let _w = watch(&s, |_, _| {});
    let mut i = 0;
    c.bench_function("watch_batched_10_writes", |b| {
        b.iter(|| {
            batch(|| {
                for _ in 0..10 {
                    i += 1;
                    s.set(i);
                }
            })
        })
    });
}

// =============================================================================
// GRAPH SHAPE BENCHMARKS
// =============================================================================

fn bench_diamond_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("diamond_fan_in");

    for width in [2usize, 8, 32] {
        group.bench_with_input(BenchmarkId::new("width", width), &width, |b, &width| {
            let root = signal(0i32);
            let branches: Vec<Computed<i32>> = (0..width)
                .map(|k| {
                    let root = root.clone();
                    computed(move || root.get() + k as i32)
                })
                .collect();
            let joined = computed(move || branches.iter().map(|b| b.get()).sum::<i32>());
            let _w = watch_computed(&joined, |_, _| {});

            let mut i = 0;
            b.iter(|| {
                i += 1;
                root.set(i)
            });
        });
    }

    group.finish();
}

fn bench_many_watches(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_watches");

    for count in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("trigger", count), &count, |b, &count| {
            let s = signal(0i32);
            let _watches: Vec<_> = (0..count).map(|_| watch(&s, |_, _| {})).collect();

            let mut i = 0;
            b.iter(|| {
                i += 1;
                s.set(i)
            });
        });
    }

    group.finish();
}

criterion_group!(signal_benches, bench_signal_set, bench_signal_set_same_value,);

criterion_group!(
    watch_benches,
    bench_watch_create,
    bench_watch_forced,
    bench_watch_computed_quiet,
    bench_watch_batched,
);

criterion_group!(graph_benches, bench_diamond_fan_in, bench_many_watches,);

criterion_main!(signal_benches, watch_benches, graph_benches);
