use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lazycache::{ExpirationPolicy, LazyCacheHandler, LazyStaticInMemoryCache, MapCacheStore};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn minute_policy() -> ExpirationPolicy {
    ExpirationPolicy::absolute(Duration::from_secs(60))
}

fn bench_populate_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("populate_sequential");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let cache = LazyCacheHandler::with_map_store();
                for i in 0..size {
                    let value: Arc<i32> = cache
                        .get_or_add(&format!("key{}", i), move || Ok(black_box(i as i32)), minute_policy())
                        .unwrap();
                    black_box(value);
                }
            });
        });
    }

    group.finish();
}

fn bench_cache_hits_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_hits_sequential");

    for size in [10, 100, 1000].iter() {
        // Pre-populate so every lookup is a hit.
        let cache = LazyCacheHandler::with_map_store();
        for i in 0..*size {
            let _: Arc<i32> = cache
                .get_or_add(&format!("key{}", i), move || Ok(i as i32), minute_policy())
                .unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    let value: Arc<i32> = cache
                        .get_or_add(&format!("key{}", i), || Ok(-1), minute_policy())
                        .unwrap();
                    black_box(value);
                }
            });
        });
    }

    group.finish();
}

fn bench_concurrent_hits(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_hits");

    let cache = Arc::new(LazyCacheHandler::<MapCacheStore>::with_map_store());
    for i in 0..100 {
        let _: Arc<i32> = cache
            .get_or_add(&format!("key{}", i), move || Ok(i), minute_policy())
            .unwrap();
    }

    for num_threads in [2, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let cache = cache.clone();
                            thread::spawn(move || {
                                for i in 0..100 {
                                    let value: Arc<i32> = cache
                                        .get_or_add(
                                            &format!("key{}", i % 100),
                                            || Ok(-1),
                                            minute_policy(),
                                        )
                                        .unwrap();
                                    black_box(value);
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_single_flight_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_flight_contention");

    for num_threads in [2, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let cache = Arc::new(LazyCacheHandler::with_map_store());
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let cache = cache.clone();
                            thread::spawn(move || {
                                // Every thread races for the same key; one factory wins.
                                let value: Arc<i32> = cache
                                    .get_or_add("hot-key", || Ok(black_box(42)), minute_policy())
                                    .unwrap();
                                black_box(value);
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_static_memo(c: &mut Criterion) {
    let mut group = c.benchmark_group("static_memo");

    let memo: LazyStaticInMemoryCache<u32, i32> = LazyStaticInMemoryCache::new();
    for i in 0..100u32 {
        memo.get_or_add(i, |key| Ok(*key as i32)).unwrap();
    }

    group.bench_function("hits", |b| {
        b.iter(|| {
            for i in 0..100u32 {
                black_box(memo.get_or_add(i, |_| Ok(-1)).unwrap());
            }
        });
    });

    group.bench_function("populate", |b| {
        b.iter(|| {
            let memo: LazyStaticInMemoryCache<u32, i32> = LazyStaticInMemoryCache::new();
            for i in 0..100u32 {
                black_box(memo.get_or_add(i, |key| Ok(black_box(*key as i32))).unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_populate_sequential,
    bench_cache_hits_sequential,
    bench_concurrent_hits,
    bench_single_flight_contention,
    bench_static_memo
);
criterion_main!(benches);
