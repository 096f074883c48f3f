use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::future::ready;
use std::hint::black_box;
use streamfan::prelude::*;

fn bench_mix(c: &mut Criterion) {
    let mut group = c.benchmark_group("mix");

    for sources in [2u64, 4, 8].iter() {
        let per_source = 1000u64;
        group.throughput(Throughput::Elements(sources * per_source));

        group.bench_with_input(BenchmarkId::new("sources", sources), sources, |b, &n| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            b.iter(|| {
                rt.block_on(async {
                    let inputs = (0..n)
                        .map(|i| IterSource::new(i * per_source..(i + 1) * per_source).boxed())
                        .collect();
                    let mix = Mix::new(rt.handle(), inputs).unwrap();
                    black_box(mix.reader().collect().await.unwrap());
                })
            });
        });
    }

    group.finish();
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");

    for capacity in [1usize, 16, 256].iter() {
        group.throughput(Throughput::Elements(10_000));

        group.bench_with_input(
            BenchmarkId::new("two_readers_capacity", capacity),
            capacity,
            |b, &capacity| {
                let rt = tokio::runtime::Runtime::new().unwrap();
                b.iter(|| {
                    rt.block_on(async {
                        let split = Split::with_config(
                            rt.handle(),
                            IterSource::new(0..10_000u64).boxed(),
                            SplitConfig::default().capacity(capacity),
                        )
                        .unwrap();
                        let (mut a, mut b) = split.split_pair();
                        let (a, b) = tokio::join!(a.collect(), b.collect());
                        black_box((a.unwrap(), b.unwrap()));
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_queues(c: &mut Criterion) {
    let mut group = c.benchmark_group("queues");
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("closable_put_get", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| {
            rt.block_on(async {
                let queue = ClosableQueue::new(64);
                for i in 0..10_000u64 {
                    queue.put(i).await;
                    black_box(queue.get().await);
                }
            })
        });
    });

    group.bench_function("multi_consumer_three_keys", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| {
            rt.block_on(async {
                let queue = MultiConsumerQueue::new(64).unwrap();
                let keys: Vec<_> = (0..3).map(|_| queue.register(None).unwrap()).collect();
                for i in 0..10_000u64 {
                    queue.put(i).await;
                    for key in &keys {
                        black_box(queue.get(*key).await.unwrap());
                    }
                }
            })
        });
    });

    group.finish();
}

fn bench_adapters(c: &mut Criterion) {
    let mut group = c.benchmark_group("adapters");

    group.bench_function("filter_map_take", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| {
            rt.block_on(async {
                let mut source = IterSource::new(0..10_000u64)
                    .filter(|x| ready(x % 2 == 0))
                    .map(|x| ready(black_box(x * 3)))
                    .take(1000);
                black_box(source.collect().await.unwrap());
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_mix, bench_split, bench_queues, bench_adapters);
criterion_main!(benches);
