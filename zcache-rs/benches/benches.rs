use criterion::{black_box, criterion_group, criterion_main, Criterion};

use zcache::byte_view::ByteView;
use zcache::hash_ring::HashRing;
use zcache::lru::LRUCache;

fn hash_ring_benchmarks(c: &mut Criterion) {
    let mut ring = HashRing::new(50);
    ring.add(&[
        "http://localhost:8001",
        "http://localhost:8002",
        "http://localhost:8003",
    ]);

    c.bench_function("picking the owner of a key", |b| {
        b.iter(|| black_box(ring.get(black_box("Tom"))).len())
    });

    c.bench_function("building a ring for 10 nodes", |b| {
        let nodes: Vec<String> = (0..10)
            .map(|index| format!("http://node-{}:8001", index))
            .collect();
        b.iter(|| {
            let mut ring = HashRing::new(50);
            ring.add(black_box(nodes.as_slice()));
            black_box(ring.len())
        })
    });
}

fn lru_benchmarks(c: &mut Criterion) {
    c.bench_function("putting values into a full cache", |b| {
        let mut cache = LRUCache::new(64 * 1024);
        let mut index = 0;
        b.iter(|| {
            index += 1;
            cache.put(format!("key-{}", index), ByteView::from("value"));
        })
    });

    c.bench_function("reading a cached value", |b| {
        let mut cache = LRUCache::new(0);
        cache.put("Tom".to_owned(), ByteView::from("630"));
        b.iter(|| black_box(cache.get(black_box("Tom")).map(|value| value.len())))
    });
}

criterion_group!(benches, hash_ring_benchmarks, lru_benchmarks);
criterion_main!(benches);
