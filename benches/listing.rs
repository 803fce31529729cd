use blob_restore::{
    for_each_matching, list_matching, select_latest_key, InMemoryObjectStore, KeyFilter,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const BUCKET: &str = "backups";

/// Store holding `count` data files plus a few manifests for node n1
fn populated_store(count: usize, page_size: usize) -> InMemoryObjectStore {
    let store = InMemoryObjectStore::with_page_size(page_size);
    for i in 0..count {
        store.put_object(
            BUCKET,
            &format!("c1/dc1/n1/data/ks/t{}/nb-{}-big-Data.db", i % 16, i),
            b"x",
        );
    }
    for day in 1..=28 {
        store.put_object(
            BUCKET,
            &format!("c1/dc1/n1/manifests/manifest-202302{:02}.json", day),
            b"{}",
        );
    }
    store
}

/// Full listing across many pages
fn bench_list_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_matching");

    for count in [1_000usize, 10_000, 50_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let store = populated_store(count, 1000);
            b.iter(|| {
                let found = list_matching(&store, BUCKET, "c1/dc1/n1/data", &KeyFilter::Any).unwrap();
                black_box(found.len());
            });
        });
    }

    group.finish();
}

/// Streaming with a glob filter, nothing materialized
fn bench_for_each_glob(c: &mut Criterion) {
    let mut group = c.benchmark_group("for_each_glob");
    let filter = KeyFilter::glob("c1/dc1/n1/data/ks/t3/*-Data.db");

    for page_size in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(page_size), &page_size, |b, &page_size| {
            let store = populated_store(10_000, page_size);
            b.iter(|| {
                let mut hits = 0usize;
                for_each_matching(&store, BUCKET, "c1/dc1/n1/data", &filter, |_| hits += 1).unwrap();
                black_box(hits);
            });
        });
    }

    group.finish();
}

/// Latest manifest selection over plain keys
fn bench_select_latest(c: &mut Criterion) {
    let keys: Vec<String> = (0..10_000u64)
        .map(|i| format!("c1/dc1/n1/manifests/snap-{}.json", 1_600_000_000_000 + i * 7919 % 10_000))
        .collect();

    c.bench_function("select_latest_key_10k", |b| {
        b.iter(|| black_box(select_latest_key(keys.iter().map(String::as_str))));
    });
}

criterion_group!(benches, bench_list_matching, bench_for_each_glob, bench_select_latest);
criterion_main!(benches);
