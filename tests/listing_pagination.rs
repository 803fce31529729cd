//! Property-based tests for paginated listing
//!
//! Random key sets and page sizes; the walked listing must see every
//! non-directory key under the prefix exactly once and nothing else.

use blob_restore::{
    for_each_matching, list_matching, InMemoryObjectStore, KeyFilter, ObjectSummary,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

const BUCKET: &str = "backups";
const PREFIX: &str = "c1/dc1/n1/data";

fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        // inside the prefix
        "[a-z]{1,6}(/[a-z0-9]{1,6}){0,2}".prop_map(|s| format!("{}/{}", PREFIX, s)),
        // directory markers inside the prefix
        "[a-z]{1,6}".prop_map(|s| format!("{}/{}/", PREFIX, s)),
        // outside the prefix
        "[a-z]{1,6}/[a-z]{1,6}".prop_map(|s| format!("c1/dc1/n2/{}", s)),
    ]
}

fn populate(page_size: usize, keys: &BTreeSet<String>) -> InMemoryObjectStore {
    let store = InMemoryObjectStore::with_page_size(page_size);
    for key in keys {
        store.put_object(BUCKET, key, key.as_bytes());
    }
    store
}

fn expected(keys: &BTreeSet<String>, accept: impl Fn(&str) -> bool) -> Vec<String> {
    keys.iter()
        .filter(|k| k.starts_with(PREFIX) && !k.ends_with('/') && accept(k))
        .cloned()
        .collect()
}

proptest! {
    #[test]
    fn prop_listing_sees_every_key_once(
        keys in prop::collection::btree_set(key_strategy(), 0..60),
        page_size in 1usize..8,
    ) {
        let store = populate(page_size, &keys);

        let listed: Vec<String> = list_matching(&store, BUCKET, PREFIX, &KeyFilter::Any)
            .unwrap()
            .into_iter()
            .map(|s| s.key)
            .collect();

        prop_assert_eq!(listed, expected(&keys, |_| true));
    }

    #[test]
    fn prop_streaming_agrees_with_materialized(
        keys in prop::collection::btree_set(key_strategy(), 0..60),
        page_size in 1usize..8,
        needle in "[a-z]",
    ) {
        let store = populate(page_size, &keys);
        let filter = KeyFilter::contains(needle.as_str());

        let materialized = list_matching(&store, BUCKET, PREFIX, &filter).unwrap();

        let mut streamed: Vec<ObjectSummary> = Vec::new();
        for_each_matching(&store, BUCKET, PREFIX, &filter, |s| streamed.push(s)).unwrap();

        prop_assert_eq!(&materialized, &streamed);
        prop_assert_eq!(
            materialized.into_iter().map(|s| s.key).collect::<Vec<_>>(),
            expected(&keys, |k| k.contains(needle.as_str()))
        );
    }

    #[test]
    fn prop_page_requests_follow_page_size(
        count in 0usize..50,
        page_size in 1usize..10,
    ) {
        let keys: BTreeSet<String> = (0..count).map(|i| format!("{}/f{:03}", PREFIX, i)).collect();
        let store = populate(page_size, &keys);

        list_matching(&store, BUCKET, PREFIX, &KeyFilter::Any).unwrap();

        let pages = if count == 0 { 1 } else { (count + page_size - 1) / page_size };
        prop_assert_eq!(store.list_calls(), pages);
    }
}

#[test]
fn test_directory_markers_never_listed() {
    let store = InMemoryObjectStore::with_page_size(1);
    store.put_object(BUCKET, "c1/dc1/n1/data/", b"");
    store.put_object(BUCKET, "c1/dc1/n1/data/ks/", b"");
    store.put_object(BUCKET, "c1/dc1/n1/data/ks/t1", b"x");

    let listed = list_matching(&store, BUCKET, PREFIX, &KeyFilter::Any).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, "c1/dc1/n1/data/ks/t1");
}

#[test]
fn test_streaming_stops_requesting_after_last_page() {
    let store = InMemoryObjectStore::with_page_size(3);
    for i in 0..9 {
        store.put_object(BUCKET, &format!("{}/f{}", PREFIX, i), b"x");
    }

    let mut seen = 0;
    for_each_matching(&store, BUCKET, PREFIX, &KeyFilter::Any, |_| seen += 1).unwrap();

    assert_eq!(seen, 9);
    assert_eq!(store.list_calls(), 3);
}
