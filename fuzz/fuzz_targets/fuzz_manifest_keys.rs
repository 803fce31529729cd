#![no_main]
use blob_restore::{select_latest_key, ManifestTimestamp};
use libfuzzer_sys::fuzz_target;

// Arbitrary keys must never panic the timestamp parser, and selection
// must agree with the pairwise ordering.
fuzz_target!(|keys: Vec<String>| {
    for key in &keys {
        if let Some(ts) = ManifestTimestamp::parse(key) {
            assert!(ts.as_str().bytes().all(|b| b.is_ascii_digit()));
            assert!(ts.as_str() == "0" || !ts.as_str().starts_with('0'));
            let _ = ts.to_datetime();
        }
    }

    if let Some(latest) = select_latest_key(keys.iter().map(String::as_str)) {
        let latest_ts = ManifestTimestamp::parse(latest);
        for key in &keys {
            assert!(ManifestTimestamp::parse(key) <= latest_ts);
        }
    } else {
        assert!(keys.is_empty());
    }
});
