#![no_main]
use arbitrary::Arbitrary;
use blob_restore::core::filter::glob_matches;
use blob_restore::{KeyFilter, KeyPredicate};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    pattern: String,
    key: String,
}

fuzz_target!(|input: Input| {
    let matched = glob_matches(&input.pattern, &input.key);

    // A pattern without wildcards matches only the key itself (modulo empty segments)
    if !input.pattern.contains('*') && matched {
        let segments = |s: &str| s.split('/').filter(|p| !p.is_empty()).map(str::to_string).collect::<Vec<_>>();
        assert_eq!(segments(&input.pattern), segments(&input.key));
    }

    assert_eq!(KeyFilter::glob(input.pattern.as_str()).test(&input.key), matched);
    assert!(glob_matches("**", &input.key));
});
