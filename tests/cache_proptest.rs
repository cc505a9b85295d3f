//! Property-based tests for the resource-id cache and selector.
//!
//! The cache feeds tab completion and is updated by every listing,
//! creation, and deletion, so it has to hold up under arbitrary id
//! shapes without ever erroring.

use proptest::prelude::*;

use awsh::cache::ResourceCache;
use awsh::select::ResourceSelector;

/// An id with a separator: type prefix + '-' + suffix.
fn arb_good_id() -> impl Strategy<Value = String> {
    ("[a-z]{1,8}", "[0-9a-f]{1,17}").prop_map(|(prefix, suffix)| format!("{prefix}-{suffix}"))
}

/// Arbitrary junk that may or may not contain a separator.
fn arb_any_id() -> impl Strategy<Value = String> {
    prop_oneof![arb_good_id(), "[a-zA-Z0-9_.]{0,16}", Just(String::new())]
}

proptest! {
    /// Everything inserted with a separator is found again under its
    /// type with an empty prefix.
    #[test]
    fn insert_then_lookup_roundtrip(ids in prop::collection::vec(arb_good_id(), 0..50)) {
        let mut cache = ResourceCache::new();
        cache.insert(ids.iter());
        for id in &ids {
            let (res_type, suffix) = id.split_once('-').unwrap();
            let found = cache.lookup(res_type, "");
            prop_assert!(found.iter().any(|s| s == suffix));
        }
    }

    /// Remove undoes insert.
    #[test]
    fn remove_undoes_insert(ids in prop::collection::vec(arb_good_id(), 1..50)) {
        let mut cache = ResourceCache::new();
        cache.insert(ids.iter());
        cache.remove(ids.iter());
        for id in &ids {
            let (res_type, _) = id.split_once('-').unwrap();
            prop_assert!(cache.lookup(res_type, "").is_empty());
        }
    }

    /// Lookup results always start with the requested prefix.
    #[test]
    fn lookup_respects_prefix(
        ids in prop::collection::vec(arb_good_id(), 0..50),
        res_type in "[a-z]{1,8}",
        prefix in "[0-9a-f]{0,4}",
    ) {
        let mut cache = ResourceCache::new();
        cache.insert(ids.iter());
        for suffix in cache.lookup(&res_type, &prefix) {
            prop_assert!(suffix.starts_with(&prefix));
        }
    }

    /// Arbitrary malformed input never panics and never invents
    /// entries for separator-less ids.
    #[test]
    fn malformed_ids_are_tolerated(ids in prop::collection::vec(arb_any_id(), 0..50)) {
        let mut cache = ResourceCache::new();
        cache.insert(ids.iter());
        cache.remove(ids.iter());
        for id in &ids {
            if !id.contains('-') {
                prop_assert!(cache.lookup(id, "").is_empty());
            }
        }
    }

    /// Lookup order is deterministic for a fixed cache state.
    #[test]
    fn lookup_is_deterministic(ids in prop::collection::vec(arb_good_id(), 0..50)) {
        let mut cache = ResourceCache::new();
        cache.insert(ids.iter());
        for id in &ids {
            let (res_type, _) = id.split_once('-').unwrap();
            prop_assert_eq!(cache.lookup(res_type, ""), cache.lookup(res_type, ""));
        }
    }

    /// A selector only reports a selection when a criterion was set.
    #[test]
    fn selector_selection_tracks_filters(key in "[a-z-]{1,10}", value in "[a-z0-9]{0,10}") {
        let mut selector = ResourceSelector::new();
        prop_assert!(!selector.has_selection());
        selector.add_filter(&key, &value);
        prop_assert!(selector.has_selection());
    }
}
