//! Resource-id cache
//!
//! Every resource id printed by a command is remembered here, keyed by
//! its type prefix ("vol", "i", "subnet", ...), so the shell can offer
//! prefix completion on ids the user has already seen. Ids are
//! region-scoped, so the cache is cleared whenever the default region or
//! the credentials change.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct ResourceCache {
    // Key: resource type (ex. "vpc", "vol", "i")
    // Value: set of id suffixes
    contents: HashMap<String, BTreeSet<String>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the given resource ids to the cache. Ids without a `-`
    /// separator are silently ignored; this must tolerate arbitrary
    /// malformed input since ids come straight from API responses.
    pub fn insert<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            if let Some((res_type, suffix)) = id.as_ref().split_once('-') {
                if res_type.is_empty() {
                    continue;
                }
                self.contents
                    .entry(res_type.to_string())
                    .or_default()
                    .insert(suffix.to_string());
            }
        }
    }

    /// Remove the given resource ids. Removing an id that was never
    /// cached is a no-op.
    pub fn remove<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            if let Some((res_type, suffix)) = id.as_ref().split_once('-') {
                if let Some(set) = self.contents.get_mut(res_type) {
                    set.remove(suffix);
                }
            }
        }
    }

    /// All cached suffixes of `res_type` starting with `prefix`, in a
    /// deterministic order.
    pub fn lookup(&self, res_type: &str, prefix: &str) -> Vec<String> {
        match self.contents.get(res_type) {
            Some(set) => set
                .iter()
                .filter(|suffix| suffix.starts_with(prefix))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Drop one resource type's ids, or everything.
    pub fn clear(&mut self, res_type: Option<&str>) {
        match res_type {
            Some(res_type) => {
                self.contents.remove(res_type);
            }
            None => self.contents.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup_returns_suffix() {
        let mut cache = ResourceCache::new();
        cache.insert(["vol-0123abcd"]);
        assert_eq!(cache.lookup("vol", ""), vec!["0123abcd"]);
        assert_eq!(cache.lookup("vol", "01"), vec!["0123abcd"]);
        assert!(cache.lookup("vol", "9").is_empty());
    }

    #[test]
    fn remove_then_lookup_is_empty() {
        let mut cache = ResourceCache::new();
        cache.insert(["vol-0123abcd"]);
        cache.remove(["vol-0123abcd"]);
        assert!(cache.lookup("vol", "").is_empty());
    }

    #[test]
    fn remove_absent_id_is_a_noop() {
        let mut cache = ResourceCache::new();
        cache.remove(["vol-never-seen"]);
        cache.insert(["vol-1"]);
        cache.remove(["vol-2"]);
        assert_eq!(cache.lookup("vol", ""), vec!["1"]);
    }

    #[test]
    fn id_without_separator_is_ignored() {
        let mut cache = ResourceCache::new();
        cache.insert(["badid"]);
        assert!(cache.lookup("badid", "").is_empty());
        assert!(cache.lookup("", "").is_empty());
    }

    #[test]
    fn clear_scoped_and_global() {
        let mut cache = ResourceCache::new();
        cache.insert(["vol-1", "i-2"]);
        cache.clear(Some("vol"));
        assert!(cache.lookup("vol", "").is_empty());
        assert_eq!(cache.lookup("i", ""), vec!["2"]);
        cache.clear(None);
        assert!(cache.lookup("i", "").is_empty());
    }

    #[test]
    fn mixed_insert_scenario() {
        let mut cache = ResourceCache::new();
        cache.insert(["vol-111", "i-222", "badid"]);
        assert_eq!(cache.lookup("vol", "1"), vec!["111"]);
        assert_eq!(cache.lookup("i", ""), vec!["222"]);
        assert!(cache.lookup("bogus", "").is_empty());
    }

    #[test]
    fn suffix_with_further_dashes_splits_once() {
        let mut cache = ResourceCache::new();
        cache.insert(["subnet-3c95-2151"]);
        assert_eq!(cache.lookup("subnet", "3c95"), vec!["3c95-2151"]);
    }
}
