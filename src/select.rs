//! Resource selection
//!
//! Commands never list or delete anything unless the user selected
//! something: explicit ids, `-a` (all), an attribute filter (`-f`), a
//! tag filter (`-q`), or a name pattern (`-m`). A selector with none of
//! these reports no selection and the command does nothing.

use std::collections::BTreeMap;

use aws_sdk_ec2::types::{Filter, Tag};
use regex::Regex;

use crate::error::CmdError;

#[derive(Debug, Default)]
pub struct ResourceSelector {
    pub select_all: bool,
    pub resource_ids: Vec<String>,
    // Flat map: adding a second tag filter overwrites the first. This
    // mirrors the filter representation the query APIs expect and is
    // documented behavior, not an accident.
    filters: BTreeMap<String, String>,
    pub match_pattern: Option<Regex>,
}

impl ResourceSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff any selection criterion is set. Callers treat "no
    /// selection" as "do nothing".
    pub fn has_selection(&self) -> bool {
        self.select_all
            || !self.resource_ids.is_empty()
            || !self.filters.is_empty()
            || self.match_pattern.is_some()
    }

    /// True iff an explicit id list was given; destructive commands may
    /// then act on the ids directly without a pre-query.
    pub fn is_explicit(&self) -> bool {
        !self.resource_ids.is_empty()
    }

    pub fn add_filter(&mut self, key: &str, value: &str) {
        self.filters.insert(key.to_string(), value.to_string());
    }

    /// Parse a `key=value` attribute filter spec.
    pub fn add_filter_spec(&mut self, spec: &str) -> Result<(), CmdError> {
        match spec.split_once('=') {
            Some((key, value)) => {
                self.add_filter(key, value);
                Ok(())
            }
            None => Err(CmdError::input(format!("Bad filter spec: {spec}"))),
        }
    }

    /// Parse a tag filter spec:
    ///
    /// ```text
    /// spec          filter-name     filter-value
    /// key=value     tag:<key>       value
    /// key           tag-key         key
    /// =value        tag-value       value
    /// ```
    pub fn add_tag_filter_spec(&mut self, spec: &str) {
        match spec.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                self.filters.insert(format!("tag:{key}"), value.to_string());
            }
            Some((_, value)) => {
                self.filters
                    .insert("tag-value".to_string(), value.to_string());
            }
            None => {
                self.filters.insert("tag-key".to_string(), spec.to_string());
            }
        }
    }

    /// Take the positional args as resource ids; anything not carrying
    /// the expected prefix is treated as a Name tag value, so resources
    /// can be listed by name.
    pub fn set_resource_ids(&mut self, args: Vec<String>, res_prefix: Option<&str>) {
        let mut ids = Vec::new();
        for arg in args {
            match res_prefix {
                Some(prefix) if !arg.starts_with(prefix) => {
                    self.add_tag_filter_spec(&format!("Name={arg}"));
                }
                _ => ids.push(arg),
            }
        }
        self.resource_ids = ids;
    }

    pub fn set_match_pattern(&mut self, pattern: &str) -> Result<(), CmdError> {
        let re = Regex::new(pattern)
            .map_err(|e| CmdError::input(format!("Bad name pattern '{pattern}': {e}")))?;
        self.match_pattern = Some(re);
        Ok(())
    }

    /// Explicit ids, or None when the query should not be id-scoped.
    pub fn ids(&self) -> Option<Vec<String>> {
        if self.resource_ids.is_empty() {
            None
        } else {
            Some(self.resource_ids.clone())
        }
    }

    /// The attribute/tag filters as EC2 `Filter` values, or None when no
    /// filter is set. Ordering is deterministic (sorted by key).
    pub fn ec2_filters(&self) -> Option<Vec<Filter>> {
        if self.filters.is_empty() {
            return None;
        }
        Some(
            self.filters
                .iter()
                .map(|(key, value)| Filter::builder().name(key).values(value).build())
                .collect(),
        )
    }

    /// Lazy post-filter on the `Name` tag for APIs that cannot filter by
    /// name server-side. Without a pattern every resource passes.
    pub fn filter_resources<'a, T, I, F>(
        &'a self,
        resources: I,
        tags_of: F,
    ) -> impl Iterator<Item = T> + 'a
    where
        T: 'a,
        I: Iterator<Item = T> + 'a,
        F: Fn(&T) -> &[Tag] + 'a,
    {
        resources.filter(move |resource| {
            let Some(pattern) = &self.match_pattern else {
                return true;
            };
            tag_value(tags_of(resource), "Name")
                .map(|name| pattern.is_match(name))
                .unwrap_or(false)
        })
    }
}

/// Value of the tag named `key`, if present.
pub fn tag_value<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.key() == Some(key))
        .and_then(|tag| tag.value())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_names(selector: &ResourceSelector) -> Vec<(String, String)> {
        selector
            .ec2_filters()
            .unwrap_or_default()
            .into_iter()
            .map(|f| {
                (
                    f.name().unwrap_or_default().to_string(),
                    f.values().first().cloned().unwrap_or_default(),
                )
            })
            .collect()
    }

    #[test]
    fn fresh_selector_has_no_selection() {
        assert!(!ResourceSelector::new().has_selection());
    }

    #[test]
    fn each_criterion_triggers_selection() {
        let mut s = ResourceSelector::new();
        s.select_all = true;
        assert!(s.has_selection());

        let mut s = ResourceSelector::new();
        s.set_resource_ids(vec!["vol-1".to_string()], Some("vol-"));
        assert!(s.has_selection());
        assert!(s.is_explicit());

        let mut s = ResourceSelector::new();
        s.add_filter("status", "available");
        assert!(s.has_selection());

        let mut s = ResourceSelector::new();
        s.add_tag_filter_spec("env=prod");
        assert!(s.has_selection());

        let mut s = ResourceSelector::new();
        s.set_match_pattern("web-.*").unwrap();
        assert!(s.has_selection());
        assert!(!s.is_explicit());
    }

    #[test]
    fn tag_filter_forms() {
        let mut s = ResourceSelector::new();
        s.add_tag_filter_spec("Name=foo");
        assert_eq!(
            filter_names(&s),
            vec![("tag:Name".to_string(), "foo".to_string())]
        );

        let mut s = ResourceSelector::new();
        s.add_tag_filter_spec("Name");
        assert_eq!(
            filter_names(&s),
            vec![("tag-key".to_string(), "Name".to_string())]
        );

        let mut s = ResourceSelector::new();
        s.add_tag_filter_spec("=staging");
        assert_eq!(
            filter_names(&s),
            vec![("tag-value".to_string(), "staging".to_string())]
        );
    }

    // The flat filter map allows only one active tag filter; the last
    // spec wins. Documented behavior - do not "fix".
    #[test]
    fn tag_filter_last_write_wins() {
        let mut s = ResourceSelector::new();
        s.add_tag_filter_spec("Name=foo");
        s.add_tag_filter_spec("Name=bar");
        assert_eq!(
            filter_names(&s),
            vec![("tag:Name".to_string(), "bar".to_string())]
        );
    }

    #[test]
    fn bad_filter_spec_is_rejected() {
        let mut s = ResourceSelector::new();
        assert!(s.add_filter_spec("no-equals-sign").is_err());
        assert!(!s.has_selection());
    }

    #[test]
    fn non_prefixed_args_become_name_filters() {
        let mut s = ResourceSelector::new();
        s.set_resource_ids(
            vec!["i-0abc".to_string(), "webserver".to_string()],
            Some("i-"),
        );
        assert_eq!(s.resource_ids, vec!["i-0abc"]);
        assert_eq!(
            filter_names(&s),
            vec![("tag:Name".to_string(), "webserver".to_string())]
        );
    }

    #[test]
    fn name_post_filter_is_lazy_and_matches_substrings() {
        let mut s = ResourceSelector::new();
        s.set_match_pattern("db").unwrap();

        let resources = vec![
            ("a", vec![Tag::builder().key("Name").value("db-primary").build()]),
            ("b", vec![Tag::builder().key("Name").value("web-1").build()]),
            ("c", Vec::new()),
        ];
        let kept: Vec<&str> = s
            .filter_resources(resources.iter(), |(_, tags)| tags.as_slice())
            .map(|(name, _)| *name)
            .collect();
        assert_eq!(kept, vec!["a"]);
    }
}
