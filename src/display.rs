//! Display options and render helpers
//!
//! Commands render one resource at a time at one of three verbosity
//! levels: simple (just the id), long (a fixed-width line), extended
//! (a multi-line `Key : value` block). The flags here are built fresh
//! per invocation and discarded afterwards.

use std::path::PathBuf;

use aws_sdk_ec2::types::Tag;
use aws_smithy_types::DateTime;
use chrono::{Local, TimeZone};

use crate::output::CommandOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Just the resource id.
    #[default]
    Simple,
    /// More info, one resource per line.
    Long,
    /// Even more info, multiple lines per resource.
    Extended,
}

#[derive(Debug, Default)]
pub struct DisplayOptions {
    pub verbosity: Verbosity,
    pub show_tags: bool,
    pub show_name: bool,
    pub show_size: bool,
    pub show_count: bool,
    pub output_file: Option<PathBuf>,
}

impl DisplayOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Maps empty/missing strings to a placeholder.
pub fn optional(s: Option<&str>) -> &str {
    match s {
        Some(s) if !s.is_empty() => s,
        _ => "-",
    }
}

/// Render an AWS timestamp in local time, `YYYY-MM-DD HH:MM:SS`.
pub fn local_time(dt: Option<&DateTime>) -> String {
    let Some(dt) = dt else {
        return "-".to_string();
    };
    match Local.timestamp_opt(dt.secs(), 0).single() {
        Some(local) => local.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

/// Render an RFC3339 timestamp string (some APIs return strings rather
/// than timestamps) in local time.
pub fn local_time_str(s: Option<&str>) -> String {
    let Some(s) = s else {
        return "-".to_string();
    };
    match chrono::DateTime::parse_from_rfc3339(s) {
        Ok(parsed) => parsed
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        Err(_) => s.to_string(),
    }
}

/// Dump tags sorted by key, in the extended-display style.
pub fn display_tags(out: &mut CommandOutput, tags: &[Tag]) {
    let mut sorted: Vec<(&str, &str)> = tags
        .iter()
        .map(|tag| (tag.key().unwrap_or(""), tag.value().unwrap_or("")))
        .collect();
    sorted.sort();
    for (key, value) in sorted {
        out.line(format!("{:>15} : {:>12} = {}", "TAG", key, value));
    }
}

/// Apply an ordered list of `(key, descending)` sorts so that the first
/// listed key is the primary sort key.
pub fn order_by<T, K, F>(items: &mut [T], specs: &[(K, bool)], key_of: F)
where
    K: Copy,
    F: Fn(&T, K) -> SortValue,
{
    for (key, descending) in specs.iter().rev() {
        items.sort_by(|a, b| {
            let ord = key_of(a, *key).cmp(&key_of(b, *key));
            if *descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }
}

/// A sort key value: commands map each `-o` attribute to one of these
/// through an explicit enum, never through reflection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortValue {
    Int(i64),
    Text(String),
}

/// Parse an `-o` order spec, `[~]attr[,[~]attr]...`, against the
/// command's attribute table.
pub fn parse_order_spec<K: Copy>(
    spec: &str,
    table: &[(&str, K)],
) -> Result<Vec<(K, bool)>, crate::error::CmdError> {
    let mut specs = Vec::new();
    for part in spec.split(',') {
        let (descending, attr) = match part.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, part),
        };
        match table.iter().find(|(name, _)| *name == attr) {
            Some((_, key)) => specs.push((*key, descending)),
            None => {
                return Err(crate::error::CmdError::input(format!(
                    "Unknown sort attribute: {attr}"
                )))
            }
        }
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_maps_empty_and_missing() {
        assert_eq!(optional(None), "-");
        assert_eq!(optional(Some("")), "-");
        assert_eq!(optional(Some("x")), "x");
    }

    #[test]
    fn first_listed_sort_key_is_primary() {
        #[derive(Clone, Copy)]
        enum Key {
            Size,
            Name,
        }
        let mut items = vec![(2, "b"), (1, "a"), (2, "a")];
        let specs = vec![(Key::Size, true), (Key::Name, false)];
        order_by(&mut items, &specs, |item, key| match key {
            Key::Size => SortValue::Int(item.0),
            Key::Name => SortValue::Text(item.1.to_string()),
        });
        assert_eq!(items, vec![(2, "a"), (2, "b"), (1, "a")]);
    }

    #[test]
    fn order_spec_parses_tilde_and_rejects_unknown() {
        #[derive(Clone, Copy, PartialEq, Debug)]
        enum Key {
            Size,
            Time,
        }
        let table = [("size", Key::Size), ("time", Key::Time)];
        let specs = parse_order_spec("~size,time", &table).unwrap();
        assert_eq!(specs, vec![(Key::Size, true), (Key::Time, false)]);
        assert!(parse_order_spec("bogus", &table).is_err());
    }

    #[test]
    fn rfc3339_passthrough_on_parse_failure() {
        assert_eq!(local_time_str(Some("not-a-date")), "not-a-date");
        assert_eq!(local_time_str(None), "-");
    }
}
