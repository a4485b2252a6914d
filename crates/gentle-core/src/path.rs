//! # Paths
//!
//! Dotted/bracketed paths (`order.lines[0].sku`) address nested values.
//! They are used in three places: error locations, conditional rule
//! subjects, and raw-schema path references.

use crate::value::Value;

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Split a path into segments.
///
/// Empty segments are skipped, so `a..b` and `.a.b` both parse as
/// `[a, b]`. Bracket content that is not a non-negative integer is
/// treated as a key.
pub fn parse(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '.' => flush(&mut current, &mut segments),
            '[' => {
                flush(&mut current, &mut segments);
                let inner: String = chars.by_ref().take_while(|c| *c != ']').collect();
                if !inner.is_empty() {
                    match inner.parse::<usize>() {
                        Ok(index) => segments.push(Segment::Index(index)),
                        Err(_) => segments.push(Segment::Key(inner)),
                    }
                }
            }
            other => current.push(other),
        }
    }
    flush(&mut current, &mut segments);
    segments
}

fn flush(current: &mut String, segments: &mut Vec<Segment>) {
    if !current.is_empty() {
        segments.push(Segment::Key(std::mem::take(current)));
    }
}

/// Resolve `path` inside `root`. An empty path returns `root`.
///
/// Keys index into objects; indices index into arrays. A numeric key on
/// an array and an index on an object are both accepted.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    parse(path)
        .iter()
        .try_fold(root, |current, segment| step(current, segment))
}

fn step<'a>(current: &'a Value, segment: &Segment) -> Option<&'a Value> {
    match (current, segment) {
        (Value::Object(map), Segment::Key(key)) => map.get(key),
        (Value::Object(map), Segment::Index(index)) => map.get(&index.to_string()),
        (Value::Array(items), Segment::Index(index)) => items.get(*index),
        (Value::Array(items), Segment::Key(key)) => {
            key.parse::<usize>().ok().and_then(|index| items.get(index))
        }
        _ => None,
    }
}

/// `prefix.key`, or `key` when the prefix is empty.
pub fn key_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// `prefix[index]`, or `[index]` when the prefix is empty.
pub fn index_path(prefix: &str, index: usize) -> String {
    format!("{prefix}[{index}]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_mixed_path() {
        assert_eq!(
            parse("a.b[0].c"),
            vec![
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Index(0),
                Segment::Key("c".into()),
            ]
        );
    }

    #[test]
    fn test_parse_skips_empty_segments() {
        assert_eq!(parse(".a..b[]"), vec![Segment::Key("a".into()), Segment::Key("b".into())]);
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_parse_non_numeric_bracket_is_key() {
        assert_eq!(parse("m[x]"), vec![Segment::Key("m".into()), Segment::Key("x".into())]);
    }

    #[test]
    fn test_lookup_nested() {
        let root = Value::from(json!({"a": {"b": [{"c": 3}]}}));
        assert_eq!(lookup(&root, "a.b[0].c"), Some(&Value::from(3)));
        assert_eq!(lookup(&root, "a.b.0.c"), Some(&Value::from(3)));
        assert_eq!(lookup(&root, "a.x"), None);
        assert_eq!(lookup(&root, "a.b[5]"), None);
    }

    #[test]
    fn test_lookup_empty_path_is_root() {
        let root = Value::from(json!({"k": 1}));
        assert_eq!(lookup(&root, ""), Some(&root));
    }

    #[test]
    fn test_lookup_through_scalar_is_none() {
        let root = Value::from(json!({"k": "text"}));
        assert_eq!(lookup(&root, "k.length"), None);
    }

    #[test]
    fn test_path_builders() {
        assert_eq!(key_path("", "a"), "a");
        assert_eq!(key_path("a", "b"), "a.b");
        assert_eq!(index_path("", 2), "[2]");
        assert_eq!(index_path("tags", 0), "tags[0]");
    }
}
