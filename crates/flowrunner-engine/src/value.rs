//! Tagged value type used for the per-iteration context tree.
//!
//! Deliberately not `serde_json::Value`: the context model needs an explicit,
//! owned notion of "ordered map" and a single place to hang coercion helpers
//! (see `condition.rs`), rather than relying on whichever dynamic typing the
//! host language would otherwise provide.

use indexmap::IndexMap;
use serde_json::Value as Json;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn map() -> Self {
        Value::Map(IndexMap::new())
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// String conversion used by the substitutor: null becomes "", complex
    /// values become compact JSON, everything else its natural string form.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Map(_) => {
                serde_json::to_string(&Json::from(self.clone())).unwrap_or_default()
            }
        }
    }

    /// Recursive clone used at branch and loop entry. Since
    /// `Value` already derives `Clone` via owned fields this is just `clone`,
    /// kept as a named method so call sites document *why* they are copying.
    pub fn deep_clone(&self) -> Value {
        self.clone()
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            Json::String(s) => Value::String(s),
            Json::Array(a) => Value::List(a.into_iter().map(Value::from).collect()),
            Json::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for Json {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(b),
            Value::Number(n) => serde_json::Number::from_f64(n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s),
            Value::List(l) => Json::Array(l.into_iter().map(Json::from).collect()),
            Value::Map(m) => {
                Json::Object(m.into_iter().map(|(k, v)| (k, Json::from(v))).collect())
            }
        }
    }
}

/// Sentinel-preserving path resolver. `None` means MISSING (absent key, out
/// of range index, or a path segment applied to the wrong shape); `Some` may
/// still wrap `Value::Null` when the value is present but null.
///
/// Grammar: segments separated by `.`, each segment optionally followed by
/// one or more `[N]` integer indices. Empty paths, a leading `[`, and a
/// trailing `.` are all rejected as malformed (treated as MISSING).
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path)?;
    let mut current = root;
    for segment in segments {
        match segment {
            PathSegment::Key(key) => {
                current = current.as_map()?.get(&key)?;
            }
            PathSegment::Index(index) => {
                current = current.as_list()?.get(index)?;
            }
        }
    }
    Some(current)
}

/// Write a value at `path`, creating intermediate maps as needed but never
/// growing lists. Returns `false` if the write target is structurally
/// incompatible with the path (e.g. indexing past the end of an existing
/// list, or indexing into a non-list).
pub fn write_path(root: &mut Value, path: &str, value: Value) -> bool {
    let Some(segments) = parse_path(path) else {
        return false;
    };
    write_segments(root, &segments, value)
}

fn write_segments(current: &mut Value, segments: &[PathSegment], value: Value) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        *current = value;
        return true;
    };
    match head {
        PathSegment::Key(key) => {
            if matches!(current, Value::Null) {
                *current = Value::map();
            }
            let Some(map) = current.as_map_mut() else {
                return false;
            };
            if rest.is_empty() {
                map.insert(key.clone(), value);
                return true;
            }
            let entry = map.entry(key.clone()).or_insert(Value::Null);
            write_segments(entry, rest, value)
        }
        PathSegment::Index(index) => {
            let Some(list) = current.as_list_mut() else {
                return false;
            };
            let Some(slot) = list.get_mut(*index) else {
                return false;
            };
            if rest.is_empty() {
                *slot = value;
                return true;
            }
            write_segments(slot, rest, value)
        }
    }
}

impl Value {
    fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    if path.is_empty() || path.ends_with('.') || path.starts_with('[') {
        return None;
    }
    let mut segments = Vec::new();
    for dot_segment in path.split('.') {
        if dot_segment.is_empty() {
            return None;
        }
        let key_end = dot_segment.find('[').unwrap_or(dot_segment.len());
        let key = &dot_segment[..key_end];
        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        }
        let mut rest = &dot_segment[key_end..];
        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return None;
            }
            let close = rest.find(']')?;
            let index: usize = rest[1..close].parse().ok()?;
            segments.push(PathSegment::Index(index));
            rest = &rest[close + 1..];
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::Map(IndexMap::from([
            (
                "a".to_string(),
                Value::Map(IndexMap::from([(
                    "b".to_string(),
                    Value::List(vec![Value::Number(1.0), Value::Number(2.0)]),
                )])),
            ),
            ("n".to_string(), Value::Null),
        ]))
    }

    #[test]
    fn resolves_nested_index() {
        let v = sample();
        assert_eq!(resolve_path(&v, "a.b[1]"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn missing_distinct_from_null() {
        let v = sample();
        assert_eq!(resolve_path(&v, "n"), Some(&Value::Null));
        assert_eq!(resolve_path(&v, "missing"), None);
    }

    #[test]
    fn bare_segment_on_list_is_missing() {
        let v = sample();
        assert_eq!(resolve_path(&v, "a.b.foo"), None);
    }

    #[test]
    fn out_of_range_index_is_missing() {
        let v = sample();
        assert_eq!(resolve_path(&v, "a.b[5]"), None);
    }

    #[test]
    fn empty_path_is_invalid() {
        let v = sample();
        assert_eq!(resolve_path(&v, ""), None);
    }

    #[test]
    fn write_creates_intermediate_maps() {
        let mut v = Value::map();
        assert!(write_path(&mut v, "a.b.c", Value::Number(7.0)));
        assert_eq!(resolve_path(&v, "a.b.c"), Some(&Value::Number(7.0)));
    }

    #[test]
    fn write_never_grows_lists() {
        let mut v = sample();
        assert!(!write_path(&mut v, "a.b[5].c", Value::Number(1.0)));
    }
}
