//! Expands `{{path}}` and `##VAR:kind:name##` markers inside any `Value`
//! tree, using the current iteration context for resolution.

use crate::value::{resolve_path, Value};
use regex::Regex;
use std::sync::OnceLock;

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"##VAR:(string|unquoted):([A-Za-z0-9_.\[\]]+)##").unwrap())
}

fn path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([A-Za-z0-9_.\[\]]+)\}\}").unwrap())
}

/// Recursively substitute markers in `input` using `ctx`.
pub fn substitute(input: &Value, ctx: &Value) -> Value {
    match input {
        Value::String(s) => substitute_string(s, ctx),
        Value::List(items) => Value::List(items.iter().map(|v| substitute(v, ctx)).collect()),
        Value::Map(map) => {
            let mut out = indexmap::IndexMap::with_capacity(map.len());
            for (k, v) in map {
                let key_value = substitute_string(k, ctx);
                let key = key_value.to_display_string();
                out.insert(key, substitute(v, ctx));
            }
            Value::Map(out)
        }
        other => other.clone(),
    }
}

fn substitute_string(s: &str, ctx: &Value) -> Value {
    if let Some(name) = whole_unquoted_marker(s) {
        return resolve_path(ctx, &name).cloned().unwrap_or(Value::Null);
    }

    let mut result = String::with_capacity(s.len());
    let mut last_end = 0;

    // Collect both marker kinds in source order so expansion happens left to
    // right regardless of which grammar is used at a given position.
    let mut matches: Vec<(usize, usize, String)> = Vec::new();
    for m in marker_re().find_iter(s) {
        let caps = marker_re().captures(m.as_str()).unwrap();
        let name = caps.get(2).unwrap().as_str().to_string();
        matches.push((m.start(), m.end(), name));
    }
    for m in path_re().find_iter(s) {
        let caps = path_re().captures(m.as_str()).unwrap();
        let name = caps.get(1).unwrap().as_str().to_string();
        matches.push((m.start(), m.end(), name));
    }
    matches.sort_by_key(|(start, _, _)| *start);

    for (start, end, name) in matches {
        if start < last_end {
            // Overlapping match (shouldn't happen with disjoint grammars);
            // skip defensively rather than panic on a malformed marker.
            continue;
        }
        result.push_str(&s[last_end..start]);
        let resolved = resolve_path(ctx, &name);
        let rendered = resolved.map(|v| v.to_display_string()).unwrap_or_default();
        result.push_str(&rendered);
        last_end = end;
    }
    result.push_str(&s[last_end..]);
    Value::String(result)
}

/// Returns `Some(name)` iff `s` is *exactly* one `##VAR:unquoted:name##`
/// marker with nothing else around it.
fn whole_unquoted_marker(s: &str) -> Option<String> {
    let caps = marker_re().captures(s)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 || whole.end() != s.len() {
        return None;
    }
    if caps.get(1)?.as_str() != "unquoted" {
        return None;
    }
    Some(caps.get(2)?.as_str().to_string())
}
