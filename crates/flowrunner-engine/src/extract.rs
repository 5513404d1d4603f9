//! Pulls response-derived values into the context.

use crate::value::{resolve_path, Value};
use indexmap::IndexMap;
use std::collections::HashMap;

/// A transport-agnostic view of an HTTP response, decoupled from `reqwest`
/// so the extractor stays unit-testable without a network stack.
pub struct ResponseView {
    pub status: u16,
    /// Header name (as received) -> all values, in arrival order.
    pub headers: HashMap<String, Vec<String>>,
    pub body_bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl ResponseView {
    fn header_value(&self, name: &str) -> Option<String> {
        let lower = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == lower)
            .map(|(_, values)| values.join(", "))
    }

    fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
            .unwrap_or(false)
    }

    fn parsed_body(&self) -> Option<Value> {
        if self.is_json() {
            let text = std::str::from_utf8(&self.body_bytes).ok()?;
            serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .map(Value::from)
        } else {
            None
        }
    }

    fn raw_body_string(&self) -> Value {
        Value::String(String::from_utf8_lossy(&self.body_bytes).to_string())
    }
}

/// Apply every `{target_var_name: path_expr}` rule, writing results (or
/// `Value::Null` on failure, with a warning) into `ctx`.
pub fn extract(rules: &HashMap<String, String>, response: &ResponseView, ctx: &mut Value) {
    for (target, path_expr) in rules {
        if target.is_empty() || path_expr.is_empty() {
            tracing::warn!(target, path_expr, "skipping extraction with empty name/path");
            continue;
        }
        let value = extract_one(path_expr, response);
        if let Some(map) = ctx.as_map_mut() {
            map.insert(target.clone(), value.unwrap_or(Value::Null));
        }
        if value_is_none(path_expr, response) {
            tracing::warn!(target, path_expr, "extraction failed; assigned null");
        }
    }
}

fn value_is_none(path_expr: &str, response: &ResponseView) -> bool {
    extract_one(path_expr, response).is_none()
}

fn extract_one(path_expr: &str, response: &ResponseView) -> Option<Value> {
    if path_expr == ".status" {
        return Some(Value::Number(response.status as f64));
    }
    if let Some(header_name) = path_expr.strip_prefix("headers.") {
        return response.header_value(header_name).map(Value::String);
    }
    if path_expr == "body" {
        return Some(response.parsed_body().unwrap_or_else(|| response.raw_body_string()));
    }
    let body_path = path_expr
        .strip_prefix("body.")
        .unwrap_or(path_expr);
    let body = response.parsed_body()?;
    resolve_path(&body, body_path).cloned()
}

/// Convenience constructor matching the `ResponseView` contract from a
/// decoded body, used by tests and by the executor once a response is read.
pub fn response_view(
    status: u16,
    headers: IndexMap<String, Vec<String>>,
    body_bytes: Vec<u8>,
    content_type: Option<String>,
) -> ResponseView {
    ResponseView {
        status,
        headers: headers.into_iter().collect(),
        body_bytes,
        content_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_response(body: &str, status: u16) -> ResponseView {
        ResponseView {
            status,
            headers: HashMap::new(),
            body_bytes: body.as_bytes().to_vec(),
            content_type: Some("application/json".to_string()),
        }
    }

    #[test]
    fn extracts_status() {
        let resp = json_response("{}", 200);
        let mut ctx = Value::map();
        extract(
            &HashMap::from([("s".to_string(), ".status".to_string())]),
            &resp,
            &mut ctx,
        );
        assert_eq!(ctx.as_map().unwrap()["s"], Value::Number(200.0));
    }

    #[test]
    fn extracts_implicit_body_path() {
        let resp = json_response(r#"{"user":{"id":42}}"#, 200);
        let mut ctx = Value::map();
        extract(
            &HashMap::from([("uid".to_string(), "user.id".to_string())]),
            &resp,
            &mut ctx,
        );
        assert_eq!(ctx.as_map().unwrap()["uid"], Value::Number(42.0));
    }

    #[test]
    fn joins_repeated_headers_with_comma() {
        let mut headers = HashMap::new();
        headers.insert(
            "Set-Cookie".to_string(),
            vec!["a=1".to_string(), "b=2".to_string()],
        );
        let resp = ResponseView {
            status: 200,
            headers,
            body_bytes: vec![],
            content_type: None,
        };
        let mut ctx = Value::map();
        extract(
            &HashMap::from([("c".to_string(), "headers.set-cookie".to_string())]),
            &resp,
            &mut ctx,
        );
        assert_eq!(
            ctx.as_map().unwrap()["c"],
            Value::String("a=1, b=2".to_string())
        );
    }

    #[test]
    fn missing_path_assigns_null() {
        let resp = json_response(r#"{"a":1}"#, 200);
        let mut ctx = Value::map();
        extract(
            &HashMap::from([("x".to_string(), "b.c".to_string())]),
            &resp,
            &mut ctx,
        );
        assert_eq!(ctx.as_map().unwrap()["x"], Value::Null);
    }

    #[test]
    fn non_json_body_falls_back_to_raw_string() {
        let resp = ResponseView {
            status: 200,
            headers: HashMap::new(),
            body_bytes: b"plain text".to_vec(),
            content_type: Some("text/plain".to_string()),
        };
        let mut ctx = Value::map();
        extract(
            &HashMap::from([("body".to_string(), "body".to_string())]),
            &resp,
            &mut ctx,
        );
        assert_eq!(
            ctx.as_map().unwrap()["body"],
            Value::String("plain text".to_string())
        );
    }
}
