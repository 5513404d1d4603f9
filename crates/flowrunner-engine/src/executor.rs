//! Performs one HTTP request with retries and records metrics.

use crate::error::RequestError;
use crate::extract::ResponseView;
use crate::metrics::Metrics;
use crate::url_builder::BuiltRequest;
use crate::value::Value;
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

pub enum ExecOutcome {
    Responded(ResponseView),
    /// Non-retryable network failure, or retries exhausted.
    Failed(RequestError),
}

#[derive(Clone, Copy)]
pub struct MethodSpec(pub reqwest::Method, pub bool);

/// Merge headers in order (session defaults -> flow globals -> step
/// headers, later wins, case-insensitive key match) and inject the XFF
/// header.
fn merge_headers(
    session_defaults: &[(String, String)],
    flow_headers: &HashMap<String, String>,
    step_headers: &IndexMap<String, Value>,
    xff_header_name: &str,
    source_ip: &str,
) -> IndexMap<String, String> {
    let mut merged: IndexMap<String, String> = IndexMap::new();
    let mut lower_to_key: HashMap<String, String> = HashMap::new();

    let mut set = |merged: &mut IndexMap<String, String>,
                   lower_to_key: &mut HashMap<String, String>,
                   key: &str,
                   value: String| {
        let lower = key.to_ascii_lowercase();
        if let Some(existing_key) = lower_to_key.get(&lower) {
            merged.insert(existing_key.clone(), value);
        } else {
            lower_to_key.insert(lower, key.to_string());
            merged.insert(key.to_string(), value);
        }
    };

    for (k, v) in session_defaults {
        set(&mut merged, &mut lower_to_key, k, v.clone());
    }
    for (k, v) in flow_headers {
        set(&mut merged, &mut lower_to_key, k, v.clone());
    }
    for (k, v) in step_headers {
        set(&mut merged, &mut lower_to_key, k, v.to_display_string());
    }
    set(
        &mut merged,
        &mut lower_to_key,
        xff_header_name,
        source_ip.to_string(),
    );
    merged
}

fn build_body(body: Option<&Value>, no_body_method: bool) -> Option<(Vec<u8>, Option<&'static str>)> {
    if no_body_method {
        return None;
    }
    let body = body?;
    match body {
        Value::Null => None,
        Value::Map(_) | Value::List(_) => {
            let json: Json = body.clone().into();
            Some((serde_json::to_vec(&json).unwrap_or_default(), Some("application/json")))
        }
        Value::String(s) => Some((s.clone().into_bytes(), None)),
        other => Some((other.to_display_string().into_bytes(), None)),
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    client: &reqwest::Client,
    method: MethodSpec,
    built: &BuiltRequest,
    session_defaults: &[(String, String)],
    flow_headers: &HashMap<String, String>,
    step_headers: &IndexMap<String, Value>,
    xff_header_name: &str,
    source_ip: &str,
    body: Option<&Value>,
    metrics: &Arc<Metrics>,
) -> ExecOutcome {
    let merged_headers = merge_headers(
        session_defaults,
        flow_headers,
        step_headers,
        xff_header_name,
        source_ip,
    );
    let body_payload = build_body(body, method.1);

    let mut attempt = 0u32;
    loop {
        let mut request = client.request(method.0.clone(), &built.url);
        let mut headers = HeaderMap::new();
        for (k, v) in &merged_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                headers.insert(name, value);
            }
        }
        if let Some(host_header) = &built.host_header {
            if let Ok(value) = HeaderValue::from_str(host_header) {
                headers.insert(reqwest::header::HOST, value);
            }
        }
        if let Some((bytes, content_type)) = &body_payload {
            if let Some(ct) = content_type.copied() {
                if !headers.contains_key(reqwest::header::CONTENT_TYPE) {
                    headers.insert(
                        reqwest::header::CONTENT_TYPE,
                        HeaderValue::from_static(ct),
                    );
                }
            }
            request = request.body(bytes.clone());
        }
        request = request.headers(headers).timeout(REQUEST_TIMEOUT);

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if let Some(classified) = classify_server_error(status) {
                    if attempt < MAX_RETRIES {
                        tracing::debug!(attempt, error = %classified, "retrying after server error");
                        attempt += 1;
                        tokio::time::sleep(backoff(attempt)).await;
                        continue;
                    }
                }
                let view = to_response_view(response).await;
                metrics.record_request();
                return ExecOutcome::Responded(view);
            }
            Err(err) => {
                let classified = classify_network_error(&err);
                let retryable = !err.is_builder() && !err.is_redirect();
                if retryable && attempt < MAX_RETRIES {
                    attempt += 1;
                    tokio::time::sleep(backoff(attempt)).await;
                    continue;
                }
                // A builder error never reached the wire; it is not a
                // dispatched request, so it must not inflate total_requests.
                if !err.is_builder() {
                    metrics.record_request();
                }
                return ExecOutcome::Failed(classified);
            }
        }
    }
}

/// `Some` when the response status warrants a retry decision.
fn classify_server_error(status: reqwest::StatusCode) -> Option<RequestError> {
    if status.is_server_error() {
        Some(RequestError::ServerError(status.as_u16()))
    } else {
        None
    }
}

fn classify_network_error(err: &reqwest::Error) -> RequestError {
    if err.is_timeout() {
        RequestError::Timeout
    } else {
        RequestError::Network(err.to_string())
    }
}

fn backoff(attempt: u32) -> Duration {
    INITIAL_BACKOFF * 2u32.pow(attempt.min(6))
}

async fn to_response_view(response: reqwest::Response) -> ResponseView {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let mut headers: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in response.headers().iter() {
        if let Ok(value_str) = value.to_str() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(value_str.to_string());
        }
    }
    let body_bytes = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
    ResponseView {
        status,
        headers,
        body_bytes,
        content_type,
    }
}
