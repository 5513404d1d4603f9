//! Step dispatch loop: Request/Condition/Loop, with per-branch and
//! per-iteration context management.

use crate::executor::{self, ExecOutcome, MethodSpec};
use crate::extract;
use crate::metrics::Metrics;
use crate::model::{OnFailure, Step};
use crate::substitute::substitute;
use crate::url_builder::{self, TargetBase};
use crate::value::{resolve_path, write_path, Value};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Whether execution should continue to the next step/iteration or unwind,
/// driven by a request's `on_failure = stop` outcome.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Signal {
    Continue,
    Stop,
}

pub struct InterpEnv {
    pub client: reqwest::Client,
    pub flow_headers: HashMap<String, String>,
    pub xff_header_name: String,
    pub target_base: TargetBase,
    pub dial_ip: Option<String>,
    pub override_step_url_host: bool,
    pub min_sleep_ms: u64,
    pub max_sleep_ms: u64,
    pub source_ip: String,
    pub session_headers: Vec<(String, String)>,
    pub metrics: Arc<Metrics>,
    pub cancel: CancellationToken,
}

pub async fn execute_steps(steps: &[Step], ctx: &mut Value, env: &InterpEnv) -> Signal {
    for step in steps {
        let signal = execute_step(step, ctx, env).await;
        if cancellable_sleep(env).await == Signal::Stop {
            return Signal::Stop;
        }
        if signal == Signal::Stop {
            return Signal::Stop;
        }
    }
    Signal::Continue
}

async fn execute_step(step: &Step, ctx: &mut Value, env: &InterpEnv) -> Signal {
    match step {
        Step::Request {
            id,
            method,
            url,
            headers,
            body,
            extract: extract_rules,
            on_failure,
            ..
        } => execute_request(id, *method, url, headers, body.as_ref(), extract_rules, *on_failure, ctx, env).await,
        Step::Condition {
            condition_data,
            then,
            r#else,
            ..
        } => execute_condition(condition_data, then, r#else, ctx, env).await,
        Step::Loop {
            source,
            loop_variable,
            steps,
            ..
        } => execute_loop(source, loop_variable, steps, ctx, env).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn execute_request(
    id: &str,
    method: crate::model::Method,
    url: &str,
    headers: &HashMap<String, String>,
    body: Option<&serde_json::Value>,
    extract_rules: &HashMap<String, String>,
    on_failure: OnFailure,
    ctx: &mut Value,
    env: &InterpEnv,
) -> Signal {
    let url_value = substitute(&Value::String(url.to_string()), ctx);
    let substituted_url = url_value.to_display_string();

    let header_values: indexmap::IndexMap<String, Value> = headers
        .iter()
        .map(|(k, v)| (k.clone(), substitute(&Value::String(v.clone()), ctx)))
        .collect();

    let body_value = body.map(|b| substitute(&Value::from(b.clone()), ctx));

    let built = url_builder::build(
        &env.target_base,
        env.dial_ip.as_deref(),
        env.override_step_url_host,
        &substituted_url,
    );

    let outcome = executor::execute(
        &env.client,
        MethodSpec(method.as_reqwest(), method.has_no_body()),
        &built,
        &env.session_headers,
        &env.flow_headers,
        &header_values,
        &env.xff_header_name,
        &env.source_ip,
        body_value.as_ref(),
        &env.metrics,
    )
    .await;

    match outcome {
        ExecOutcome::Responded(response) => {
            extract::extract(extract_rules, &response, ctx);
            Signal::Continue
        }
        ExecOutcome::Failed(reason) => {
            let reason = reason.to_string();
            tracing::warn!(step_id = id, reason, "request step failed");
            if let Some(map) = ctx.as_map_mut() {
                map.insert("_flow_error".to_string(), Value::String(reason));
            }
            match on_failure {
                OnFailure::Stop => Signal::Stop,
                OnFailure::Continue => Signal::Continue,
            }
        }
    }
}

async fn execute_condition(
    condition_data: &crate::condition::ConditionData,
    then: &[Step],
    else_: &[Step],
    ctx: &mut Value,
    env: &InterpEnv,
) -> Signal {
    let variable_path = condition_data.variable.clone().unwrap_or_default();
    let resolved = resolve_path(ctx, &variable_path);
    let matched = crate::condition::evaluate(condition_data, resolved);

    let mut branch_ctx = ctx.deep_clone();
    let branch_steps = if matched { then } else { else_ };
    let signal = Box::pin(execute_steps(branch_steps, &mut branch_ctx, env)).await;
    deep_merge(ctx, branch_ctx);
    signal
}

async fn execute_loop(
    source: &str,
    loop_variable: &str,
    steps: &[Step],
    ctx: &mut Value,
    env: &InterpEnv,
) -> Signal {
    let resolved = resolve_path(ctx, source).cloned();
    let items = match resolved {
        Some(Value::List(items)) => items,
        _ => {
            tracing::warn!(source, "loop source is not a list; skipping");
            return Signal::Continue;
        }
    };

    let index_key = format!("{loop_variable}_index");
    for (index, item) in items.into_iter().enumerate() {
        let mut iter_ctx = ctx.deep_clone();
        if let Some(map) = iter_ctx.as_map_mut() {
            map.insert(loop_variable.to_string(), item);
            map.insert(index_key.clone(), Value::Number(index as f64));
        }
        let signal = Box::pin(execute_steps(steps, &mut iter_ctx, env)).await;
        if signal == Signal::Stop {
            return Signal::Stop;
        }
    }
    Signal::Continue
}

/// Nested maps merge recursively; scalar/list keys are replaced wholesale.
fn deep_merge(parent: &mut Value, branch: Value) {
    match (parent, branch) {
        (Value::Map(parent_map), Value::Map(branch_map)) => {
            for (key, branch_value) in branch_map {
                match parent_map.get_mut(&key) {
                    Some(existing @ Value::Map(_)) if matches!(branch_value, Value::Map(_)) => {
                        deep_merge(existing, branch_value);
                    }
                    _ => {
                        parent_map.insert(key, branch_value);
                    }
                }
            }
        }
        (parent_slot, branch_value) => {
            *parent_slot = branch_value;
        }
    }
}

/// Sleep a uniform random duration in `[min, max]`, or not at all when
/// both bounds are zero, waking immediately on cancellation.
async fn cancellable_sleep(env: &InterpEnv) -> Signal {
    if env.min_sleep_ms == 0 && env.max_sleep_ms == 0 {
        return Signal::Continue;
    }
    let millis = if env.min_sleep_ms >= env.max_sleep_ms {
        env.min_sleep_ms
    } else {
        rand::rng().random_range(env.min_sleep_ms..=env.max_sleep_ms)
    };
    tokio::select! {
        _ = env.cancel.cancelled() => Signal::Stop,
        _ = tokio::time::sleep(Duration::from_millis(millis)) => Signal::Continue,
    }
}

/// Write a value into the context, used by the worker to seed identity keys.
pub fn seed(ctx: &mut Value, path: &str, value: Value) {
    write_path(ctx, path, value);
}
