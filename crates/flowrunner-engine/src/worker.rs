//! Continuous per-user lifecycle: the worker *is* the loop; there is
//! no separate "runner" object carrying continuation state.

use crate::identity::Identity;
use crate::interpreter::{self, InterpEnv, Signal};
use crate::metrics::Metrics;
use crate::model::Flow;
use crate::url_builder::TargetBase;
use crate::value::Value;
use indexmap::IndexMap;
use rand::Rng;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub struct WorkerConfig {
    pub sim_user_id: u32,
    pub flow: Arc<Flow>,
    pub target_base: TargetBase,
    pub dial_ip: Option<String>,
    pub override_step_url_host: bool,
    pub xff_header_name: String,
    pub min_sleep_ms: u64,
    pub max_sleep_ms: u64,
    pub flow_cycle_delay_ms: Option<u64>,
    pub metrics: Arc<Metrics>,
    pub cancel: CancellationToken,
}

/// One simulated user's entire lifetime: identity, a dedicated HTTP client
/// bound to the resolved dial host, and an unbounded iteration loop.
pub async fn run(cfg: WorkerConfig) {
    let identity = Identity::random();
    let client = match build_client(&cfg, &identity) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(sim_user_id = cfg.sim_user_id, error = %err, "failed to build HTTP client");
            cfg.metrics.worker_stopped();
            return;
        }
    };

    let env = InterpEnv {
        client,
        flow_headers: cfg.flow.headers.clone(),
        xff_header_name: cfg.xff_header_name.clone(),
        target_base: cfg.target_base.clone(),
        dial_ip: cfg.dial_ip.clone(),
        override_step_url_host: cfg.override_step_url_host,
        min_sleep_ms: cfg.min_sleep_ms,
        max_sleep_ms: cfg.max_sleep_ms,
        source_ip: identity.source_ip.clone(),
        session_headers: vec![
            ("User-Agent".to_string(), identity.user_agent.clone()),
            ("Accept-Language".to_string(), identity.accept_language.clone()),
        ],
        metrics: Arc::clone(&cfg.metrics),
        cancel: cfg.cancel.clone(),
    };

    let iteration_index = AtomicU64::new(0);

    loop {
        if cfg.cancel.is_cancelled() {
            break;
        }

        let mut ctx = build_initial_context(&cfg, &identity, iteration_index.fetch_add(1, Ordering::SeqCst));

        let started = Instant::now();
        let signal = interpreter::execute_steps(&cfg.flow.steps, &mut ctx, &env).await;
        if signal == Signal::Continue {
            cfg.metrics.record_flow_completion(started.elapsed());
        }

        if cancellable_iteration_sleep(&cfg).await == Signal::Stop {
            break;
        }
    }

    cfg.metrics.worker_stopped();
}

fn build_initial_context(cfg: &WorkerConfig, identity: &Identity, iteration_index: u64) -> Value {
    let mut map: IndexMap<String, Value> = cfg
        .flow
        .static_vars
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v.clone())))
        .collect();
    map.insert("sim_user_id".to_string(), Value::Number(cfg.sim_user_id as f64));
    map.insert(
        "iteration_source_ip".to_string(),
        Value::String(identity.source_ip.clone()),
    );
    map.insert(
        "iteration_user_agent".to_string(),
        Value::String(identity.user_agent.clone()),
    );
    map.insert(
        "flow_iteration_index".to_string(),
        Value::Number(iteration_index as f64),
    );
    Value::Map(map)
}

fn build_client(cfg: &WorkerConfig, _identity: &Identity) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(ip) = &cfg.dial_ip {
        if let Ok(addr) = ip.parse::<IpAddr>() {
            let port = crate::url_builder::dial_port(&cfg.target_base);
            builder = builder.resolve(&cfg.target_base.host, SocketAddr::new(addr, port));
        }
    }
    builder.build()
}

async fn cancellable_iteration_sleep(cfg: &WorkerConfig) -> Signal {
    let millis = match cfg.flow_cycle_delay_ms {
        Some(fixed) => fixed,
        None if cfg.min_sleep_ms == 0 && cfg.max_sleep_ms == 0 => 0,
        None if cfg.min_sleep_ms >= cfg.max_sleep_ms => cfg.min_sleep_ms,
        None => rand::rng().random_range(cfg.min_sleep_ms..=cfg.max_sleep_ms),
    };
    if millis == 0 {
        return Signal::Continue;
    }
    tokio::select! {
        _ = cfg.cancel.cancelled() => Signal::Stop,
        _ = tokio::time::sleep(Duration::from_millis(millis)) => Signal::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_context_has_injected_keys_and_no_stale_state() {
        let flow = Flow {
            static_vars: std::collections::HashMap::from([(
                "greeting".to_string(),
                serde_json::json!("hi"),
            )]),
            ..Default::default()
        };
        let cfg = WorkerConfig {
            sim_user_id: 3,
            flow: Arc::new(flow),
            target_base: TargetBase::parse("https://example.test").unwrap(),
            dial_ip: None,
            override_step_url_host: true,
            xff_header_name: "X-Forwarded-For".to_string(),
            min_sleep_ms: 0,
            max_sleep_ms: 0,
            flow_cycle_delay_ms: None,
            metrics: Arc::new(Metrics::new()),
            cancel: CancellationToken::new(),
        };
        let identity = Identity::random();
        let ctx = build_initial_context(&cfg, &identity, 5);
        let map = ctx.as_map().unwrap();
        assert_eq!(map["sim_user_id"], Value::Number(3.0));
        assert_eq!(map["flow_iteration_index"], Value::Number(5.0));
        assert_eq!(map["greeting"], Value::String("hi".to_string()));
    }
}
