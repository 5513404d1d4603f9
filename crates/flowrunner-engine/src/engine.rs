//! Start/stop orchestration, worker registry, shared metrics, cancellation.
//! This is the only surface external collaborators (an HTTP
//! control API, a container lifecycle adapter, ...) talk to.

use crate::error::{EngineError, EngineResult};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::model::{Config, Flow};
use crate::validate::{validate_config, validate_flow};
use crate::worker::{self, WorkerConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Initializing,
    Running,
    Stopped,
    Error,
}

struct RunState {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// The engine is the single process-wide owner of worker handles, metrics,
/// and the cancellation signal; the flow/config are read-only after
/// `start`.
pub struct Engine {
    metrics: Arc<Metrics>,
    status: Mutex<Status>,
    run: Mutex<Option<RunState>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(Metrics::new()),
            status: Mutex::new(Status::Initializing),
            run: Mutex::new(None),
        }
    }

    pub fn status(&self) -> Status {
        *self.status.lock()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Validate `config`/`flow`, spawn `sim_users` workers, and transition
    /// to `running`. If the engine is already running, performs an implicit
    /// `stop` first.
    pub async fn start(&self, config: Config, flow: Flow) -> EngineResult<()> {
        let validated = validate_config(config).map_err(|e| {
            *self.status.lock() = Status::Error;
            EngineError::from(e)
        })?;
        validate_flow(&flow).map_err(|e| {
            *self.status.lock() = Status::Error;
            EngineError::from(e)
        })?;

        if self.status() == Status::Running {
            self.stop().await;
        }

        let flow = Arc::new(flow);
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(validated.raw.sim_users as usize);

        let dial_ip = validated.raw.flow_target_dns_override.clone();
        for sim_user_id in 0..validated.raw.sim_users {
            self.metrics.worker_started();
            let worker_cfg = WorkerConfig {
                sim_user_id,
                flow: Arc::clone(&flow),
                target_base: validated.target_base.clone(),
                dial_ip: dial_ip.clone(),
                override_step_url_host: validated.raw.override_step_url_host,
                xff_header_name: validated.raw.xff_header_name.clone(),
                min_sleep_ms: validated.raw.min_sleep_ms,
                max_sleep_ms: validated.raw.max_sleep_ms,
                flow_cycle_delay_ms: validated.raw.flow_cycle_delay_ms,
                metrics: Arc::clone(&self.metrics),
                cancel: cancel.clone(),
            };
            handles.push(tokio::spawn(worker::run(worker_cfg)));
        }

        *self.run.lock() = Some(RunState { cancel, handles });
        self.metrics.set_running(true);
        *self.status.lock() = Status::Running;
        tracing::info!(sim_users = validated.raw.sim_users, "engine started");
        Ok(())
    }

    /// Signal cancellation, wake all sleeping workers, and wait for every
    /// worker to finish (bounded by a grace timeout, after which remaining
    /// workers are force-cancelled by being dropped). Idempotent.
    pub async fn stop(&self) {
        let run_state = self.run.lock().take();
        let Some(RunState { cancel, handles }) = run_state else {
            *self.status.lock() = Status::Stopped;
            self.metrics.set_running(false);
            return;
        };
        cancel.cancel();

        let join_all = futures_join_all(handles);
        if tokio::time::timeout(STOP_GRACE, join_all).await.is_err() {
            tracing::warn!("workers did not join within the grace period; force-cancelling");
        }

        self.metrics.set_running(false);
        *self.status.lock() = Status::Stopped;
        tracing::info!("engine stopped");
    }
}

async fn futures_join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Method, OnFailure, Step};
    use std::collections::HashMap;

    fn config() -> Config {
        Config {
            flow_target_url: "https://example.test".to_string(),
            sim_users: 2,
            flow_target_dns_override: None,
            xff_header_name: "X-Forwarded-For".to_string(),
            min_sleep_ms: 1,
            max_sleep_ms: 2,
            flow_cycle_delay_ms: None,
            override_step_url_host: true,
            debug: false,
        }
    }

    fn flow() -> Flow {
        Flow {
            id: "demo".to_string(),
            name: "Demo".to_string(),
            description: None,
            headers: HashMap::new(),
            static_vars: HashMap::new(),
            steps: vec![Step::Request {
                id: "req1".to_string(),
                name: None,
                method: Method::Get,
                url: "/ping".to_string(),
                headers: HashMap::new(),
                body: None,
                extract: HashMap::new(),
                on_failure: OnFailure::Continue,
            }],
        }
    }

    #[tokio::test]
    async fn start_then_stop_joins_all_workers() {
        let engine = Engine::new();
        engine.start(config(), flow()).await.expect("start");
        // Give workers a moment to register as active.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.status(), Status::Running);

        engine.stop().await;
        assert_eq!(engine.status(), Status::Stopped);
        assert_eq!(engine.snapshot().active_simulated_users, 0);
    }

    #[tokio::test]
    async fn stop_without_start_is_idempotent() {
        let engine = Engine::new();
        engine.stop().await;
        assert_eq!(engine.status(), Status::Stopped);
    }

    #[tokio::test]
    async fn invalid_config_rejected_without_mutating_run_state() {
        let engine = Engine::new();
        let mut bad = config();
        bad.sim_users = 0;
        let result = engine.start(bad, flow()).await;
        assert!(result.is_err());
        assert_eq!(engine.status(), Status::Error);
    }
}
