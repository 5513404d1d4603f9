//! Process-wide metrics aggregator. Monotonic counters are atomics;
//! rolling-window structures sit behind a `parking_lot::Mutex`, mirroring
//! `HealthState`'s split between `AtomicBool` fields and a mutex-guarded
//! `HealthMeta` struct.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

const RPS_WINDOW: Duration = Duration::from_secs(10);
const DURATION_WINDOW: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub running: bool,
    pub active_simulated_users: i64,
    pub total_requests: u64,
    pub rps: f64,
    pub flow_count: u64,
    pub avg_flow_duration_ms: f64,
}

#[derive(Default)]
struct RollingState {
    request_timestamps: VecDeque<Instant>,
    flow_durations: VecDeque<f64>,
}

pub struct Metrics {
    running: AtomicBool,
    active_simulated_users: AtomicI64,
    total_requests: AtomicU64,
    flow_count: AtomicU64,
    rolling: Mutex<RollingState>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            active_simulated_users: AtomicI64::new(0),
            total_requests: AtomicU64::new(0),
            flow_count: AtomicU64::new(0),
            rolling: Mutex::new(RollingState::default()),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn worker_started(&self) {
        self.active_simulated_users.fetch_add(1, Ordering::SeqCst);
    }

    pub fn worker_stopped(&self) {
        self.active_simulated_users.fetch_sub(1, Ordering::SeqCst);
    }

    /// Record one completed request (success or final non-2xx); never
    /// called for pre-dispatch failures.
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        let mut rolling = self.rolling.lock();
        let now = Instant::now();
        rolling.request_timestamps.push_back(now);
        prune_older_than(&mut rolling.request_timestamps, now, RPS_WINDOW);
    }

    pub fn record_flow_completion(&self, duration: Duration) {
        self.flow_count.fetch_add(1, Ordering::SeqCst);
        let mut rolling = self.rolling.lock();
        rolling.flow_durations.push_back(duration.as_secs_f64() * 1000.0);
        while rolling.flow_durations.len() > DURATION_WINDOW {
            rolling.flow_durations.pop_front();
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let rolling = self.rolling.lock();
        let now = Instant::now();
        let recent = rolling
            .request_timestamps
            .iter()
            .filter(|ts| now.duration_since(**ts) <= RPS_WINDOW)
            .count();
        let rps = recent as f64 / RPS_WINDOW.as_secs_f64();
        let avg_flow_duration_ms = if rolling.flow_durations.is_empty() {
            0.0
        } else {
            rolling.flow_durations.iter().sum::<f64>() / rolling.flow_durations.len() as f64
        };
        MetricsSnapshot {
            running: self.running.load(Ordering::SeqCst),
            active_simulated_users: self.active_simulated_users.load(Ordering::SeqCst),
            total_requests: self.total_requests.load(Ordering::SeqCst),
            rps,
            flow_count: self.flow_count.load(Ordering::SeqCst),
            avg_flow_duration_ms,
        }
    }
}

fn prune_older_than(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = timestamps.front() {
        if now.duration_since(*front) > window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_requests_is_monotonic() {
        let m = Metrics::new();
        m.record_request();
        m.record_request();
        assert_eq!(m.snapshot().total_requests, 2);
    }

    #[test]
    fn active_users_tracks_worker_lifecycle() {
        let m = Metrics::new();
        m.worker_started();
        m.worker_started();
        assert_eq!(m.snapshot().active_simulated_users, 2);
        m.worker_stopped();
        assert_eq!(m.snapshot().active_simulated_users, 1);
    }

    #[test]
    fn avg_duration_is_rolling_mean() {
        let m = Metrics::new();
        m.record_flow_completion(Duration::from_millis(100));
        m.record_flow_completion(Duration::from_millis(200));
        assert_eq!(m.snapshot().avg_flow_duration_ms, 150.0);
    }
}
