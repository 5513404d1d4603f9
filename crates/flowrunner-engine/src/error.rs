//! Error taxonomy. Only `EngineError` crosses the public API boundary;
//! `StepError`/`FatalError`-class failures are logged and swallowed per the
//! propagation policy, so they never appear in a `Result` a caller sees.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("flow_target_url must be an absolute URL with scheme and host: {0}")]
    InvalidTargetUrl(String),
    #[error("sim_users must be >= 1")]
    InvalidSimUsers,
    #[error("min_sleep_ms ({min}) must be <= max_sleep_ms ({max})")]
    InvalidSleepRange { min: u64, max: u64 },
    #[error("flow_target_dns_override is not a valid IP literal: {0}")]
    InvalidDnsOverride(String),
    #[error("step has an empty id")]
    InvalidStep { id: String },
    #[error("flow must declare at least a name")]
    InvalidFlow,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Internal, non-public request-failure classification used by the
/// executor's retry decision; never crosses the public API boundary.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("server error: status {0}")]
    ServerError(u16),
}
