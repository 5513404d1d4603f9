//! Flow execution engine for FlowRunner: a headless load- and
//! traffic-generation engine that walks declarative flows against a target
//! HTTP service. This crate is a library; the HTTP control API, Prometheus
//! exposition, container lifecycle, config-file loading, and signal
//! handling are external collaborator concerns (see the crate-level design
//! ledger in `DESIGN.md`).

pub mod condition;
pub mod engine;
pub mod error;
pub mod executor;
pub mod extract;
pub mod identity;
pub mod interpreter;
pub mod metrics;
pub mod model;
pub mod substitute;
pub mod url_builder;
pub mod validate;
pub mod value;
mod worker;

pub use engine::{Engine, Status};
pub use error::{EngineError, EngineResult, ValidationError};
pub use metrics::MetricsSnapshot;
pub use model::{Config, Flow, Method, OnFailure, Step};
