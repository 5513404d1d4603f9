//! Flow/Config data model. Deserialized from the collaborator's
//! JSON payloads; unknown top-level fields are ignored silently because we
//! never add `#[serde(deny_unknown_fields)]` here.

use crate::condition::ConditionData;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub flow_target_url: String,
    pub sim_users: u32,
    #[serde(default)]
    pub flow_target_dns_override: Option<String>,
    #[serde(default = "default_xff_header")]
    pub xff_header_name: String,
    #[serde(default)]
    pub min_sleep_ms: u64,
    #[serde(default)]
    pub max_sleep_ms: u64,
    #[serde(default)]
    pub flow_cycle_delay_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub override_step_url_host: bool,
    #[serde(default)]
    pub debug: bool,
}

fn default_xff_header() -> String {
    "X-Forwarded-For".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Flow {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default, rename = "staticVars")]
    pub static_vars: HashMap<String, Json>,
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    #[serde(rename = "request")]
    Request {
        id: String,
        #[serde(default)]
        name: Option<String>,
        method: Method,
        #[serde(default)]
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: Option<Json>,
        #[serde(default)]
        extract: HashMap<String, String>,
        #[serde(default, rename = "onFailure")]
        on_failure: OnFailure,
    },
    #[serde(rename = "condition")]
    Condition {
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(rename = "conditionData")]
        condition_data: ConditionData,
        #[serde(default)]
        then: Vec<Step>,
        #[serde(default)]
        r#else: Vec<Step>,
    },
    #[serde(rename = "loop")]
    Loop {
        id: String,
        #[serde(default)]
        name: Option<String>,
        source: String,
        #[serde(default = "default_loop_variable", rename = "loopVariable")]
        loop_variable: String,
        steps: Vec<Step>,
    },
}

fn default_loop_variable() -> String {
    "item".to_string()
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    Stop,
    #[default]
    Continue,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl Method {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Options => reqwest::Method::OPTIONS,
            Method::Head => reqwest::Method::HEAD,
        }
    }

    pub fn has_no_body(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}
