//! Parses and validates flow/config payloads into the internal form.
//! Unknown top-level flow fields are ignored silently because `Flow`
//! never derives `deny_unknown_fields`.

use crate::error::ValidationError;
use crate::model::{Config, Flow, Step};
use crate::url_builder::TargetBase;
use std::net::IpAddr;

pub struct ValidatedConfig {
    pub raw: Config,
    pub target_base: TargetBase,
}

pub fn validate_config(config: Config) -> Result<ValidatedConfig, ValidationError> {
    let target_base = TargetBase::parse(&config.flow_target_url)
        .map_err(|_| ValidationError::InvalidTargetUrl(config.flow_target_url.clone()))?;

    if config.sim_users < 1 {
        return Err(ValidationError::InvalidSimUsers);
    }
    if config.min_sleep_ms > config.max_sleep_ms {
        return Err(ValidationError::InvalidSleepRange {
            min: config.min_sleep_ms,
            max: config.max_sleep_ms,
        });
    }
    if let Some(ip) = &config.flow_target_dns_override {
        ip.parse::<IpAddr>()
            .map_err(|_| ValidationError::InvalidDnsOverride(ip.clone()))?;
    }

    Ok(ValidatedConfig {
        raw: config,
        target_base,
    })
}

pub fn validate_flow(flow: &Flow) -> Result<(), ValidationError> {
    if flow.name.trim().is_empty() {
        return Err(ValidationError::InvalidFlow);
    }
    for step in &flow.steps {
        validate_step(step)?;
    }
    Ok(())
}

fn validate_step(step: &Step) -> Result<(), ValidationError> {
    match step {
        Step::Request { id, .. } if id.trim().is_empty() => {
            Err(ValidationError::InvalidStep { id: id.clone() })
        }
        Step::Condition { then, r#else, .. } => {
            for s in then.iter().chain(r#else.iter()) {
                validate_step(s)?;
            }
            Ok(())
        }
        Step::Loop { steps, .. } => {
            for s in steps {
                validate_step(s)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            flow_target_url: "https://api.example.com".to_string(),
            sim_users: 1,
            flow_target_dns_override: None,
            xff_header_name: "X-Forwarded-For".to_string(),
            min_sleep_ms: 0,
            max_sleep_ms: 0,
            flow_cycle_delay_ms: None,
            override_step_url_host: true,
            debug: false,
        }
    }

    #[test]
    fn rejects_zero_sim_users() {
        let mut cfg = base_config();
        cfg.sim_users = 0;
        assert!(matches!(
            validate_config(cfg),
            Err(ValidationError::InvalidSimUsers)
        ));
    }

    #[test]
    fn rejects_inverted_sleep_range() {
        let mut cfg = base_config();
        cfg.min_sleep_ms = 500;
        cfg.max_sleep_ms = 100;
        assert!(matches!(
            validate_config(cfg),
            Err(ValidationError::InvalidSleepRange { .. })
        ));
    }

    #[test]
    fn rejects_bad_dns_override() {
        let mut cfg = base_config();
        cfg.flow_target_dns_override = Some("not-an-ip".to_string());
        assert!(matches!(
            validate_config(cfg),
            Err(ValidationError::InvalidDnsOverride(_))
        ));
    }

    #[test]
    fn rejects_relative_target_url() {
        let mut cfg = base_config();
        cfg.flow_target_url = "/not/absolute".to_string();
        assert!(validate_config(cfg).is_err());
    }

    #[test]
    fn accepts_valid_config() {
        assert!(validate_config(base_config()).is_ok());
    }

    #[test]
    fn unknown_flow_fields_are_ignored() {
        let json = serde_json::json!({
            "name": "demo",
            "steps": [],
            "visualLayout": {"x": 1, "y": 2},
        });
        let flow: Flow = serde_json::from_value(json).expect("deserializes despite unknown field");
        assert!(validate_flow(&flow).is_ok());
    }
}
