//! Produces the request URL, effective dial address, and an optional
//! explicit Host header from the target config and a step's (already
//! substituted) URL.

use url::Url;

#[derive(Clone, Debug, PartialEq)]
pub struct BuiltRequest {
    pub url: String,
    /// `Some(ip)` when the connection should be dialed to a DNS-overridden
    /// address instead of the URL's own host.
    pub dial_ip: Option<String>,
    /// Explicit `Host` header to send, when it differs from what the
    /// transport would derive from `url` on its own.
    pub host_header: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum UrlBuildError {
    #[error("flow_target_url could not be parsed: {0}")]
    InvalidBase(String),
}

/// Parse and hold the configured target URL once per `Config` validation.
#[derive(Clone, Debug)]
pub struct TargetBase {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
}

impl TargetBase {
    pub fn parse(raw: &str) -> Result<Self, UrlBuildError> {
        let url = Url::parse(raw).map_err(|e| UrlBuildError::InvalidBase(e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| UrlBuildError::InvalidBase("missing host".to_string()))?
            .to_string();
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UrlBuildError::InvalidBase(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            port: url.port(),
        })
    }

    fn default_port(&self) -> u16 {
        if self.scheme == "https" {
            443
        } else {
            80
        }
    }

    fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.default_port())
    }

    /// `host` or `host:port` when the port is explicit and non-default.
    fn authority(&self) -> String {
        match self.port {
            Some(p) if p != self.default_port() => format!("{}:{p}", self.host),
            _ => self.host.clone(),
        }
    }
}

struct StepUrl {
    /// `Some((scheme, host))` when the step URL is absolute (has its own
    /// scheme+host); always both-or-neither, so callers never need to
    /// unwrap one half against the other.
    absolute: Option<(String, String)>,
    path: String,
    query: Option<String>,
}

fn parse_step_url(raw: &str) -> StepUrl {
    if let Ok(parsed) = Url::parse(raw) {
        if let Some(host) = parsed.host_str() {
            return StepUrl {
                absolute: Some((parsed.scheme().to_string(), host.to_string())),
                path: parsed.path().to_string(),
                query: parsed.query().map(|q| q.to_string()),
            };
        }
    }
    // Relative: split off an optional query string; fragments are never
    // forwarded on the wire (see DESIGN.md).
    let without_fragment = raw.split('#').next().unwrap_or("");
    let mut parts = without_fragment.splitn(2, '?');
    let path = parts.next().unwrap_or("").to_string();
    let query = parts.next().map(|q| q.to_string());
    StepUrl {
        absolute: None,
        path,
        query,
    }
}

fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if !path.starts_with('/') {
        format!("/{path}")
    } else {
        path.to_string()
    }
}

/// Build the outgoing request's URL, dial IP, and Host header.
pub fn build(
    base: &TargetBase,
    target_ip: Option<&str>,
    override_step_url_host: bool,
    step_url_substituted: &str,
) -> BuiltRequest {
    let step = parse_step_url(step_url_substituted);

    if override_step_url_host || step.absolute.is_none() {
        // Case A (host override on), or a relative step URL under host
        // override off -- both append to `base` the same way.
        let path = normalize_path(&step.path);
        let mut url = format!("{}://{}{}", base.scheme, base.authority(), path);
        if let Some(q) = &step.query {
            url.push('?');
            url.push_str(q);
        }
        let (dial_ip, host_header) = match target_ip {
            Some(ip) => (Some(ip.to_string()), Some(base.authority())),
            None => (None, None),
        };
        tracing::debug!(
            branch = "case_a_or_relative",
            url,
            dial_ip,
            "url builder decision"
        );
        BuiltRequest {
            url,
            dial_ip,
            host_header,
        }
    } else {
        // Case B, absolute step URL: used as-is. Reachable only when
        // `step.absolute` is `Some` (see the guard above).
        let Some((scheme, host)) = step.absolute.clone() else {
            return build(base, target_ip, true, step_url_substituted);
        };
        let path = normalize_path(&step.path);
        let mut url = format!("{scheme}://{host}{path}");
        if let Some(q) = &step.query {
            url.push('?');
            url.push_str(q);
        }
        let matches_base_host = host == base.host;
        let (dial_ip, host_header) = match (target_ip, matches_base_host) {
            (Some(ip), true) => (Some(ip.to_string()), Some(base.host.clone())),
            _ => (None, None),
        };
        tracing::debug!(
            branch = "case_b_absolute",
            url,
            dial_ip,
            matches_base_host,
            "url builder decision"
        );
        BuiltRequest {
            url,
            dial_ip,
            host_header,
        }
    }
}

/// Port to dial at, for constructing a `(dial_ip, port)` socket address.
pub fn dial_port(base: &TargetBase) -> u16 {
    base.effective_port()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_on_ignores_step_host() {
        let base = TargetBase::parse("https://api.example.com").unwrap();
        let result = build(&base, None, true, "http://ignored.test/v1/ping?x=1");
        assert_eq!(result.url, "https://api.example.com/v1/ping?x=1");
        assert_eq!(result.dial_ip, None);
        assert_eq!(result.host_header, None);
    }

    #[test]
    fn dns_override_absolute_step_host_matches_base() {
        let base = TargetBase::parse("https://api.example.com").unwrap();
        let result = build(&base, Some("10.0.0.5"), false, "https://api.example.com/health");
        assert_eq!(result.url, "https://api.example.com/health");
        assert_eq!(result.dial_ip, Some("10.0.0.5".to_string()));
        assert_eq!(result.host_header, Some("api.example.com".to_string()));
    }

    #[test]
    fn dns_override_absolute_step_host_mismatch_is_ignored() {
        let base = TargetBase::parse("https://api.example.com").unwrap();
        let result = build(&base, Some("10.0.0.5"), false, "https://other.test/health");
        assert_eq!(result.url, "https://other.test/health");
        assert_eq!(result.dial_ip, None);
    }

    #[test]
    fn empty_path_normalizes_to_slash() {
        let base = TargetBase::parse("https://api.example.com").unwrap();
        let result = build(&base, None, true, "");
        assert_eq!(result.url, "https://api.example.com/");
    }

    #[test]
    fn nondefault_port_is_carried_in_authority() {
        let base = TargetBase::parse("http://api.example.com:8080").unwrap();
        let result = build(&base, Some("10.0.0.5"), true, "/ping");
        assert_eq!(result.url, "http://api.example.com:8080/ping");
        assert_eq!(result.host_header, Some("api.example.com:8080".to_string()));
    }

    #[test]
    fn relative_step_under_override_off_follows_case_a() {
        let base = TargetBase::parse("https://api.example.com").unwrap();
        let result = build(&base, None, false, "/v2/status");
        assert_eq!(result.url, "https://api.example.com/v2/status");
    }
}
