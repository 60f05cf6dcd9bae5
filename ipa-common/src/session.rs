//! Authenticated HTTP session against the directory's JSON-RPC endpoint.
//!
//! Login posts a password form and keeps the returned session cookie; every
//! later request carries it. The session is not refreshed on expiry.

use crate::config::ClientConfig;
use crate::error::ReconcileError;
use crate::gateway::RpcTransport;
use crate::util::{mask_cookie, mask_secrets};
use serde_json::{Map, Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use ureq::Agent;
use ureq::tls::TlsConfig;

const LOGIN_METHOD: &str = "login";

/// URLs derived from the server base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_url: String,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn login_url(&self) -> String {
        format!("{}/ipa/session/login_password", self.base_url)
    }

    pub fn json_url(&self) -> String {
        format!("{}/ipa/session/json", self.base_url)
    }

    pub fn referer(&self) -> String {
        format!("{}/ipa", self.base_url)
    }
}

/// Statuses treated as success for every request.
pub fn is_success_status(status: u16) -> bool {
    matches!(status, 200 | 201 | 204)
}

/// Extract the `name=value` pair from a `Set-Cookie` header.
pub fn session_cookie(set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?.trim();
    if pair.contains('=') && !pair.starts_with('=') {
        Some(pair.to_string())
    } else {
        None
    }
}

/// JSON-RPC request body: `{"method": m, "params": [[positional...], item]}`.
pub fn request_body(method: &str, params: Value) -> Value {
    json!({ "method": method, "params": params })
}

/// A logged-in session.
pub struct HttpSession {
    agent: Agent,
    endpoint: Endpoint,
    cookie: String,
}

impl std::fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession")
            .field("endpoint", &self.endpoint)
            .field("cookie", &mask_cookie(&self.cookie))
            .finish()
    }
}

fn build_agent(timeout: Duration, validate_certs: bool) -> Agent {
    let mut builder = Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false);
    if !validate_certs {
        builder = builder.tls_config(TlsConfig::builder().disable_verification(true).build());
    }
    Agent::new_with_config(builder.build())
}

impl HttpSession {
    /// Log in with the configured credentials.
    pub fn connect(config: &ClientConfig, password: &str) -> Result<Self, ReconcileError> {
        let endpoint = Endpoint::new(config.base_url());
        if !config.server.validate_certs {
            warn!(host = %config.server.host, "TLS certificate validation is disabled");
        }
        let agent = build_agent(config.timeout(), config.server.validate_certs);
        let cookie = login(&agent, &endpoint, &config.auth.user, password)?;
        info!(user = %config.auth.user, url = endpoint.base_url(), "logged in");
        Ok(Self {
            agent,
            endpoint,
            cookie,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

fn login(
    agent: &Agent,
    endpoint: &Endpoint,
    user: &str,
    password: &str,
) -> Result<String, ReconcileError> {
    let started = Instant::now();
    let response = agent
        .post(&endpoint.login_url())
        .header("Referer", &endpoint.referer())
        .header("Accept", "text/plain")
        .send_form([("user", user), ("password", password)])
        .map_err(|e| ReconcileError::transport_with_source(LOGIN_METHOD, e))?;

    let status = response.status().as_u16();
    debug!(
        status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "login response"
    );
    if !is_success_status(status) {
        return Err(ReconcileError::fault(
            LOGIN_METHOD,
            Some(i64::from(status)),
            format!("login as '{user}' rejected with HTTP {status}"),
        ));
    }

    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(session_cookie)
        .ok_or_else(|| {
            ReconcileError::fault(
                LOGIN_METHOD,
                Some(i64::from(status)),
                "login succeeded but no session cookie was returned",
            )
        })
}

impl RpcTransport for HttpSession {
    fn post(&self, method: &str, params: Value) -> Result<Value, ReconcileError> {
        debug!(method, params = %mask_secrets(&params), "rpc request");
        let started = Instant::now();
        let body = request_body(method, params);

        let mut response = self
            .agent
            .post(&self.endpoint.json_url())
            .header("Referer", &self.endpoint.referer())
            .header("Accept", "application/json")
            .header("Cookie", &self.cookie)
            .send_json(&body)
            .map_err(|e| ReconcileError::transport_with_source(method, e))?;

        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ReconcileError::transport_with_source(method, e))?;
        debug!(
            method,
            status,
            bytes = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rpc response"
        );

        if !is_success_status(status) {
            let snippet: String = text.chars().take(200).collect();
            return Err(ReconcileError::fault(
                method,
                Some(i64::from(status)),
                format!("HTTP {status}: {}", snippet.trim()),
            ));
        }
        if text.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(&text).map_err(|e| ReconcileError::transport_with_source(method, e))
    }
}
