use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::utils::sanitize::{sanitize_body, sanitize_json};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
    #[error("Malformed gateway response: {0}")]
    MalformedResponse(String),
    #[error("Gateway rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Raw outcome of one gateway call.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: String,
    value: Option<Value>,
}

impl GatewayResponse {
    pub fn new(status: u16, body: String) -> Self {
        let value = parse_body(status, &body);
        Self { status, body, value }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// The structured body, when the response carried one.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn object(&self) -> Option<&Map<String, Value>> {
        self.value.as_ref().and_then(Value::as_object)
    }

    pub fn into_value(self) -> Option<Value> {
        self.value
    }

    /// The structured body of a 2xx response, or the matching transport error.
    pub fn require_success(self) -> Result<Value, GatewayError> {
        if !self.is_success() {
            return Err(GatewayError::Rejected {
                status: self.status,
                body: sanitize_body(&self.body),
            });
        }
        let status = self.status;
        self.value.ok_or_else(|| {
            GatewayError::MalformedResponse(format!("empty body with status {}", status))
        })
    }
}

fn parse_body(status: u16, body: &str) -> Option<Value> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed == "\"DONE\"" {
        return Some(json!({ "status": "DONE" }));
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Some(Value::Object(map));
    }
    let success = (200..300).contains(&status);
    if success && !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return Some(json!({ "rawResponse": body }));
    }
    None
}

/// HTTP client for the gateway's merchant REST API.
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    base_url: String,
    auth_header: Option<String>,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Self::with_circuit_breaker(config, 5, 30)
    }

    /// Creates a client with custom circuit breaker configuration
    pub fn with_circuit_breaker(
        config: &GatewayConfig,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()?;

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Ok(GatewayClient {
            client,
            base_url: config.merchant_base_url(),
            auth_header: config.auth_header().map(str::to_string),
            circuit_breaker,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    pub async fn get(&self, path: &str) -> Result<GatewayResponse, GatewayError> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<GatewayResponse, GatewayError> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<GatewayResponse, GatewayError> {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<GatewayResponse, GatewayError> {
        self.send(Method::DELETE, path, None).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<GatewayResponse, GatewayError> {
        let url = format!("{}{}", self.base_url, path);
        match body {
            Some(b) => tracing::info!(%method, %url, body = %sanitize_json(b), "Gateway request"),
            None => tracing::info!(%method, %url, "Gateway request"),
        }

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(ACCEPT, "application/json");
        if let Some(auth) = &self.auth_header {
            request = request.header(AUTHORIZATION, auth);
        }
        if let Some(b) = body {
            request = request.header(CONTENT_TYPE, "application/json").json(b);
        }

        // Only transport failures trip the breaker; a non-2xx reply is still a reply.
        let result = self
            .circuit_breaker
            .call(async move {
                let response = request.send().await?;
                let status = response.status().as_u16();
                let text = response.text().await?;
                Ok::<_, reqwest::Error>((status, text))
            })
            .await;

        match result {
            Ok((status, text)) => {
                tracing::info!(%method, %url, status, "Gateway response");
                tracing::debug!(body = %sanitize_body(&text), "Gateway response body");
                Ok(GatewayResponse::new(status, text))
            }
            Err(FailsafeError::Rejected) => {
                tracing::warn!(%method, %url, "Gateway circuit breaker open");
                Err(GatewayError::CircuitBreakerOpen(
                    "Gateway circuit breaker is open".to_string(),
                ))
            }
            Err(FailsafeError::Inner(e)) => {
                tracing::error!(%method, %url, error = %e, "Gateway transport failure");
                Err(GatewayError::Request(e))
            }
        }
    }
}
