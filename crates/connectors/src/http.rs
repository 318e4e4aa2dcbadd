//! HTTP plumbing shared by every adapter.
//!
//! Each call is throttled, retried per the [`RetryPolicy`], and mapped onto
//! [`ConnectorError`] by status code before the adapter sees the body.

use std::time::Duration;

use log::debug;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use crate::errors::{ConnectorError, Result};
use crate::retry::RetryPolicy;
use crate::throttle::Throttle;

/// Inspects a successfully received body for provider-level errors
/// (JSON-RPC `error` members, `{"status": "0"}` envelopes, ...). Runs inside
/// the retry loop, so a returned `RateLimited` is retried like an HTTP 429.
pub type BodyCheck = fn(provider: &str, body: &Value) -> Result<()>;

// Longest body excerpt carried in error details.
const ERROR_EXCERPT: usize = 200;

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    provider: &'static str,
    retry: RetryPolicy,
    throttle: Throttle,
}

impl HttpClient {
    pub fn new(
        provider: &'static str,
        timeout: Duration,
        retry: RetryPolicy,
        throttle: Throttle,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ledgerlink/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            provider,
            retry,
            throttle,
        }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    /// Underlying client, for adapters that sign requests themselves.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        check: Option<BodyCheck>,
    ) -> Result<Value> {
        self.execute(|| Ok(self.client.get(url).query(query)), check)
            .await
    }

    pub async fn post_json(&self, url: &str, body: &Value, check: Option<BodyCheck>) -> Result<Value> {
        self.execute(|| Ok(self.client.post(url).json(body)), check)
            .await
    }

    /// Runs a request built fresh for every attempt (signed requests need a
    /// new nonce each time).
    pub async fn execute<F>(&self, mut build: F, check: Option<BodyCheck>) -> Result<Value>
    where
        F: FnMut() -> Result<RequestBuilder>,
    {
        let this = self;
        self.retry
            .run(self.provider, move || {
                let request = build();
                async move {
                    let request = request?;
                    this.throttle.wait(this.provider).await;
                    let body = this.send_once(request).await?;
                    if let Some(check) = check {
                        check(this.provider, &body)?;
                    }
                    Ok(body)
                }
            })
            .await
    }

    async fn send_once(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!("{} responded {} ({} bytes)", self.provider, status, text.len());

        if !status.is_success() {
            return Err(classify_status(self.provider, status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ConnectorError::malformed(self.provider, e))
    }

    fn transport_error(&self, err: reqwest::Error) -> ConnectorError {
        if err.is_timeout() {
            ConnectorError::Timeout {
                provider: self.provider.to_string(),
            }
        } else {
            ConnectorError::Transient {
                provider: self.provider.to_string(),
                detail: err.to_string(),
            }
        }
    }
}

/// Maps a non-success status onto the error taxonomy.
pub fn classify_status(provider: &str, status: StatusCode, body: &str) -> ConnectorError {
    let provider = provider.to_string();
    match status {
        // 402: quota exhausted (Blockfrost and other metered APIs).
        StatusCode::TOO_MANY_REQUESTS | StatusCode::PAYMENT_REQUIRED => {
            ConnectorError::RateLimited { provider }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ConnectorError::Unauthorized {
            provider,
            detail: excerpt(body),
        },
        StatusCode::NOT_FOUND => ConnectorError::NotFound { provider },
        StatusCode::REQUEST_TIMEOUT => ConnectorError::Timeout { provider },
        s if s.is_server_error() => ConnectorError::Server {
            provider,
            status: s.as_u16(),
        },
        s => ConnectorError::Rejected {
            provider,
            detail: format!("HTTP {}: {}", s.as_u16(), excerpt(body)),
        },
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(ERROR_EXCERPT).collect()
}

/// Required string member of a JSON object.
pub(crate) fn str_field<'a>(provider: &str, value: &'a Value, key: &str) -> Result<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ConnectorError::malformed(provider, format!("missing '{}'", key)))
}

/// Required array member of a JSON object.
pub(crate) fn array_field<'a>(provider: &str, value: &'a Value, key: &str) -> Result<&'a Vec<Value>> {
    value
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ConnectorError::malformed(provider, format!("missing '{}' array", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status("P", StatusCode::TOO_MANY_REQUESTS, ""),
            ConnectorError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_status("P", StatusCode::PAYMENT_REQUIRED, ""),
            ConnectorError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_status("P", StatusCode::BAD_GATEWAY, ""),
            ConnectorError::Server { status: 502, .. }
        ));
        assert!(matches!(
            classify_status("P", StatusCode::FORBIDDEN, "bad key"),
            ConnectorError::Unauthorized { .. }
        ));
        assert!(matches!(
            classify_status("P", StatusCode::NOT_FOUND, ""),
            ConnectorError::NotFound { .. }
        ));
        match classify_status("P", StatusCode::BAD_REQUEST, &"x".repeat(500)) {
            ConnectorError::Rejected { detail, .. } => assert!(detail.len() < 220),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_field_helpers() {
        let body = json!({ "hash": "0xabc", "rows": [1, 2] });
        assert_eq!(str_field("P", &body, "hash").unwrap(), "0xabc");
        assert_eq!(array_field("P", &body, "rows").unwrap().len(), 2);
        assert!(matches!(
            str_field("P", &body, "missing"),
            Err(ConnectorError::Malformed { .. })
        ));
    }
}
