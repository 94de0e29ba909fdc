//! Base REST client.
//!
//! Provides `get()`, `post()`, `patch()` and `post_bytes()` against a base URL,
//! page-by-page collection for paginated endpoints, optional `project_id` /
//! bearer authentication, configurable timeout, and bounded retry of
//! transient failures.

use crate::error::RpcError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Structured error body returned by REST services.
#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    status_code: u16,
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Ceiling for exponential backoff; a longer configured base delay still wins.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Delay policy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles each attempt, up to [`MAX_RETRY_DELAY`].
    Exponential,
}

/// Configuration for a REST client.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Base URL (e.g., `https://cardano-mainnet.blockfrost.io/api/v0`).
    pub url: String,
    /// Sent as the `project_id` header when set.
    pub project_id: Option<String>,
    /// Sent as `Authorization: Bearer ...` when set.
    pub bearer_token: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Number of retry attempts on transient failure.
    pub retries: u32,
    /// Delay between retries.
    pub retry_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            project_id: None,
            bearer_token: None,
            timeout: Duration::from_secs(30),
            retries: 2,
            retry_delay: Duration::from_millis(500),
            backoff: Backoff::Exponential,
        }
    }
}

enum Payload<'a> {
    Empty,
    Json(&'a Value),
    Bytes(&'a [u8]),
}

/// Async REST client.
pub struct RpcClient {
    client: reqwest::Client,
    config: RpcConfig,
}

impl RpcClient {
    /// Create a new client with the given URL.
    pub fn new(url: &str) -> Self {
        Self::with_config(RpcConfig {
            url: url.to_string(),
            ..Default::default()
        })
    }

    /// Create a new client with full configuration.
    pub fn with_config(mut config: RpcConfig) -> Self {
        config.url = config.url.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(4)
            .build()
            .expect("failed to create HTTP client");

        Self { client, config }
    }

    /// Get the configured base URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.url, endpoint.trim_start_matches('/'))
    }

    fn build_headers(&self, content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        if let Some(id) = self.config.project_id.as_deref() {
            if let Ok(value) = HeaderValue::from_str(id) {
                headers.insert("project_id", value);
            }
        }
        if let Some(token) = self.config.bearer_token.as_deref() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    /// Delay before retry number `attempt` (1-based).
    fn retry_delay(&self, attempt: u32) -> Duration {
        match self.config.backoff {
            Backoff::Fixed => self.config.retry_delay,
            Backoff::Exponential => {
                let base = self.config.retry_delay;
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.checked_mul(factor)
                    .map_or(MAX_RETRY_DELAY, |d| d.min(MAX_RETRY_DELAY))
                    .max(base)
            }
        }
    }

    /// GET an endpoint relative to the base URL.
    pub async fn get(&self, endpoint: &str) -> Result<Value, RpcError> {
        self.request(Method::GET, endpoint, Payload::Empty).await
    }

    /// POST a JSON body.
    pub async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, RpcError> {
        self.request(Method::POST, endpoint, Payload::Json(body)).await
    }

    /// PATCH with no body.
    pub async fn patch(&self, endpoint: &str) -> Result<Value, RpcError> {
        self.request(Method::PATCH, endpoint, Payload::Empty).await
    }

    /// POST raw bytes.
    pub async fn post_bytes(&self, endpoint: &str, body: &[u8]) -> Result<Value, RpcError> {
        self.request(Method::POST, endpoint, Payload::Bytes(body)).await
    }

    /// GET every page of a paginated endpoint.
    ///
    /// Pages are requested with `page=1, 2, ...`; an empty page ends the walk.
    pub async fn get_paginated<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, RpcError> {
        let mut out = Vec::new();
        let mut page = 1u32;
        loop {
            let mut query = format!("page={}", page);
            for (k, v) in params {
                query.push_str(&format!("&{}={}", k, v));
            }
            let val = self.get(&format!("{}?{}", endpoint, query)).await?;
            let items: Vec<T> = serde_json::from_value(val)?;
            if items.is_empty() {
                break;
            }
            out.extend(items);
            page += 1;
        }
        Ok(out)
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        payload: Payload<'_>,
    ) -> Result<Value, RpcError> {
        let url = self.endpoint_url(endpoint);
        let attempts = self.config.retries + 1;
        let mut last_err = RpcError::NoResult {
            context: endpoint.to_string(),
        };

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay(attempt)).await;
            }

            match self.do_request(&method, &url, &payload).await {
                Ok(val) => return Ok(val),
                Err(e) => {
                    if !e.is_transient() {
                        return Err(e);
                    }
                    log::warn!(
                        "{} {} failed (attempt {}/{}): {}",
                        method,
                        endpoint,
                        attempt + 1,
                        attempts,
                        e
                    );
                    last_err = e;
                }
            }
        }

        Err(RpcError::Unrecoverable {
            attempts,
            last: Box::new(last_err),
        })
    }

    async fn do_request(
        &self,
        method: &Method,
        url: &str,
        payload: &Payload<'_>,
    ) -> Result<Value, RpcError> {
        log::debug!("{} {}", method, url);

        let http_err = |e: reqwest::Error| RpcError::Http {
            method: method.to_string(),
            url: url.to_string(),
            source: e,
        };

        let req = self.client.request(method.clone(), url);
        let req = match payload {
            Payload::Empty => req.headers(self.build_headers("application/json")),
            Payload::Json(body) => req.headers(self.build_headers("application/json")).json(body),
            Payload::Bytes(body) => req
                .headers(self.build_headers("application/octet-stream"))
                .body(body.to_vec()),
        };

        let resp = req.send().await.map_err(http_err)?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(http_err)?;

        if status == 401 || status == 403 {
            return Err(RpcError::AuthFailed {
                url: url.to_string(),
            });
        }

        if status == 404 {
            return Err(RpcError::NotFound {
                context: url.to_string(),
            });
        }

        if status >= 400 {
            if let Ok(body) = serde_json::from_str::<ApiErrorBody>(&text) {
                if !body.error.is_empty() {
                    return Err(RpcError::Api {
                        endpoint: url.to_string(),
                        status_code: status,
                        error: body.error,
                        message: body.message,
                    });
                }
            }
            return Err(RpcError::HttpStatus {
                method: method.to_string(),
                url: url.to_string(),
                status,
                body: text.chars().take(500).collect(),
            });
        }

        let val: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };

        if let Some(err) = embedded_error(url, &val) {
            return Err(err);
        }

        Ok(val)
    }

    /// Simple connectivity check.
    pub async fn is_connected(&self) -> bool {
        self.get("health").await.is_ok()
    }
}

/// Some services answer 200 with an error object in the body.
fn embedded_error(url: &str, val: &Value) -> Option<RpcError> {
    let error = val.get("error")?;
    if error.is_null() || error == &Value::Bool(false) {
        return None;
    }
    let body: ApiErrorBody = serde_json::from_value(val.clone()).unwrap_or(ApiErrorBody {
        status_code: 0,
        error: error.to_string(),
        message: String::new(),
    });
    Some(RpcError::Api {
        endpoint: url.to_string(),
        status_code: body.status_code,
        error: if body.error.is_empty() {
            error.to_string()
        } else {
            body.error
        },
        message: body.message,
    })
}
