//! RPC error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP error calling {method} {url}: {source}")]
    Http {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned HTTP {status}: {body}")]
    HttpStatus {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// Structured error body (`{status_code, error, message}`).
    #[error("{endpoint}: {error} ({status_code}): {message}")]
    Api {
        endpoint: String,
        status_code: u16,
        error: String,
        message: String,
    },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication failed for {url}")]
    AuthFailed { url: String },

    #[error("not found: {context}")]
    NotFound { context: String },

    #[error("no result in response to {context}")]
    NoResult { context: String },

    #[error("unrecoverable error after {attempts} attempts: {last}")]
    Unrecoverable {
        attempts: u32,
        #[source]
        last: Box<RpcError>,
    },

    #[error("{0}")]
    Other(String),
}

impl RpcError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Http { .. } => true,
            RpcError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            RpcError::Api { status_code, .. } => *status_code == 429 || *status_code >= 500,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RpcError::NotFound { .. })
    }
}
