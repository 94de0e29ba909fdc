//! Wallet error types and the toolkit-wide error taxonomy.

use crate::backend::BackendError;
use crate::settle::SettleError;
use cnft_rpc::RpcError;
use cnft_tx::TxError;
use cnft_types::TypesError;
use thiserror::Error;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or missing input, caught before any network call.
    Validation,
    /// A holdings requirement was not met.
    Authorization,
    /// A collaborator returned data failing a structural check.
    MalformedResponse,
    /// Transport failure, already retried.
    NetworkFailure,
    /// Settlement unknown: the hash never appeared.
    ConfirmationTimeout,
    UnsupportedSchema,
    /// The operator declined to continue, or refused to sign.
    UserAborted,
    /// Misconfigured environment (e.g. wallet and indexer on different networks).
    Configuration,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::MalformedResponse => "malformed response",
            ErrorKind::NetworkFailure => "network failure",
            ErrorKind::ConfirmationTimeout => "confirmation timeout",
            ErrorKind::UnsupportedSchema => "unsupported schema",
            ErrorKind::UserAborted => "user aborted",
            ErrorKind::Configuration => "configuration",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("aborted by operator after {item}")]
    UserAborted { item: String },

    #[error("plan error: {0}")]
    Tx(#[from] TxError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("malformed data: {0}")]
    Types(#[from] TypesError),

    #[error(transparent)]
    Settle(#[from] SettleError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::Validation(_) => ErrorKind::Validation,
            WalletError::Authorization(_) => ErrorKind::Authorization,
            WalletError::Config(_) => ErrorKind::Configuration,
            WalletError::UserAborted { .. } => ErrorKind::UserAborted,
            WalletError::Tx(e) => tx_kind(e),
            WalletError::Rpc(e) => rpc_kind(e),
            WalletError::Backend(e) => e.kind(),
            WalletError::Settle(e) => e.kind(),
            WalletError::Json(_) | WalletError::Types(_) => ErrorKind::MalformedResponse,
            WalletError::Storage(_) | WalletError::Io(_) => ErrorKind::Configuration,
            WalletError::Other(_) => ErrorKind::Validation,
        }
    }
}

pub(crate) fn tx_kind(e: &TxError) -> ErrorKind {
    match e {
        TxError::UnsupportedSchema(_) => ErrorKind::UnsupportedSchema,
        _ => ErrorKind::Validation,
    }
}

pub(crate) fn rpc_kind(e: &RpcError) -> ErrorKind {
    match e {
        RpcError::Json(_) | RpcError::NoResult { .. } => ErrorKind::MalformedResponse,
        RpcError::AuthFailed { .. } => ErrorKind::Configuration,
        _ => ErrorKind::NetworkFailure,
    }
}
