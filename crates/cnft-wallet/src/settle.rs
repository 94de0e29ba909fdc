//! Settlement: finalize, sign, submit, and confirm.
//!
//! Submission is a strict pipeline. Each stage fails on its own and the
//! failure records which stage it came from, so a caller can tell "never left
//! the machine" from "rejected by the network". Confirmation polls a
//! [`ConfirmationSource`] a bounded number of times; running out of attempts
//! means the outcome is unknown, not failed.

use crate::backend::{BackendError, Indexer, SignedTx, Signer, TxBackend, WalletBackend};
use crate::error::{tx_kind, ErrorKind, WalletError};
use async_trait::async_trait;
use cnft_tx::{TxError, TxPlan};
use cnft_types::constants::TX_HASH_LENGTH;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default confirmation poll interval.
pub const CONFIRM_INTERVAL: Duration = Duration::from_secs(30);

/// Default confirmation attempts.
pub const CONFIRM_ATTEMPTS: u32 = 12;

// =============================================================================
// Errors and Outcomes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Finalize,
    Sign,
    Submit,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Finalize => "finalize",
            Stage::Sign => "sign",
            Stage::Submit => "submit",
        })
    }
}

#[derive(Debug, Error)]
pub enum SettleError {
    /// The plan could not be lowered; nothing was sent anywhere.
    #[error("plan rejected: {0}")]
    Plan(#[from] TxError),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: BackendError,
    },

    /// The submitter answered with something other than a transaction hash.
    #[error("submission returned a {} character identifier instead of a transaction hash", .returned.len())]
    MalformedHash { returned: String },

    #[error("transaction {hash} not seen after {attempts} attempts")]
    ConfirmationTimeout { hash: String, attempts: u32 },
}

impl SettleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettleError::Plan(e) => tx_kind(e),
            SettleError::Stage { source, .. } => source.kind(),
            SettleError::MalformedHash { .. } => ErrorKind::MalformedResponse,
            SettleError::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
        }
    }

    /// Whether the transaction certainly never reached the network.
    pub fn never_submitted(&self) -> bool {
        match self {
            SettleError::Plan(_) => true,
            SettleError::Stage { stage, .. } => *stage != Stage::Submit,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// Accepted by the submitter; settlement was not awaited.
    Submitted { hash: String, signed: SignedTx },
    Confirmed { hash: String, signed: SignedTx },
    /// Submitted, but not seen settled within the poll budget. The
    /// transaction may still land.
    Unconfirmed {
        hash: String,
        signed: SignedTx,
        attempts: u32,
    },
    Failed(Arc<SettleError>),
}

impl SettlementOutcome {
    fn failed(e: SettleError) -> Self {
        SettlementOutcome::Failed(Arc::new(e))
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, SettlementOutcome::Confirmed { .. })
    }

    pub fn is_unconfirmed(&self) -> bool {
        matches!(self, SettlementOutcome::Unconfirmed { .. })
    }

    /// The transaction hash, whenever the submitter returned one.
    pub fn hash(&self) -> Option<&str> {
        match self {
            SettlementOutcome::Submitted { hash, .. }
            | SettlementOutcome::Confirmed { hash, .. }
            | SettlementOutcome::Unconfirmed { hash, .. } => Some(hash),
            SettlementOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&SettleError> {
        match self {
            SettlementOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// A transaction hash is exactly 64 hex characters.
pub fn check_hash(returned: &str) -> Result<(), SettleError> {
    if returned.len() == TX_HASH_LENGTH && returned.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(SettleError::MalformedHash {
            returned: returned.to_string(),
        })
    }
}

// =============================================================================
// Confirmation Sources
// =============================================================================

#[async_trait]
pub trait ConfirmationSource: Send + Sync {
    /// Whether `hash` has settled.
    async fn is_settled(&self, hash: &str) -> Result<bool, WalletError>;
}

/// Settled once the wallet holds an output created by the transaction.
pub struct WalletUtxos(pub Arc<dyn WalletBackend>);

#[async_trait]
impl ConfirmationSource for WalletUtxos {
    async fn is_settled(&self, hash: &str) -> Result<bool, WalletError> {
        let utxos = self.0.utxos().await?;
        Ok(utxos.iter().any(|u| u.out_ref.tx_hash == hash))
    }
}

/// Settled once the indexer reports the transaction in a block.
pub struct IndexerStatus(pub Arc<dyn Indexer>);

#[async_trait]
impl ConfirmationSource for IndexerStatus {
    async fn is_settled(&self, hash: &str) -> Result<bool, WalletError> {
        Ok(self.0.tx_settled(hash).await?)
    }
}

// =============================================================================
// Executor
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfirmVia {
    /// Scan the wallet's outputs for the hash.
    #[default]
    WalletUtxos,
    /// Ask the indexer for the transaction.
    Indexer,
}

#[derive(Debug, Clone)]
pub struct SettleConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub confirm_via: ConfirmVia,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            poll_interval: CONFIRM_INTERVAL,
            max_attempts: CONFIRM_ATTEMPTS,
            confirm_via: ConfirmVia::default(),
        }
    }
}

pub struct Executor {
    tx: Arc<dyn TxBackend>,
    source: Arc<dyn ConfirmationSource>,
    config: SettleConfig,
}

impl Executor {
    pub fn new(tx: Arc<dyn TxBackend>, source: Arc<dyn ConfirmationSource>, config: SettleConfig) -> Self {
        Self { tx, source, config }
    }

    pub fn config(&self) -> &SettleConfig {
        &self.config
    }

    /// Finalize, sign with each signer in order, assemble, and submit.
    pub async fn submit(&self, plan: &TxPlan, signers: &[Signer]) -> SettlementOutcome {
        match self.send(plan, signers).await {
            Ok((hash, signed)) => SettlementOutcome::Submitted { hash, signed },
            Err(e) => {
                log::warn!("{} transaction failed: {}", plan.kind(), e);
                SettlementOutcome::failed(e)
            }
        }
    }

    /// [`submit`](Self::submit) with the error kept by value.
    pub async fn send(&self, plan: &TxPlan, signers: &[Signer]) -> Result<(String, SignedTx), SettleError> {
        if signers.is_empty() {
            return Err(TxError::Validation("no signers".into()).into());
        }
        let draft = plan.lower()?;

        let unsigned = self.tx.finalize(&draft).await.map_err(|source| SettleError::Stage {
            stage: Stage::Finalize,
            source,
        })?;

        let mut witnesses = Vec::with_capacity(signers.len());
        for signer in signers {
            let w = self.tx.sign(&unsigned, signer).await.map_err(|source| SettleError::Stage {
                stage: Stage::Sign,
                source,
            })?;
            witnesses.push(w);
        }
        let signed = self
            .tx
            .assemble(&unsigned, &witnesses)
            .await
            .map_err(|source| SettleError::Stage {
                stage: Stage::Sign,
                source,
            })?;

        let hash = self.tx.submit(&signed).await.map_err(|source| SettleError::Stage {
            stage: Stage::Submit,
            source,
        })?;
        check_hash(&hash)?;
        log::info!("submitted {} transaction {}", plan.kind(), hash);
        Ok((hash, signed))
    }

    /// Poll until `hash` settles or attempts run out.
    pub async fn confirm(&self, hash: &str) -> Result<(), SettleError> {
        let attempts = self.config.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.source.is_settled(hash).await {
                Ok(true) => {
                    log::info!("transaction {} settled after {} attempt(s)", hash, attempt);
                    return Ok(());
                }
                Ok(false) => log::debug!("transaction {} not settled (attempt {}/{})", hash, attempt, attempts),
                Err(e) => log::warn!("confirmation check for {} failed (attempt {}/{}): {}", hash, attempt, attempts, e),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }
        Err(SettleError::ConfirmationTimeout {
            hash: hash.to_string(),
            attempts,
        })
    }

    /// Submit, then wait for confirmation. Running out of attempts yields
    /// [`SettlementOutcome::Unconfirmed`], never `Failed`.
    pub async fn settle(&self, plan: &TxPlan, signers: &[Signer]) -> SettlementOutcome {
        let (hash, signed) = match self.send(plan, signers).await {
            Ok(sent) => sent,
            Err(e) => {
                log::warn!("{} transaction failed: {}", plan.kind(), e);
                return SettlementOutcome::failed(e);
            }
        };
        match self.confirm(&hash).await {
            Ok(()) => SettlementOutcome::Confirmed { hash, signed },
            Err(SettleError::ConfirmationTimeout { attempts, .. }) => {
                log::warn!("{} transaction {} unconfirmed after {} attempts", plan.kind(), hash, attempts);
                SettlementOutcome::Unconfirmed { hash, signed, attempts }
            }
            Err(e) => SettlementOutcome::failed(e),
        }
    }
}
