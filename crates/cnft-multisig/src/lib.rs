//! Multi-signature transactions for cnft-rs.
//!
//! A treasury or policy key held by several principals signs in turns:
//! [`initiate`] produces a [`PartialSignedTx`], [`cosign`] adds witnesses,
//! [`complete`] verifies the body, adds the last witness and submits.

pub mod cosign;
pub mod tx_set;

pub use cosign::{complete, cosign, initiate};
pub use tx_set::PartialSignedTx;

use cnft_wallet::{ErrorKind, SettleError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MultisigError {
    /// The locally rebuilt body differs from the one being co-signed.
    #[error("rebuilt transaction body differs from the stored body ({} vs {} hex chars)", .rebuilt.len(), .stored.len())]
    BodyMismatch { stored: String, rebuilt: String },

    #[error("stored transaction is a {stored} plan, rebuilt a {rebuilt} plan")]
    KindMismatch { stored: String, rebuilt: String },

    #[error(transparent)]
    Settle(#[from] SettleError),
}

impl MultisigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MultisigError::BodyMismatch { .. } | MultisigError::KindMismatch { .. } => ErrorKind::Validation,
            MultisigError::Settle(e) => e.kind(),
        }
    }
}
