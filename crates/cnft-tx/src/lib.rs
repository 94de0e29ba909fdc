//! Cardano NFT toolkit transaction planning.
//!
//! Turns high-level intents (pay a fee, split outputs, list or delist an
//! asset, purchase marketplace listings, mint a vending sale, pay addresses,
//! cast and redeem poll ballots)
//! into immutable [`TxPlan`] values, and lowers them into the declarative
//! descriptions the external transaction library finalizes. Marketplace
//! datum decomposition is dispatched through a [`SchemaRegistry`].

pub mod types;
pub mod plutus;
pub mod builder;
pub mod fee;
pub mod schema;
pub mod plan;

pub use types::{Script, ScriptKind, TxDescription, TxDescriptor, TxDraft, TxInput, TxOutput};
pub use builder::TxBuilder;
pub use fee::FeeSchedule;
pub use plutus::PlutusData;
pub use schema::{Listing, Payee, PayeeRole, SchemaHandler, SchemaRegistry};
pub use plan::{
    Ballot, FeePlan, ListingAction, ListingPlan, MintDescriptor, MintPlan, MintPolicy, Payment, PaymentPlan, Poll,
    PurchasePlan, SplitItem, SplitPlan, TallyPlan, TxPlan, VoteDatum, VotePlan,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxError {
    /// A required field is missing or out of range.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported datum schema: {0}")]
    UnsupportedSchema(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("invalid transaction: {0}")]
    Invalid(String),

    #[error("{0}")]
    Other(String),
}

impl From<cnft_types::TypesError> for TxError {
    fn from(e: cnft_types::TypesError) -> Self {
        TxError::Validation(e.to_string())
    }
}

impl From<serde_json::Error> for TxError {
    fn from(e: serde_json::Error) -> Self {
        TxError::Serialize(e.to_string())
    }
}
