//! Cardano NFT toolkit orchestration core.
//!
//! Eligibility filtering over wallet snapshots, transaction settlement,
//! sequential batches with per-item recovery, the vending machine loop,
//! on-chain polls, listing watches, and transaction history. Collaborators
//! (wallet, transaction library, indexer, marketplace, metadata storage) are
//! traits bound into a [`Context`] that every operation receives.

pub mod backend;
pub mod batch;
pub mod context;
pub mod error;
pub mod exclusion;
pub mod filter;
pub mod history;
pub mod metadata;
pub mod planner;
pub mod settle;
pub mod vending;
pub mod voting;
pub mod watch;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{
    BackendError, Indexer, Marketplace, MetadataStore, SignedTx, Signer, TxBackend, UnsignedTx, WalletBackend, Witness,
};
pub use batch::{
    BatchEvent, BatchItem, BatchOrchestrator, BatchReport, BatchSpec, BatchState, FailurePolicy, InputClaim,
    ItemAction, ItemOutcome, ItemPlanner,
};
pub use context::Context;
pub use error::{ErrorKind, WalletError};
pub use exclusion::ExclusionSet;
pub use filter::{filter, require_ratio, Eligible, TokenGate};
pub use planner::ActionPlanner;
pub use settle::{ConfirmVia, Executor, SettleConfig, SettleError, SettlementOutcome, Stage};
pub use vending::{Pricing, VendingConfig, VendingHandle, VendingSession, VendingState};
pub use watch::{Alert, Watch, WatchStore};
