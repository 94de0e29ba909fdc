//! Core types and constants for the Cardano NFT toolkit.
//!
//! This crate provides the foundational types used across all toolkit crates:
//! network configurations and slot arithmetic, asset identifiers with
//! arbitrary-precision quantities, and the read-only ledger view of a
//! wallet's spendable outputs.

pub mod asset;
pub mod constants;
pub mod utxo;

pub use asset::{parse_quantity, AssetId, AssetMap, PolicyId, Quantity};
pub use constants::{Network, SlotConfig};
pub use utxo::{LedgerSnapshot, OutputRef, Utxo};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid policy id length: expected 56 hex chars, got {0}")]
    InvalidPolicyLength(usize),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid output reference: {0}")]
    InvalidOutputRef(String),

    #[error("unknown network: {0}")]
    UnknownNetwork(String),
}
