//! Declarative transaction descriptions.
//!
//! A [`TxDescription`] is what the external transaction library consumes:
//! pinned inputs, outputs, minted assets, metadata by label, attached
//! scripts, and a validity bound. Coin selection, balancing, and fee
//! calculation stay with the library. A [`TxDescriptor`] is a transaction a
//! third party already built (marketplace CBOR) that only needs signing.

use cnft_types::{AssetMap, Utxo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Script language of an attached script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    Native,
    PlutusV1,
    PlutusV2,
}

/// Opaque script artifact: identifier plus CBOR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub kind: ScriptKind,
    /// Hex-encoded script CBOR.
    pub cbor: String,
}

/// Input consumed by the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub utxo: Utxo,
    /// Hex CBOR redeemer when spending a script-locked output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemer: Option<String>,
    /// Hex CBOR datum supplied alongside a hash-locked output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<String>,
}

/// Output produced by the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    pub assets: AssetMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<String>,
}

/// Declarative description of a transaction to finalize.
///
/// All collections are ordered so two descriptions built from the same
/// inputs serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDescription {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    #[serde(default)]
    pub mint: AssetMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mint_redeemer: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<u64, Value>,
    #[serde(default)]
    pub scripts: Vec<Script>,
    /// Upper validity bound, POSIX milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to_ms: Option<u64>,
    /// Key hashes that must sign.
    #[serde(default)]
    pub required_signers: Vec<String>,
    /// Where balancing change goes; the wallet's address when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_address: Option<String>,
}

/// Transaction built elsewhere, ready to sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDescriptor {
    /// Hex-encoded transaction CBOR.
    pub cbor: String,
}

/// Input to the transaction library's finalize step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TxDraft {
    Declarative(TxDescription),
    Prebuilt(TxDescriptor),
}
