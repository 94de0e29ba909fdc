//! Spendable outputs and the read-only ledger view of a wallet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::asset::{AssetId, AssetMap, Quantity};
use crate::constants::TX_HASH_LENGTH;
use crate::TypesError;

/// Reference to a transaction output: `(tx_hash, index)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub tx_hash: String,
    pub index: u32,
}

impl OutputRef {
    pub fn new(tx_hash: impl Into<String>, index: u32) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            index,
        }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.index)
    }
}

impl FromStr for OutputRef {
    type Err = TypesError;

    /// Parse `hash#index`.
    fn from_str(s: &str) -> Result<Self, TypesError> {
        let (hash, index) = s
            .split_once('#')
            .ok_or_else(|| TypesError::InvalidOutputRef(s.to_string()))?;
        if hash.len() != TX_HASH_LENGTH || hex::decode(hash).is_err() {
            return Err(TypesError::InvalidOutputRef(s.to_string()));
        }
        let index = index
            .parse()
            .map_err(|_| TypesError::InvalidOutputRef(s.to_string()))?;
        Ok(Self::new(hash, index))
    }
}

/// An unspent transaction output. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub out_ref: OutputRef,
    pub address: String,
    pub assets: AssetMap,
    /// Hash of attached data, if any.
    #[serde(default)]
    pub datum_hash: Option<String>,
    /// Inline or resolved datum, hex-encoded CBOR.
    #[serde(default)]
    pub datum: Option<String>,
    /// Wallet-encoded `TransactionUnspentOutput`, when the output came from a wallet.
    #[serde(default)]
    pub cbor: Option<String>,
}

impl Utxo {
    pub fn new(out_ref: OutputRef, address: impl Into<String>, assets: AssetMap) -> Self {
        Self {
            out_ref,
            address: address.into(),
            assets,
            datum_hash: None,
            datum: None,
            cbor: None,
        }
    }

    pub fn lovelace(&self) -> Quantity {
        self.assets.lovelace()
    }

    pub fn holds(&self, asset: &AssetId) -> bool {
        self.assets.contains(asset)
    }
}

/// Snapshot of a wallet's spendable state at one decision point.
///
/// Snapshots are values: fetch a fresh one instead of patching an old one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub utxos: Vec<Utxo>,
    /// Payment address change is returned to.
    pub change_address: String,
    /// Stake (reward) address, when the wallet is staked.
    #[serde(default)]
    pub reward_address: Option<String>,
    /// Outputs reserved as collateral.
    #[serde(default)]
    pub collateral: Vec<Utxo>,
}

impl LedgerSnapshot {
    pub fn find(&self, out_ref: &OutputRef) -> Option<&Utxo> {
        self.utxos.iter().find(|u| &u.out_ref == out_ref)
    }

    /// Outputs created by transaction `tx_hash`.
    pub fn outputs_of<'a>(&'a self, tx_hash: &'a str) -> impl Iterator<Item = &'a Utxo> + 'a {
        self.utxos.iter().filter(move |u| u.out_ref.tx_hash == tx_hash)
    }

    /// Whether any spendable output was created by `tx_hash`.
    pub fn contains_tx(&self, tx_hash: &str) -> bool {
        self.outputs_of(tx_hash).next().is_some()
    }

    /// Total balance across all spendable outputs.
    pub fn total(&self) -> AssetMap {
        let mut total = AssetMap::new();
        for utxo in &self.utxos {
            total.merge(&utxo.assets);
        }
        total
    }
}
