//! Collaborator interfaces.
//!
//! The wallet, the transaction library, the indexer, the marketplace and
//! metadata storage are external services. Everything in this crate talks
//! to them through these traits; the `cnft-rpc` clients implement the
//! HTTP-backed ones.

use crate::error::ErrorKind;
use async_trait::async_trait;
use cnft_rpc::indexer::TxUtxos;
use cnft_rpc::marketplace::TokenListing;
use cnft_rpc::{IndexerRpc, MarketplaceRpc, RpcError, StorageRpc};
use cnft_tx::{TxDescriptor, TxDraft};
use cnft_types::{AssetId, LedgerSnapshot, Network, Quantity, Utxo};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The user refused (e.g. declined to sign).
    #[error("declined: {0}")]
    Declined(String),

    /// The library or network refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The collaborator could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The collaborator answered with something unusable.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Declined(_) => ErrorKind::UserAborted,
            BackendError::Rejected(_) | BackendError::Unavailable(_) => ErrorKind::NetworkFailure,
            BackendError::Malformed(_) => ErrorKind::MalformedResponse,
        }
    }
}

// =============================================================================
// Transaction Artifacts
// =============================================================================

/// Finalized transaction awaiting signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTx {
    /// Serialized transaction body.
    #[serde(with = "hex_bytes")]
    pub body: Vec<u8>,
}

impl UnsignedTx {
    pub fn body_hex(&self) -> String {
        hex::encode(&self.body)
    }
}

/// One principal's witness over a transaction body (hex CBOR).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub cbor: String,
}

/// Transaction with its witness set, ready to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    pub cbor: String,
}

/// Who signs.
#[derive(Clone, PartialEq, Eq)]
pub enum Signer {
    /// The connected wallet, which may prompt its user.
    Wallet,
    /// A raw signing key (bech32 `ed25519_sk...`).
    Key(String),
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signer::Wallet => f.write_str("Wallet"),
            Signer::Key(_) => f.write_str("Key(..)"),
        }
    }
}

mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(de::Error::custom)
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Connected wallet (CIP-30-like).
#[async_trait]
pub trait WalletBackend: Send + Sync {
    /// 1 for mainnet, 0 for the test networks.
    async fn network_id(&self) -> Result<u8, BackendError>;
    async fn utxos(&self) -> Result<Vec<Utxo>, BackendError>;
    async fn collateral(&self) -> Result<Vec<Utxo>, BackendError>;
    async fn change_address(&self) -> Result<String, BackendError>;
    async fn reward_address(&self) -> Result<Option<String>, BackendError>;

    /// Fresh view of the wallet's spendable state.
    async fn snapshot(&self) -> Result<LedgerSnapshot, BackendError> {
        Ok(LedgerSnapshot {
            utxos: self.utxos().await?,
            change_address: self.change_address().await?,
            reward_address: self.reward_address().await?,
            collateral: self.collateral().await?,
        })
    }
}

/// The transaction-building library: balances, signs, and submits.
#[async_trait]
pub trait TxBackend: Send + Sync {
    async fn finalize(&self, draft: &TxDraft) -> Result<UnsignedTx, BackendError>;
    async fn sign(&self, tx: &UnsignedTx, signer: &Signer) -> Result<Witness, BackendError>;
    async fn assemble(&self, tx: &UnsignedTx, witnesses: &[Witness]) -> Result<SignedTx, BackendError>;
    /// Returns the identifier the network reported; callers validate it.
    async fn submit(&self, tx: &SignedTx) -> Result<String, BackendError>;
}

/// Chain indexer queries.
#[async_trait]
pub trait Indexer: Send + Sync {
    fn network(&self) -> Network;
    async fn utxos_at(&self, address: &str) -> Result<Vec<Utxo>, RpcError>;
    /// Address of the first input of `tx_hash`.
    async fn payer_of(&self, tx_hash: &str) -> Result<String, RpcError>;
    /// Whether `tx_hash` is in a block.
    async fn tx_settled(&self, tx_hash: &str) -> Result<bool, RpcError>;
    async fn tx_utxos(&self, tx_hash: &str) -> Result<TxUtxos, RpcError>;
    /// Stake account of `address`, or the address itself when unstaked.
    async fn account_of(&self, address: &str) -> Result<String, RpcError>;
    async fn account_addresses(&self, stake_address: &str) -> Result<Vec<String>, RpcError>;
    /// Hashes of transactions touching `address`, newest first.
    async fn transactions_of(&self, address: &str) -> Result<Vec<String>, RpcError>;
}

/// Marketplace transaction-build and search API.
#[async_trait]
pub trait Marketplace: Send + Sync {
    async fn build_listing(
        &self,
        asset: &AssetId,
        price: &Quantity,
        collateral: &Utxo,
        input: &Utxo,
        address: &str,
        stake_address: &str,
    ) -> Result<TxDescriptor, RpcError>;

    async fn build_delisting(
        &self,
        listing_id: u64,
        collateral: &Utxo,
        input: &Utxo,
        address: &str,
        stake_address: &str,
    ) -> Result<TxDescriptor, RpcError>;

    async fn heal(&self, asset: &AssetId) -> Result<(), RpcError>;

    async fn search_listings(
        &self,
        policy_id: &str,
        traits: &serde_json::Value,
        size: u32,
    ) -> Result<Vec<TokenListing>, RpcError>;
}

/// Content-addressed blob storage.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Store `blob`, returning its content identifier.
    async fn store(&self, blob: &[u8]) -> Result<String, RpcError>;
}

// =============================================================================
// HTTP Implementations
// =============================================================================

#[async_trait]
impl Indexer for IndexerRpc {
    fn network(&self) -> Network {
        IndexerRpc::network(self)
    }

    async fn utxos_at(&self, address: &str) -> Result<Vec<Utxo>, RpcError> {
        IndexerRpc::utxos_at(self, address).await
    }

    async fn payer_of(&self, tx_hash: &str) -> Result<String, RpcError> {
        IndexerRpc::payer_of(self, tx_hash).await
    }

    async fn tx_settled(&self, tx_hash: &str) -> Result<bool, RpcError> {
        Ok(self.tx(tx_hash).await?.is_some())
    }

    async fn tx_utxos(&self, tx_hash: &str) -> Result<TxUtxos, RpcError> {
        IndexerRpc::tx_utxos(self, tx_hash).await
    }

    async fn account_of(&self, address: &str) -> Result<String, RpcError> {
        IndexerRpc::account_of(self, address).await
    }

    async fn account_addresses(&self, stake_address: &str) -> Result<Vec<String>, RpcError> {
        IndexerRpc::account_addresses(self, stake_address).await
    }

    async fn transactions_of(&self, address: &str) -> Result<Vec<String>, RpcError> {
        let txs = self.address_transactions(address).await?;
        Ok(txs.into_iter().map(|t| t.tx_hash).collect())
    }
}

#[async_trait]
impl Marketplace for MarketplaceRpc {
    async fn build_listing(
        &self,
        asset: &AssetId,
        price: &Quantity,
        collateral: &Utxo,
        input: &Utxo,
        address: &str,
        stake_address: &str,
    ) -> Result<TxDescriptor, RpcError> {
        let built = MarketplaceRpc::build_listing(self, asset, price, collateral, input, address, stake_address).await?;
        Ok(TxDescriptor { cbor: built.cbor })
    }

    async fn build_delisting(
        &self,
        listing_id: u64,
        collateral: &Utxo,
        input: &Utxo,
        address: &str,
        stake_address: &str,
    ) -> Result<TxDescriptor, RpcError> {
        let built = MarketplaceRpc::build_delisting(self, listing_id, collateral, input, address, stake_address).await?;
        Ok(TxDescriptor { cbor: built.cbor })
    }

    async fn heal(&self, asset: &AssetId) -> Result<(), RpcError> {
        MarketplaceRpc::heal(self, asset).await
    }

    async fn search_listings(
        &self,
        policy_id: &str,
        traits: &serde_json::Value,
        size: u32,
    ) -> Result<Vec<TokenListing>, RpcError> {
        MarketplaceRpc::search_listings(self, policy_id, traits, size).await
    }
}

#[async_trait]
impl MetadataStore for StorageRpc {
    async fn store(&self, blob: &[u8]) -> Result<String, RpcError> {
        self.store_blob(blob).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signer_debug_hides_key() {
        let s = Signer::Key("ed25519_sk1secret".into());
        assert_eq!(format!("{:?}", s), "Key(..)");
    }

    #[test]
    fn test_unsigned_tx_hex_serde() {
        let tx = UnsignedTx { body: vec![0xa4, 0x00] };
        let json = serde_json::to_string(&tx).unwrap();
        assert_eq!(json, r#"{"body":"a400"}"#);
        let back: UnsignedTx = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
    }

    #[test]
    fn test_backend_error_kinds() {
        assert_eq!(BackendError::Declined("no".into()).kind(), ErrorKind::UserAborted);
        assert_eq!(BackendError::Rejected("bad".into()).kind(), ErrorKind::NetworkFailure);
        assert_eq!(BackendError::Malformed("?".into()).kind(), ErrorKind::MalformedResponse);
    }
}
