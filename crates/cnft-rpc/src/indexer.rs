//! Chain indexer client.
//!
//! Typed async methods for the Blockfrost-compatible REST endpoints the
//! toolkit reads: address UTXOs, transaction inputs/outputs and status,
//! stake-account addresses, and address history.

use crate::client::{Backoff, RpcClient, RpcConfig};
use crate::error::RpcError;
use cnft_types::asset::parse_quantity;
use cnft_types::{AssetId, AssetMap, Network, OutputRef, TypesError, Utxo};
use serde::Deserialize;
use std::time::Duration;

/// Attempts per indexer call before giving up.
pub const INDEXER_ATTEMPTS: u32 = 3;

/// Fixed delay between indexer attempts.
pub const INDEXER_RETRY_DELAY: Duration = Duration::from_secs(5);

// =============================================================================
// Response Types
// =============================================================================

/// One `{unit, quantity}` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct Amount {
    pub unit: String,
    pub quantity: String,
}

/// Output at an address (`/addresses/{addr}/utxos`).
#[derive(Debug, Clone, Deserialize)]
pub struct AddressUtxo {
    pub address: String,
    pub tx_hash: String,
    pub output_index: u32,
    pub amount: Vec<Amount>,
    #[serde(default)]
    pub data_hash: Option<String>,
    #[serde(default)]
    pub inline_datum: Option<String>,
}

/// Input or output of a transaction (`/txs/{hash}/utxos`).
#[derive(Debug, Clone, Deserialize)]
pub struct TxIo {
    pub address: String,
    pub amount: Vec<Amount>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub output_index: u32,
    #[serde(default)]
    pub data_hash: Option<String>,
    #[serde(default)]
    pub inline_datum: Option<String>,
    #[serde(default)]
    pub collateral: bool,
    #[serde(default)]
    pub reference: bool,
}

/// Inputs and outputs of one transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct TxUtxos {
    pub hash: String,
    pub inputs: Vec<TxIo>,
    pub outputs: Vec<TxIo>,
}

/// Settled transaction (`/txs/{hash}`).
#[derive(Debug, Clone, Deserialize)]
pub struct TxInfo {
    pub hash: String,
    pub block: String,
    pub block_height: u64,
    pub block_time: u64,
    pub slot: u64,
    #[serde(default)]
    pub fees: String,
    #[serde(default)]
    pub valid_contract: bool,
}

/// Address summary (`/addresses/{addr}`).
#[derive(Debug, Clone, Deserialize)]
pub struct AddressInfo {
    pub address: String,
    #[serde(default)]
    pub stake_address: Option<String>,
    #[serde(default)]
    pub script: bool,
}

/// Address associated with a stake account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountAddress {
    pub address: String,
}

/// Transaction touching an address.
#[derive(Debug, Clone, Deserialize)]
pub struct AddressTransaction {
    pub tx_hash: String,
    pub tx_index: u32,
    pub block_height: u64,
    pub block_time: u64,
}

/// Service health (`/health`).
#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub is_healthy: bool,
}

/// Latest block (`/blocks/latest`).
#[derive(Debug, Clone, Deserialize)]
pub struct BlockInfo {
    pub hash: String,
    #[serde(default)]
    pub height: Option<u64>,
    #[serde(default)]
    pub slot: Option<u64>,
    pub time: u64,
}

pub(crate) fn amounts_to_map(amounts: &[Amount]) -> Result<AssetMap, TypesError> {
    let mut map = AssetMap::new();
    for amount in amounts {
        map.add(
            AssetId::from_unit(&amount.unit)?,
            parse_quantity(&amount.quantity)?,
        );
    }
    Ok(map)
}

impl AddressUtxo {
    pub fn into_utxo(self) -> Result<Utxo, TypesError> {
        let assets = amounts_to_map(&self.amount)?;
        let mut utxo = Utxo::new(OutputRef::new(self.tx_hash, self.output_index), self.address, assets);
        utxo.datum_hash = self.data_hash;
        utxo.datum = self.inline_datum;
        Ok(utxo)
    }
}

impl TxIo {
    pub fn assets(&self) -> Result<AssetMap, TypesError> {
        amounts_to_map(&self.amount)
    }
}

// =============================================================================
// Indexer Client
// =============================================================================

/// Indexer REST client.
pub struct IndexerRpc {
    client: RpcClient,
    network: Network,
}

impl IndexerRpc {
    /// Client for `network`'s default endpoint, authenticated by `project_id`.
    pub fn new(network: Network, project_id: &str) -> Self {
        Self::with_config(network, Self::default_config(network, project_id))
    }

    /// Create with full configuration.
    pub fn with_config(network: Network, config: RpcConfig) -> Self {
        Self {
            client: RpcClient::with_config(config),
            network,
        }
    }

    /// Three attempts with a fixed five-second delay.
    pub fn default_config(network: Network, project_id: &str) -> RpcConfig {
        RpcConfig {
            url: network.indexer_url().to_string(),
            project_id: Some(project_id.to_string()),
            retries: INDEXER_ATTEMPTS - 1,
            retry_delay: INDEXER_RETRY_DELAY,
            backoff: Backoff::Fixed,
            ..Default::default()
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn url(&self) -> &str {
        self.client.url()
    }

    // =========================================================================
    // Network
    // =========================================================================

    pub async fn health(&self) -> Result<Health, RpcError> {
        let val = self.client.get("health").await?;
        Ok(serde_json::from_value(val)?)
    }

    pub async fn latest_block(&self) -> Result<BlockInfo, RpcError> {
        let val = self.client.get("blocks/latest").await?;
        Ok(serde_json::from_value(val)?)
    }

    // =========================================================================
    // Addresses
    // =========================================================================

    /// All unspent outputs at `address`.
    pub async fn utxos_at(&self, address: &str) -> Result<Vec<Utxo>, RpcError> {
        let raw: Vec<AddressUtxo> = match self
            .client
            .get_paginated(&format!("addresses/{}/utxos", address), &[])
            .await
        {
            Ok(raw) => raw,
            // Addresses that never received funds are unknown to the indexer.
            Err(RpcError::NotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        raw.into_iter()
            .map(|u| u.into_utxo().map_err(|e| RpcError::Other(e.to_string())))
            .collect()
    }

    pub async fn address_info(&self, address: &str) -> Result<AddressInfo, RpcError> {
        let val = self.client.get(&format!("addresses/{}", address)).await?;
        Ok(serde_json::from_value(val)?)
    }

    /// Transactions touching `address`, newest first.
    pub async fn address_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<AddressTransaction>, RpcError> {
        self.client
            .get_paginated(
                &format!("addresses/{}/transactions", address),
                &[("order", "desc")],
            )
            .await
    }

    /// Stake account owning `address`, or the address itself when unstaked.
    pub async fn account_of(&self, address: &str) -> Result<String, RpcError> {
        if address.starts_with(self.network.stake_prefix()) {
            return Ok(address.to_string());
        }
        let info = self.address_info(address).await?;
        Ok(info.stake_address.unwrap_or(info.address))
    }

    /// Every payment address seen under a stake account.
    pub async fn account_addresses(&self, stake_address: &str) -> Result<Vec<String>, RpcError> {
        let raw: Vec<AccountAddress> = self
            .client
            .get_paginated(&format!("accounts/{}/addresses", stake_address), &[])
            .await?;
        Ok(raw.into_iter().map(|a| a.address).collect())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    pub async fn tx_utxos(&self, tx_hash: &str) -> Result<TxUtxos, RpcError> {
        let val = self.client.get(&format!("txs/{}/utxos", tx_hash)).await?;
        Ok(serde_json::from_value(val)?)
    }

    /// Settled transaction details, or `None` if the indexer has not seen it.
    pub async fn tx(&self, tx_hash: &str) -> Result<Option<TxInfo>, RpcError> {
        match self.client.get(&format!("txs/{}", tx_hash)).await {
            Ok(val) => Ok(Some(serde_json::from_value(val)?)),
            Err(RpcError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Address of the first input of `tx_hash` (who paid).
    pub async fn payer_of(&self, tx_hash: &str) -> Result<String, RpcError> {
        let utxos = self.tx_utxos(tx_hash).await?;
        utxos
            .inputs
            .into_iter()
            .next()
            .map(|input| input.address)
            .ok_or(RpcError::NoResult {
                context: format!("payer_of({})", tx_hash),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let rpc = IndexerRpc::new(Network::Preprod, "preprodKEY");
        assert_eq!(rpc.url(), "https://cardano-preprod.blockfrost.io/api/v0");
        let cfg = IndexerRpc::default_config(Network::Mainnet, "mainnetKEY");
        assert_eq!(cfg.retries + 1, 3);
        assert_eq!(cfg.retry_delay, Duration::from_secs(5));
        assert_eq!(cfg.backoff, Backoff::Fixed);
        assert_eq!(cfg.project_id.as_deref(), Some("mainnetKEY"));
    }

    #[test]
    fn test_address_utxo_conversion() {
        let raw: AddressUtxo = serde_json::from_value(serde_json::json!({
            "address": "addr_test1qz",
            "tx_hash": "39a7a284c2a0948189dc45dec670211cd4d72f7b66c5726c08d9b3df11e44d58",
            "tx_index": 0,
            "output_index": 1,
            "amount": [
                { "unit": "lovelace", "quantity": "42000000" },
                { "unit": "b0d07d45fe9514f80213f4020e5a61241458be626841cde717cb38a74e4654", "quantity": "12" }
            ],
            "block": "7eb8e27d18686c7db9a18f8bbcfe34e3fed6e047afaa2d969904d15e934847e6",
            "data_hash": null,
            "inline_datum": null
        }))
        .unwrap();
        let utxo = raw.into_utxo().unwrap();
        assert_eq!(utxo.out_ref.index, 1);
        assert_eq!(utxo.lovelace(), cnft_types::Quantity::from(42_000_000u64));
        assert_eq!(utxo.assets.native_assets().count(), 1);
        assert!(utxo.datum_hash.is_none());
    }

    #[test]
    fn test_tx_utxos_parse_flags() {
        let raw: TxUtxos = serde_json::from_value(serde_json::json!({
            "hash": "1e043f100dce12d107f679685acd2fc0610e10f72a92d412794c9773d11d8477",
            "inputs": [
                { "address": "addr1payer", "amount": [{ "unit": "lovelace", "quantity": "10" }],
                  "tx_hash": "aa", "output_index": 0, "collateral": false, "reference": false },
                { "address": "addr1coll", "amount": [{ "unit": "lovelace", "quantity": "5" }],
                  "tx_hash": "bb", "output_index": 2, "collateral": true }
            ],
            "outputs": [
                { "address": "addr1dest", "amount": [{ "unit": "lovelace", "quantity": "9" }], "output_index": 0 }
            ]
        }))
        .unwrap();
        assert_eq!(raw.inputs[0].address, "addr1payer");
        assert!(raw.inputs[1].collateral);
        assert!(!raw.inputs[1].reference);
        assert_eq!(raw.outputs[0].assets().unwrap().lovelace(), cnft_types::Quantity::from(9u32));
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_health() {
        let key = std::env::var("CNFT_PROJECT_ID").unwrap_or_default();
        let net = Network::from_project_id(&key).unwrap_or(Network::Preprod);
        let rpc = IndexerRpc::new(net, &key);
        let health = rpc.health().await.expect("health failed");
        assert!(health.is_healthy);
    }
}
