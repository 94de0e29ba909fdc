//! Marketplace client.
//!
//! The marketplace builds list/delist transactions server-side: the caller
//! sends wallet-encoded inputs plus collateral and receives transaction CBOR
//! to sign and submit. Also exposes the public listing search used by
//! watches.

use crate::client::{RpcClient, RpcConfig};
use crate::error::RpcError;
use cnft_types::{AssetId, Quantity, Utxo};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default marketplace API base.
pub const MARKETPLACE_URL: &str = "https://server.jpgstoreapis.com";

/// Listings stay open for one day.
pub const LISTING_DURATION_SECS: u64 = 86_400;

const TRACING_NONCE_LEN: usize = 16;

// =============================================================================
// Request / Response Types
// =============================================================================

/// Action for `transaction/build`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuildAction {
    Sell,
    Delist,
}

/// Request body for `transaction/build`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub collateral: Vec<String>,
    pub utxos: Vec<String>,
    pub address: String,
    pub action: BuildAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_lovelace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<u64>,
    pub tracing_id: String,
}

/// Transaction built by the marketplace.
#[derive(Debug, Clone, Deserialize)]
pub struct BuiltTransaction {
    pub cbor: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSummary {
    #[serde(default)]
    pub display_name: String,
}

/// One listed token from `search/tokens`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenListing {
    pub asset_id: String,
    #[serde(default)]
    pub display_name: String,
    /// RFC 3339 timestamp.
    pub listed_at: String,
    /// Decimal lovelace.
    pub listing_lovelace: String,
    #[serde(default)]
    pub collections: Option<CollectionSummary>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    tokens: Vec<TokenListing>,
}

/// Correlation id sent with each build request:
/// `{stake}-{rfc3339}-{16 hex nonce}`.
pub fn tracing_id(stake_address: &str) -> String {
    let mut rng = rand::thread_rng();
    let nonce: String = (0..TRACING_NONCE_LEN)
        .map(|_| format!("{:x}", rng.gen_range(0..16u8)))
        .collect();
    format!(
        "{}-{}-{}",
        stake_address,
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        nonce
    )
}

fn wallet_cbor(utxo: &Utxo) -> Result<String, RpcError> {
    utxo.cbor.clone().ok_or_else(|| {
        RpcError::Other(format!(
            "output {} has no wallet encoding to send to the marketplace",
            utxo.out_ref
        ))
    })
}

// =============================================================================
// Marketplace Client
// =============================================================================

pub struct MarketplaceRpc {
    client: RpcClient,
}

impl MarketplaceRpc {
    pub fn new(url: &str) -> Self {
        Self {
            client: RpcClient::new(url),
        }
    }

    pub fn with_config(config: RpcConfig) -> Self {
        Self {
            client: RpcClient::with_config(config),
        }
    }

    pub fn url(&self) -> &str {
        self.client.url()
    }

    async fn build(&self, request: &BuildRequest) -> Result<BuiltTransaction, RpcError> {
        log::info!(
            "requesting {:?} build for {}",
            request.action,
            request.asset_id.as_deref().unwrap_or("listing")
        );
        let body = serde_json::to_value(request)?;
        let val = self.client.post("transaction/build", &body).await?;
        Ok(serde_json::from_value(val)?)
    }

    /// Build a transaction listing `asset` at `price` lovelace.
    pub async fn build_listing(
        &self,
        asset: &AssetId,
        price: &Quantity,
        collateral: &Utxo,
        input: &Utxo,
        address: &str,
        stake_address: &str,
    ) -> Result<BuiltTransaction, RpcError> {
        self.build(&BuildRequest {
            collateral: vec![wallet_cbor(collateral)?],
            utxos: vec![wallet_cbor(input)?],
            address: address.to_string(),
            action: BuildAction::Sell,
            asset_id: Some(asset.unit()),
            price_lovelace: Some(price.to_string()),
            duration: Some(LISTING_DURATION_SECS),
            listing_id: None,
            tracing_id: tracing_id(stake_address),
        })
        .await
    }

    /// Build a transaction cancelling listing `listing_id`.
    pub async fn build_delisting(
        &self,
        listing_id: u64,
        collateral: &Utxo,
        input: &Utxo,
        address: &str,
        stake_address: &str,
    ) -> Result<BuiltTransaction, RpcError> {
        self.build(&BuildRequest {
            collateral: vec![wallet_cbor(collateral)?],
            utxos: vec![wallet_cbor(input)?],
            address: address.to_string(),
            action: BuildAction::Delist,
            asset_id: None,
            price_lovelace: None,
            duration: None,
            listing_id: Some(listing_id),
            tracing_id: tracing_id(stake_address),
        })
        .await
    }

    /// Ask the marketplace to refresh its view of `asset`. Best effort.
    pub async fn heal(&self, asset: &AssetId) -> Result<(), RpcError> {
        self.client
            .patch(&format!("token/{}/heal", asset.unit()))
            .await
            .map(|_| ())
    }

    /// Most recently listed buy-now tokens under `policy_id`.
    ///
    /// `traits` is a JSON object of trait name to accepted values.
    pub async fn search_listings(
        &self,
        policy_id: &str,
        traits: &Value,
        size: u32,
    ) -> Result<Vec<TokenListing>, RpcError> {
        let mut url = reqwest::Url::parse(&format!("{}/search/tokens", self.client.url()))
            .map_err(|e| RpcError::Other(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("policyIds", &format!("[\"{}\"]", policy_id))
            .append_pair("saleType", "buy-now")
            .append_pair("sortBy", "recently-listed")
            .append_pair("traits", &traits.to_string())
            .append_pair("nameQuery", "")
            .append_pair("verified", "default")
            .append_pair("pagination", "{}")
            .append_pair("size", &size.to_string());
        let endpoint = format!("search/tokens?{}", url.query().unwrap_or_default());
        let val = self.client.get(&endpoint).await?;
        let resp: SearchResponse = serde_json::from_value(val)?;
        Ok(resp.tokens)
    }
}

impl Default for MarketplaceRpc {
    fn default() -> Self {
        Self::new(MARKETPLACE_URL)
    }
}
