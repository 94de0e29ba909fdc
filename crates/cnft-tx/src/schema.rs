//! Marketplace datum schemas.
//!
//! A listing held by a marketplace script carries a schema tag naming how its
//! datum is laid out. Each known layout is a [`SchemaHandler`] registered in a
//! [`SchemaRegistry`]; an unregistered tag is a hard error, never a default.

use crate::plutus::PlutusData;
use crate::TxError;
use cnft_types::asset::quantity_str;
use cnft_types::{AssetId, Quantity, Utxo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const JPGSTORE_SCHEMA: &str = "jpgstore_schema";
pub const EPOCHART_SCHEMA: &str = "epochart_schema";

// =============================================================================
// Listings
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayeeRole {
    Seller,
    MarketFee,
    Royalty,
}

/// One party paid when a listing is purchased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payee {
    pub role: PayeeRole,
    pub address: String,
    /// Payment key hash (hex), where the schema embeds it in the datum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_key_hash: Option<String>,
    /// Lovelace owed.
    #[serde(with = "quantity_str")]
    pub amount: Quantity,
    /// Datum (hex CBOR) the payment output must carry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<String>,
}

/// A marketplace-held output offered for sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub utxo: Utxo,
    /// Schema tag naming the datum layout.
    pub schema: String,
    pub asset: AssetId,
    /// Payees as published by the marketplace, seller first.
    pub payees: Vec<Payee>,
}

impl Listing {
    /// Sum of everything the buyer pays.
    pub fn price(&self) -> Quantity {
        self.payees.iter().map(|p| &p.amount).sum()
    }
}

// =============================================================================
// Handlers
// =============================================================================

pub trait SchemaHandler: Send + Sync {
    /// Schema tag this handler is registered under.
    fn tag(&self) -> &'static str;

    /// Who gets paid what when `listing` is consumed.
    fn payees(&self, listing: &Listing) -> Result<Vec<Payee>, TxError>;

    /// Datum (CBOR) to supply alongside the spent output.
    fn datum(&self, listing: &Listing) -> Result<Vec<u8>, TxError>;

    /// Redeemer for a purchase spend.
    fn redeemer(&self, listing: &Listing) -> PlutusData;
}

/// Handler for outputs whose datum travels with the listing itself.
pub struct JpgStoreSchema;

impl SchemaHandler for JpgStoreSchema {
    fn tag(&self) -> &'static str {
        JPGSTORE_SCHEMA
    }

    fn payees(&self, listing: &Listing) -> Result<Vec<Payee>, TxError> {
        if !listing.payees.iter().any(|p| p.role == PayeeRole::Seller) {
            return Err(TxError::Validation(format!(
                "listing {} has no seller payee",
                listing.utxo.out_ref
            )));
        }
        Ok(listing.payees.clone())
    }

    fn datum(&self, listing: &Listing) -> Result<Vec<u8>, TxError> {
        let datum = listing.utxo.datum.as_deref().ok_or_else(|| {
            TxError::Validation(format!("listing {} carries no datum", listing.utxo.out_ref))
        })?;
        hex::decode(datum).map_err(|e| TxError::Validation(format!("datum hex: {}", e)))
    }

    fn redeemer(&self, _listing: &Listing) -> PlutusData {
        PlutusData::unit(1)
    }
}

/// Handler for listings whose datum is reconstructed from the payees:
/// `Constr 0 [seller pkh, price, policy, name, royalty pkh?, royalty datum?]`.
pub struct EpochArtSchema;

impl EpochArtSchema {
    fn split<'a>(listing: &'a Listing) -> Result<(&'a Payee, &'a Payee, Option<&'a Payee>), TxError> {
        match listing.payees.as_slice() {
            [seller, fee] => Ok((seller, fee, None)),
            [seller, fee, royalty] => Ok((seller, fee, Some(royalty))),
            other => Err(TxError::Validation(format!(
                "expected 2 or 3 payees, found {}",
                other.len()
            ))),
        }
    }
}

fn key_hash(payee: &Payee) -> Result<PlutusData, TxError> {
    payee
        .pub_key_hash
        .as_deref()
        .and_then(PlutusData::bytes_hex)
        .ok_or_else(|| TxError::Validation(format!("payee {} has no key hash", payee.address)))
}

impl SchemaHandler for EpochArtSchema {
    fn tag(&self) -> &'static str {
        EPOCHART_SCHEMA
    }

    fn payees(&self, listing: &Listing) -> Result<Vec<Payee>, TxError> {
        let (seller, fee, royalty) = Self::split(listing)?;
        let mut out = vec![
            Payee { role: PayeeRole::Seller, ..seller.clone() },
            Payee { role: PayeeRole::MarketFee, ..fee.clone() },
        ];
        if let Some(r) = royalty {
            out.push(Payee { role: PayeeRole::Royalty, ..r.clone() });
        }
        Ok(out)
    }

    fn datum(&self, listing: &Listing) -> Result<Vec<u8>, TxError> {
        let (seller, _, royalty) = Self::split(listing)?;
        let policy = listing
            .asset
            .policy()
            .ok_or_else(|| TxError::Validation("listing asset is lovelace".into()))?;

        let mut fields = vec![
            key_hash(seller)?,
            PlutusData::Integer(listing.price().into()),
            PlutusData::bytes(policy.as_bytes().to_vec()),
            PlutusData::bytes(listing.asset.name().to_vec()),
        ];
        if let Some(r) = royalty {
            fields.push(key_hash(r)?);
            let datum = match r.datum.as_deref() {
                Some(h) => hex::decode(h)
                    .map_err(|e| TxError::Validation(format!("royalty datum hex: {}", e)))?,
                None => Vec::new(),
            };
            fields.push(PlutusData::Bytes(datum));
        }
        Ok(PlutusData::constr(0, fields).to_cbor())
    }

    fn redeemer(&self, _listing: &Listing) -> PlutusData {
        PlutusData::unit(0)
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Default)]
pub struct SchemaRegistry {
    handlers: BTreeMap<&'static str, Box<dyn SchemaHandler>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in marketplace schemas.
    pub fn with_defaults() -> Self {
        let mut r = Self::new();
        r.register(Box::new(JpgStoreSchema));
        r.register(Box::new(EpochArtSchema));
        r
    }

    /// Register a handler; a later registration for the same tag replaces it.
    pub fn register(&mut self, handler: Box<dyn SchemaHandler>) {
        self.handlers.insert(handler.tag(), handler);
    }

    pub fn resolve(&self, tag: &str) -> Result<&dyn SchemaHandler, TxError> {
        self.handlers
            .get(tag)
            .map(|h| h.as_ref())
            .ok_or_else(|| TxError::UnsupportedSchema(tag.to_string()))
    }

    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }
}
