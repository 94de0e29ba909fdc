//! Persisted listing watches.
//!
//! A watch alerts when a token under a policy (optionally narrowed by
//! traits) is listed at or below a price. Watches live in one JSON file,
//! an array of records, named after the store key.

use crate::backend::Marketplace;
use crate::error::WalletError;
use chrono::{DateTime, Utc};
use cnft_rpc::marketplace::TokenListing;
use cnft_types::asset::quantity_str;
use cnft_types::constants::LOVELACE_PER_ADA;
use cnft_types::{parse_quantity, PolicyId, Quantity};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const STORE_KEY: &str = "cnft_sniper_bot_v1";

/// Listings fetched per watch per scan.
pub const SEARCH_SIZE: u32 = 20;

const ASSET_URL: &str = "https://www.jpg.store/asset";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notifications {
    pub text: bool,
    pub desktop: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watch {
    /// Creation time in milliseconds, unique per store.
    pub id: u64,
    /// Newest listing already alerted on.
    #[serde(default)]
    pub most_recent_listing: Option<DateTime<Utc>>,
    pub policy_id: PolicyId,
    /// Alert at or below this many lovelace.
    #[serde(with = "quantity_str")]
    pub price: Quantity,
    #[serde(default)]
    pub traits: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub notifications: Notifications,
}

impl Watch {
    /// Trait names and values are matched lowercase.
    pub fn new(
        policy_id: PolicyId,
        price: Quantity,
        trait_filter: Option<(&str, &str)>,
        notifications: Notifications,
    ) -> Result<Self, WalletError> {
        if price.is_zero() {
            return Err(WalletError::Validation("enter a price threshold for alerts".into()));
        }
        let mut traits = BTreeMap::new();
        if let Some((name, value)) = trait_filter {
            if name.trim().is_empty() || value.trim().is_empty() {
                return Err(WalletError::Validation("a trait filter needs both a name and a value".into()));
            }
            traits.insert(name.to_lowercase(), vec![value.to_lowercase()]);
        }
        Ok(Self {
            id: Utc::now().timestamp_millis().max(0) as u64,
            most_recent_listing: None,
            policy_id,
            price,
            traits,
            notifications,
        })
    }
}

/// A listing that matched a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub watch_id: u64,
    pub asset_id: String,
    pub display_name: String,
    pub collection: String,
    pub lovelace: Quantity,
    pub listed_at: DateTime<Utc>,
}

impl Alert {
    pub fn url(&self) -> String {
        format!("{}/{}", ASSET_URL, self.asset_id)
    }

    pub fn message(&self) -> String {
        let whole = &self.lovelace / Quantity::from(LOVELACE_PER_ADA);
        let frac = &self.lovelace % Quantity::from(LOVELACE_PER_ADA);
        let ada = if frac.is_zero() {
            whole.to_string()
        } else {
            let frac = format!("{:06}", frac);
            format!("{}.{}", whole, frac.trim_end_matches('0'))
        };
        format!("{} listed for {} ADA ({})", self.display_name, ada, self.collection)
    }
}

// =============================================================================
// Store
// =============================================================================

pub struct WatchStore {
    path: PathBuf,
    watches: Vec<Watch>,
}

impl WatchStore {
    /// Open the store under `dir`; a missing file is an empty store.
    pub fn open(dir: &Path) -> Result<Self, WalletError> {
        let path = dir.join(format!("{}.json", STORE_KEY));
        let watches = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Vec::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, watches })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> &[Watch] {
        &self.watches
    }

    pub fn add(&mut self, mut watch: Watch) -> Result<u64, WalletError> {
        while self.watches.iter().any(|w| w.id == watch.id) {
            watch.id += 1;
        }
        let id = watch.id;
        self.watches.push(watch);
        self.save()?;
        Ok(id)
    }

    /// Remove watch `id`; `false` if there was none.
    pub fn remove(&mut self, id: u64) -> Result<bool, WalletError> {
        let before = self.watches.len();
        self.watches.retain(|w| w.id != id);
        if self.watches.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    pub fn save(&self) -> Result<(), WalletError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.watches)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

// =============================================================================
// Scan
// =============================================================================

/// Check every watch once against the newest listings.
///
/// Listings arrive newest first; the scan of a watch stops at the first one
/// not newer than what it already alerted on. A failing search is logged and
/// skipped.
pub async fn scan(store: &mut WatchStore, market: &dyn Marketplace) -> Result<Vec<Alert>, WalletError> {
    let mut alerts = Vec::new();
    let mut changed = false;
    for watch in store.watches.iter_mut() {
        let traits = serde_json::to_value(&watch.traits)?;
        let listings = match market
            .search_listings(&watch.policy_id.to_hex(), &traits, SEARCH_SIZE)
            .await
        {
            Ok(l) => l,
            Err(e) => {
                log::warn!("watch {}: search failed: {}", watch.id, e);
                continue;
            }
        };

        let mut newest = watch.most_recent_listing;
        for listing in &listings {
            let Some((listed_at, lovelace)) = parse_listing(listing) else {
                log::warn!("watch {}: skipping unreadable listing {}", watch.id, listing.asset_id);
                continue;
            };
            if watch.most_recent_listing.is_some_and(|seen| listed_at <= seen) {
                break;
            }
            if lovelace > watch.price {
                continue;
            }
            alerts.push(Alert {
                watch_id: watch.id,
                asset_id: listing.asset_id.clone(),
                display_name: listing.display_name.clone(),
                collection: listing
                    .collections
                    .as_ref()
                    .map(|c| c.display_name.clone())
                    .unwrap_or_default(),
                lovelace,
                listed_at,
            });
            newest = Some(newest.map_or(listed_at, |n| n.max(listed_at)));
        }
        if newest != watch.most_recent_listing {
            watch.most_recent_listing = newest;
            changed = true;
        }
    }
    if changed {
        store.save()?;
    }
    log::info!("watch scan: {} alert(s)", alerts.len());
    Ok(alerts)
}

fn parse_listing(listing: &TokenListing) -> Option<(DateTime<Utc>, Quantity)> {
    let at = DateTime::parse_from_rfc3339(&listing.listed_at).ok()?.with_timezone(&Utc);
    let lovelace = parse_quantity(&listing.listing_lovelace).ok()?;
    Some((at, lovelace))
}
