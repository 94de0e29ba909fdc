//! Transaction history with per-account net amounts.

use crate::backend::Indexer;
use crate::error::WalletError;
use cnft_rpc::indexer::{TxIo, TxUtxos};
use cnft_types::AssetId;
use num_bigint::BigInt;
use num_traits::Zero;
use std::collections::{BTreeMap, BTreeSet};

/// Signed change per asset, keyed by stake account (or bare address).
pub type NetAmounts = BTreeMap<String, BTreeMap<AssetId, BigInt>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSummary {
    pub hash: String,
    pub net: NetAmounts,
}

/// Net movement of every account touched by `utxos`.
///
/// Reference and collateral inputs are ignored, as are collateral outputs.
/// Zero balances are dropped.
pub async fn net_amounts(indexer: &dyn Indexer, utxos: &TxUtxos) -> Result<NetAmounts, WalletError> {
    let mut accounts: BTreeMap<String, String> = BTreeMap::new();
    let mut net = NetAmounts::new();

    let spent = utxos.inputs.iter().filter(|i| !i.reference && !i.collateral);
    let created = utxos.outputs.iter().filter(|o| !o.collateral);
    for (io, sign) in spent.map(|i| (i, -1)).chain(created.map(|o| (o, 1))) {
        let account = account_for(indexer, &mut accounts, io).await?;
        let entry = net.entry(account).or_default();
        for (asset, qty) in io.assets()?.iter() {
            *entry.entry(asset.clone()).or_default() += BigInt::from(qty.clone()) * sign;
        }
    }

    for per_asset in net.values_mut() {
        per_asset.retain(|_, v| !v.is_zero());
    }
    net.retain(|_, per_asset| !per_asset.is_empty());
    Ok(net)
}

async fn account_for(
    indexer: &dyn Indexer,
    cache: &mut BTreeMap<String, String>,
    io: &TxIo,
) -> Result<String, WalletError> {
    if let Some(a) = cache.get(&io.address) {
        return Ok(a.clone());
    }
    let account = indexer.account_of(&io.address).await?;
    cache.insert(io.address.clone(), account.clone());
    Ok(account)
}

/// Every transaction touching the account that owns `address`, newest
/// first per address, each with its net amounts.
pub async fn history_of(indexer: &dyn Indexer, address: &str) -> Result<Vec<TxSummary>, WalletError> {
    let account = indexer.account_of(address).await?;
    let addresses = if account == address {
        vec![address.to_string()]
    } else {
        indexer.account_addresses(&account).await?
    };

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for addr in &addresses {
        for hash in indexer.transactions_of(addr).await? {
            if !seen.insert(hash.clone()) {
                continue;
            }
            let utxos = indexer.tx_utxos(&hash).await?;
            let net = net_amounts(indexer, &utxos).await?;
            out.push(TxSummary { hash, net });
        }
    }
    log::info!("{} transaction(s) for {}", out.len(), account);
    Ok(out)
}
