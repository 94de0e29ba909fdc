//! CLI command implementations.

use crate::AppContext;
use cnft_rpc::marketplace::MARKETPLACE_URL;
use cnft_rpc::storage::ipfs_link;
use cnft_rpc::{IndexerRpc, MarketplaceRpc, StorageRpc};
use cnft_tx::plan::{FeePlan, PaymentPlan, SplitItem, SplitPlan};
use cnft_tx::{FeeSchedule, TxPlan};
use cnft_types::constants::LOVELACE_PER_ADA;
use cnft_types::{AssetId, Network, PolicyId, Quantity};
use cnft_wallet::watch::{self, Notifications, Watch, WatchStore};
use cnft_wallet::{history, metadata};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use std::path::{Path, PathBuf};

type Result = std::result::Result<(), Box<dyn std::error::Error>>;

// ─── Helpers ────────────────────────────────────────────────────────────────

fn indexer(ctx: &AppContext) -> std::result::Result<IndexerRpc, Box<dyn std::error::Error>> {
    let project_id = ctx
        .project_id
        .as_deref()
        .ok_or("no indexer project id (use --project-id or CNFT_PROJECT_ID)")?;
    match Network::from_project_id(project_id) {
        Some(n) if n != ctx.network => {
            return Err(format!("project id is for {}, but --network is {}", n, ctx.network).into());
        }
        None => log::warn!("cannot tell the network of this project id, assuming {}", ctx.network),
        _ => {}
    }
    let mut config = IndexerRpc::default_config(ctx.network, project_id);
    if let Some(url) = &ctx.indexer_url {
        config.url = url.clone();
    }
    Ok(IndexerRpc::with_config(ctx.network, config))
}

fn format_ada(lovelace: &Quantity) -> String {
    let per = Quantity::from(LOVELACE_PER_ADA);
    format!("{}.{:06}", lovelace / &per, lovelace % &per)
}

fn format_ada_signed(lovelace: &BigInt) -> String {
    let sign = if lovelace.is_negative() { "-" } else { "+" };
    format!("{}{}", sign, format_ada(lovelace.magnitude()))
}

fn parse_ada(s: &str) -> std::result::Result<Quantity, Box<dyn std::error::Error>> {
    let s = s.trim();
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if frac.len() > 6 {
        return Err("too many decimal places (max 6)".into());
    }
    if whole.is_empty() && frac.is_empty() {
        return Err(format!("invalid ADA amount: {:?}", s).into());
    }
    let whole: Quantity = if whole.is_empty() { Quantity::zero() } else { whole.parse()? };
    let frac: Quantity = format!("{:0<6}", frac).parse()?;
    Ok(whole * Quantity::from(LOVELACE_PER_ADA) + frac)
}

fn print_plan(plan: &TxPlan) -> Result {
    // lowering validates the plan the same way submission would
    plan.lower()?;
    println!("{}", serde_json::to_string_pretty(plan)?);
    Ok(())
}

fn open_store(ctx: &AppContext) -> std::result::Result<WatchStore, Box<dyn std::error::Error>> {
    Ok(WatchStore::open(&ctx.data_dir)?)
}

// ─── Chain ──────────────────────────────────────────────────────────────────

pub async fn show_status(ctx: &AppContext) -> Result {
    let indexer = indexer(ctx)?;
    println!("Connecting to {} ...", indexer.url());

    let health = indexer.health().await?;
    let tip = indexer.latest_block().await?;

    println!("Indexer status:");
    println!("  Network:  {}", indexer.network());
    println!("  Healthy:  {}", if health.is_healthy { "yes" } else { "no" });
    println!("  Tip:      {}", tip.hash);
    if let Some(height) = tip.height {
        println!("  Height:   {}", height);
    }
    if let Some(slot) = tip.slot {
        println!("  Slot:     {}", slot);
    }
    Ok(())
}

pub async fn show_utxos(ctx: &AppContext, address: &str) -> Result {
    let utxos = indexer(ctx)?.utxos_at(address).await?;
    if utxos.is_empty() {
        println!("No unspent outputs at {}", address);
        return Ok(());
    }

    let mut total = Quantity::zero();
    for u in &utxos {
        total += u.assets.lovelace();
        println!("{}  {:>16} ADA", u.out_ref, format_ada(&u.assets.lovelace()));
        for (asset, qty) in u.assets.native_assets() {
            println!("    {} x{}", asset, qty);
        }
    }
    println!("{}", "-".repeat(80));
    println!("{} output(s), {} ADA", utxos.len(), format_ada(&total));
    Ok(())
}

pub async fn show_history(ctx: &AppContext, address: &str, limit: usize) -> Result {
    let indexer = indexer(ctx)?;
    let txs = history::history_of(&indexer, address).await?;
    if txs.is_empty() {
        println!("No transactions found for {}", address);
        return Ok(());
    }

    println!("Showing {}/{} transactions:", txs.len().min(limit), txs.len());
    for tx in txs.iter().take(limit) {
        println!();
        println!("{}", tx.hash);
        for (account, amounts) in &tx.net {
            for (asset, delta) in amounts {
                match asset {
                    AssetId::Lovelace => println!("  {:<64} {} ADA", account, format_ada_signed(delta)),
                    _ => println!("  {:<64} {:+} {}", account, delta, asset),
                }
            }
        }
    }
    Ok(())
}

// ─── Plans ──────────────────────────────────────────────────────────────────

pub fn plan_fee(address: &str, items: usize, per_item: Option<&str>, minimum: Option<&str>) -> Result {
    let mut schedule = FeeSchedule::new(address);
    if let Some(p) = per_item {
        schedule.per_item = parse_ada(p)?.to_u64().ok_or("per-item fee too large")?;
    }
    if let Some(m) = minimum {
        schedule.minimum = parse_ada(m)?.to_u64().ok_or("minimum fee too large")?;
    }
    print_plan(&FeePlan::new(&schedule, items)?.into())
}

pub fn plan_split(address: &str, assets: &[String], lovelace_outputs: usize) -> Result {
    let mut items = Vec::with_capacity(assets.len() + lovelace_outputs);
    for unit in assets {
        items.push(SplitItem::asset(AssetId::from_unit(unit)?, 1u32));
    }
    items.extend(std::iter::repeat_with(SplitItem::lovelace_only).take(lovelace_outputs));
    print_plan(&SplitPlan::new(address, items)?.into())
}

pub fn plan_payout(csv: &Path, message: Option<String>) -> Result {
    let text = std::fs::read_to_string(csv)?;
    let mut plan = PaymentPlan::new(PaymentPlan::parse_csv(&text)?)?;
    if let Some(m) = message {
        plan = plan.with_message(m);
    }
    let total = plan
        .payments
        .iter()
        .fold(Quantity::zero(), |acc, p| acc + &p.lovelace);
    log::info!("{} payment(s), {} ADA total", plan.payments.len(), format_ada(&total));
    print_plan(&plan.into())
}

// ─── Watches ────────────────────────────────────────────────────────────────

pub fn watch_add(
    ctx: &AppContext,
    policy: &str,
    price: &str,
    trait_filter: Option<(&str, &str)>,
    text: bool,
    desktop: bool,
) -> Result {
    let policy: PolicyId = policy.parse()?;
    let watch = Watch::new(policy, parse_ada(price)?, trait_filter, Notifications { text, desktop })?;
    let mut store = open_store(ctx)?;
    let id = store.add(watch)?;
    println!("Added watch {} ({})", id, store.path().display());
    Ok(())
}

pub fn watch_list(ctx: &AppContext) -> Result {
    let store = open_store(ctx)?;
    if store.list().is_empty() {
        println!("No watches. Use 'watch add' to create one.");
        return Ok(());
    }
    println!("{:<14} {:<56} {:>14}  Traits", "ID", "Policy", "Max ADA");
    println!("{}", "-".repeat(100));
    for w in store.list() {
        let traits: Vec<_> = w
            .traits
            .iter()
            .map(|(name, values)| format!("{}={}", name, values.join("|")))
            .collect();
        println!("{:<14} {:<56} {:>14}  {}", w.id, w.policy_id, format_ada(&w.price), traits.join(", "));
    }
    Ok(())
}

pub fn watch_remove(ctx: &AppContext, id: u64) -> Result {
    let mut store = open_store(ctx)?;
    if !store.remove(id)? {
        return Err(format!("no watch with id {}", id).into());
    }
    println!("Removed watch {}", id);
    Ok(())
}

pub async fn watch_scan(ctx: &AppContext) -> Result {
    let mut store = open_store(ctx)?;
    if store.list().is_empty() {
        println!("No watches to scan.");
        return Ok(());
    }
    let market = MarketplaceRpc::new(MARKETPLACE_URL);
    let alerts = watch::scan(&mut store, &market).await?;
    if alerts.is_empty() {
        println!("No new listings.");
    }
    for alert in &alerts {
        println!("{}", alert.message());
        println!("  {}", alert.url());
    }
    Ok(())
}

// ─── Metadata ───────────────────────────────────────────────────────────────

pub fn check_metadata(paths: &[PathBuf]) -> Result {
    let descriptors = match paths {
        [dir] if dir.is_dir() => metadata::load_dir(dir)?,
        _ => metadata::load_files(paths)?,
    };
    println!("{} metadata file(s) OK", descriptors.len());
    for d in &descriptors {
        println!("  {}", d.name);
    }
    Ok(())
}

pub async fn pin(file: &Path, api_key: &str) -> Result {
    let blob = std::fs::read(file)?;
    let cid = StorageRpc::new(api_key).store_blob(&blob).await?;
    println!("{}", ipfs_link(&cid));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ada() {
        assert_eq!(parse_ada("29.5").unwrap(), Quantity::from(29_500_000u64));
        assert_eq!(parse_ada("5").unwrap(), Quantity::from(5_000_000u64));
        assert_eq!(parse_ada(".000001").unwrap(), Quantity::from(1u64));
        assert!(parse_ada("1.0000001").is_err());
        assert!(parse_ada("").is_err());
        assert!(parse_ada("abc").is_err());
    }

    #[test]
    fn test_format_ada() {
        assert_eq!(format_ada(&Quantity::from(1_500_000u64)), "1.500000");
        assert_eq!(format_ada_signed(&BigInt::from(-48_200_000)), "-48.200000");
        assert_eq!(format_ada_signed(&BigInt::from(2)), "+0.000002");
    }
}
