//! Live integration tests for the indexer and marketplace clients.
//!
//! Run with: cargo test -p cnft-rpc --test indexer_live -- --ignored
//!
//! Requires CNFT_PROJECT_ID (a preprod or mainnet indexer key). The address
//! under test comes from CNFT_TEST_ADDRESS.

use cnft_rpc::{IndexerRpc, MarketplaceRpc};
use cnft_types::Network;

fn indexer() -> IndexerRpc {
    let key = std::env::var("CNFT_PROJECT_ID").expect("CNFT_PROJECT_ID not set");
    let network = Network::from_project_id(&key).expect("unrecognised project id prefix");
    IndexerRpc::new(network, &key)
}

// ─── 1. Connectivity ────────────────────────────────────────────────────────

#[tokio::test]
#[ignore]
async fn test_health_and_tip() {
    let idx = indexer();
    assert!(idx.health().await.expect("health failed").is_healthy);
    let tip = idx.latest_block().await.expect("latest_block failed");
    assert!(tip.time > 1_596_059_091, "tip should be after Shelley");
    println!("Tip: {} at {}", tip.hash, tip.time);
}

// ─── 2. Address Queries ─────────────────────────────────────────────────────

#[tokio::test]
#[ignore]
async fn test_utxos_and_payer() {
    let idx = indexer();
    let addr = std::env::var("CNFT_TEST_ADDRESS").expect("CNFT_TEST_ADDRESS not set");
    let utxos = idx.utxos_at(&addr).await.expect("utxos_at failed");
    println!("{} outputs at {}", utxos.len(), addr);

    if let Some(first) = utxos.first() {
        let status = idx.tx(&first.out_ref.tx_hash).await.expect("tx failed");
        assert!(status.is_some(), "an unspent output's tx must be settled");
        let payer = idx
            .payer_of(&first.out_ref.tx_hash)
            .await
            .expect("payer_of failed");
        assert!(payer.starts_with("addr"));
    }
}

#[tokio::test]
#[ignore]
async fn test_unknown_tx_is_none() {
    let idx = indexer();
    let status = idx.tx(&"0".repeat(64)).await.expect("tx failed");
    assert!(status.is_none());
}

// ─── 3. Marketplace ─────────────────────────────────────────────────────────

#[tokio::test]
#[ignore]
async fn test_marketplace_search() {
    let market = MarketplaceRpc::default();
    let listings = market
        .search_listings(
            "33568ad11f93b3e79ae8dee5ad928ded72adcea719e92108caf1521b",
            &serde_json::json!({}),
            5,
        )
        .await
        .expect("search failed");
    for l in &listings {
        println!("{} {} {}", l.asset_id, l.listed_at, l.listing_lovelace);
    }
}
