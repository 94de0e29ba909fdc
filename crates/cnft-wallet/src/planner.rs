//! Default item planner for list, delist and pay batches.

use crate::backend::Marketplace;
use crate::batch::{BatchItem, ItemAction, ItemPlanner};
use crate::error::WalletError;
use async_trait::async_trait;
use cnft_tx::{ListingAction, ListingPlan, PaymentPlan, TxPlan};
use cnft_types::{LedgerSnapshot, Utxo};
use std::sync::Arc;
use std::time::Duration;

/// Delay before asking the marketplace to re-index a freshly listed asset.
pub const HEAL_DELAY: Duration = Duration::from_secs(60);

pub struct ActionPlanner {
    marketplace: Option<Arc<dyn Marketplace>>,
    heal_delay: Duration,
}

impl ActionPlanner {
    pub fn new(marketplace: Option<Arc<dyn Marketplace>>) -> Self {
        Self {
            marketplace,
            heal_delay: HEAL_DELAY,
        }
    }

    pub fn with_heal_delay(mut self, delay: Duration) -> Self {
        self.heal_delay = delay;
        self
    }

    fn marketplace(&self) -> Result<&Arc<dyn Marketplace>, WalletError> {
        self.marketplace
            .as_ref()
            .ok_or_else(|| WalletError::Config("no marketplace configured".into()))
    }

    async fn plan_listing(
        &self,
        action: &ListingAction,
        inputs: &[Utxo],
        snapshot: &LedgerSnapshot,
    ) -> Result<TxPlan, WalletError> {
        action.validate()?;
        let market = self.marketplace()?;
        let input = inputs
            .first()
            .ok_or_else(|| WalletError::Validation("listing needs a claimed input".into()))?;
        let collateral = snapshot
            .collateral
            .first()
            .ok_or_else(|| WalletError::Validation("Wallet does not have any collateral set".into()))?;
        let address = snapshot.change_address.as_str();
        let stake = snapshot.reward_address.as_deref().unwrap_or(address);

        let descriptor = match action {
            ListingAction::List { asset, price } => {
                market
                    .build_listing(asset, price, collateral, input, address, stake)
                    .await?
            }
            ListingAction::Delist { listing_id } => {
                let id = listing_id
                    .parse::<u64>()
                    .map_err(|_| WalletError::Validation(format!("bad listing id {:?}", listing_id)))?;
                market.build_delisting(id, collateral, input, address, stake).await?
            }
        };
        let plan = ListingPlan::new(
            action.clone(),
            input.out_ref.clone(),
            collateral.out_ref.clone(),
            descriptor,
        )?;
        Ok(plan.into())
    }
}

#[async_trait]
impl ItemPlanner for ActionPlanner {
    async fn plan(&self, item: &BatchItem, inputs: &[Utxo], snapshot: &LedgerSnapshot) -> Result<TxPlan, WalletError> {
        match &item.action {
            ItemAction::Listing(action) => self.plan_listing(action, inputs, snapshot).await,
            ItemAction::Pay { payments, message } => {
                let mut plan = PaymentPlan::new(payments.clone())?.with_inputs(inputs.to_vec());
                if let Some(msg) = message {
                    plan = plan.with_message(msg.clone());
                }
                Ok(plan.into())
            }
            ItemAction::Plan(plan) => Ok(plan.clone()),
        }
    }

    /// Heal listed assets in the background; failures only warn.
    async fn after_submit(&self, item: &BatchItem, _hash: &str) {
        let ItemAction::Listing(ListingAction::List { asset, .. }) = &item.action else {
            return;
        };
        let Some(market) = self.marketplace.clone() else {
            return;
        };
        let asset = asset.clone();
        let delay = self.heal_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = market.heal(&asset).await {
                log::warn!("heal {} failed: {}", asset.unit(), e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchOrchestrator, BatchSpec, FailurePolicy, ItemOutcome};
    use crate::error::ErrorKind;
    use crate::testing::{self, asset, utxo, FakeIndexer, FakeMarketplace, FakeTx, FakeWallet, SELF_ADDR};
    use cnft_tx::{Payment, TxDraft};
    use cnft_types::{AssetMap, Quantity};

    fn snapshot(collateral: bool) -> LedgerSnapshot {
        LedgerSnapshot {
            utxos: Vec::new(),
            change_address: SELF_ADDR.into(),
            reward_address: None,
            collateral: if collateral {
                vec![utxo(900, 0, SELF_ADDR, AssetMap::from_lovelace(5_000_000u64))]
            } else {
                Vec::new()
            },
        }
    }

    #[tokio::test]
    async fn test_listing_requires_collateral() {
        let market = Arc::new(FakeMarketplace::default());
        let planner = ActionPlanner::new(Some(market.clone()));
        let item = BatchItem::list("A", asset(1, "A"), 10_000_000u64);
        let input = utxo(1, 0, SELF_ADDR, AssetMap::from_lovelace(5_000_000u64).with(asset(1, "A"), 1u64));

        let err = planner.plan(&item, &[input.clone()], &snapshot(false)).await.unwrap_err();
        assert_eq!(err.to_string(), "validation error: Wallet does not have any collateral set");
        assert!(market.built.lock().unwrap().is_empty());

        let plan = planner.plan(&item, &[input], &snapshot(true)).await.unwrap();
        assert_eq!(plan.kind(), "list");
        assert!(matches!(plan.lower().unwrap(), TxDraft::Prebuilt(d) if d.cbor == "84a500"));
    }

    #[tokio::test]
    async fn test_low_price_rejected_before_marketplace() {
        let market = Arc::new(FakeMarketplace::default());
        let planner = ActionPlanner::new(Some(market.clone()));
        let item = BatchItem::list("A", asset(1, "A"), 5_000_000u64);
        let err = planner.plan(&item, &[], &snapshot(true)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(market.built.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delist_parses_listing_id() {
        let market = Arc::new(FakeMarketplace::default());
        let planner = ActionPlanner::new(Some(market.clone()));
        let input = utxo(1, 3, SELF_ADDR, AssetMap::from_lovelace(5_000_000u64));
        let plan = planner
            .plan(&BatchItem::delist("D", "4411"), &[input.clone()], &snapshot(true))
            .await
            .unwrap();
        assert_eq!(plan.kind(), "delist");
        assert_eq!(market.built.lock().unwrap()[0], format!("delist 4411 from {}", input.out_ref));

        let err = planner
            .plan(&BatchItem::delist("D", "abc"), &[input], &snapshot(true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_listing_batch_submits_marketplace_bodies() {
        let wallet = FakeWallet::new(vec![
            utxo(1, 0, SELF_ADDR, AssetMap::from_lovelace(2_000_000u64).with(asset(1, "A"), 1u64)),
            utxo(1, 1, SELF_ADDR, AssetMap::from_lovelace(4_000_000u64)),
        ]);
        let tx = FakeTx::with_ledger(wallet.clone());
        let ctx = testing::context(wallet, tx.clone(), FakeIndexer::new()).await;
        let market = Arc::new(FakeMarketplace::default());

        let spec = BatchSpec::new(vec![
            BatchItem::list("A", asset(1, "A"), 10_000_000u64),
            BatchItem::delist("D", "4411"),
        ]);
        let mut orch = BatchOrchestrator::new(FailurePolicy::Abort);
        let report = orch.run(&ctx, &ActionPlanner::new(Some(market)), &spec, None).await;

        assert_eq!(report.summary(), "2 of 2 succeeded");
        // marketplace bodies go to the submitter untouched
        assert_eq!(tx.submitted_kinds(), vec!["prebuilt:84a500", "prebuilt:84a601"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listed_assets_are_healed_later() {
        let market = Arc::new(FakeMarketplace::default());
        let planner = ActionPlanner::new(Some(market.clone()));
        let item = BatchItem::list("A", asset(1, "A"), 10_000_000u64);
        planner.after_submit(&item, &testing::hash(5)).await;
        tokio::task::yield_now().await;
        assert!(market.healed.lock().unwrap().is_empty());

        tokio::time::sleep(HEAL_DELAY + Duration::from_secs(1)).await;
        assert_eq!(*market.healed.lock().unwrap(), vec![asset(1, "A")]);
    }

    /// Two-item sweep where the second submission answers with a short
    /// identifier instead of a hash.
    #[tokio::test]
    async fn test_sweep_with_malformed_second_hash() {
        let wallet = FakeWallet::new(vec![
            utxo(1, 0, SELF_ADDR, AssetMap::from_lovelace(3_000_000u64)),
            utxo(1, 1, SELF_ADDR, AssetMap::from_lovelace(4_000_000u64)),
        ]);
        let tx = FakeTx::with_ledger(wallet.clone());
        tx.respond(Ok(testing::hash(0xa1)));
        tx.respond(Ok("0123456789ab".into()));
        let ctx = testing::context(wallet, tx.clone(), FakeIndexer::new()).await;

        let pay = |label: &str| {
            BatchItem::new(
                label,
                crate::batch::InputClaim::lovelace_only(),
                ItemAction::Pay {
                    payments: vec![Payment {
                        address: "addr_test1qdest".into(),
                        lovelace: Quantity::from(1_000_000u32),
                    }],
                    message: Some("sweep".into()),
                },
            )
        };
        let spec = BatchSpec::new(vec![pay("first"), pay("second")]);
        let mut orch = BatchOrchestrator::new(FailurePolicy::Continue);
        let report = orch.run(&ctx, &ActionPlanner::new(None), &spec, None).await;

        assert_eq!(report.summary(), "1 of 2 succeeded");
        assert_eq!(report.outcome(0).unwrap().hash(), Some(testing::hash(0xa1).as_str()));
        assert_eq!(report.outcome(1).unwrap().error_kind(), Some(ErrorKind::MalformedResponse));
        // the first payment stays spent
        assert_eq!(tx.submitted.lock().unwrap().len(), 2);
        assert!(matches!(report.outcome(1), Some(ItemOutcome::Failed(_))));
    }
}
