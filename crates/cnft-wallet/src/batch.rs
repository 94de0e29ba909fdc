//! Batch orchestration.
//!
//! A batch runs an optional preparation transaction (usually a split that
//! gives every item its own output), an optional fee transaction, then each
//! item strictly in order. Every item re-resolves its input against a fresh
//! snapshot, skipping outputs the batch already claimed, and claims what it
//! picks before anything is built. A failed item is recorded and the
//! [`FailurePolicy`] decides whether the rest still run; a failed prep or fee
//! step aborts the batch. An item submitted but not seen settled is
//! unconfirmed: it keeps its hash and counts as neither success nor failure.
//! Claims and state are scoped to one [`run`](BatchOrchestrator::run).
//!
//! ```text
//! Idle -> Preparing -> Fee -> Executing(0) .. Executing(n-1) -> Completed
//! ```

use crate::backend::Signer;
use crate::context::Context;
use crate::error::{ErrorKind, WalletError};
use crate::exclusion::ExclusionSet;
use crate::settle::SettleError;
use async_trait::async_trait;
use cnft_tx::{FeePlan, FeeSchedule, ListingAction, Payment, SplitItem, SplitPlan, TxPlan};
use cnft_types::{AssetId, LedgerSnapshot, OutputRef, Quantity, Utxo};
use num_traits::Zero;
use std::sync::Arc;
use tokio::sync::mpsc;

// =============================================================================
// Items
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Preparing,
    Fee,
    Executing(usize),
    Completed,
}

/// How an item finds its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputClaim {
    /// No pinned input; the transaction library selects coins.
    Unpinned,
    /// First unclaimed output holding at least `min_quantity` of `asset`.
    /// With no asset, or a zero quantity, only lovelace-only outputs match.
    Match {
        asset: Option<AssetId>,
        min_quantity: Quantity,
        /// Restrict the search to outputs of the batch's prep transaction.
        from_prep: bool,
    },
    /// Exactly these outputs.
    Outputs(Vec<OutputRef>),
}

impl InputClaim {
    pub fn asset(asset: AssetId, min_quantity: impl Into<Quantity>) -> Self {
        InputClaim::Match {
            asset: Some(asset),
            min_quantity: min_quantity.into(),
            from_prep: true,
        }
    }

    pub fn lovelace_only() -> Self {
        InputClaim::Match {
            asset: None,
            min_quantity: Quantity::zero(),
            from_prep: true,
        }
    }

    fn matches(&self, utxo: &Utxo, prep: Option<&str>) -> bool {
        let InputClaim::Match {
            asset,
            min_quantity,
            from_prep,
        } = self
        else {
            return false;
        };
        if *from_prep {
            if let Some(h) = prep {
                if utxo.out_ref.tx_hash != h {
                    return false;
                }
            }
        }
        match asset {
            Some(a) if !min_quantity.is_zero() => utxo.assets.quantity(a) >= *min_quantity,
            _ => !utxo.assets.has_native_assets(),
        }
    }

    /// The split output this claim expects the prep transaction to create.
    fn split_item(&self) -> Option<SplitItem> {
        match self {
            InputClaim::Match {
                asset: Some(a),
                min_quantity,
                from_prep: true,
            } if !min_quantity.is_zero() => Some(SplitItem::asset(a.clone(), min_quantity.clone())),
            InputClaim::Match { from_prep: true, .. } => Some(SplitItem::lovelace_only()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemAction {
    Listing(ListingAction),
    Pay {
        payments: Vec<Payment>,
        message: Option<String>,
    },
    /// A plan built ahead of time.
    Plan(TxPlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub label: String,
    pub claim: InputClaim,
    pub action: ItemAction,
}

impl BatchItem {
    pub fn new(label: impl Into<String>, claim: InputClaim, action: ItemAction) -> Self {
        Self {
            label: label.into(),
            claim,
            action,
        }
    }

    /// List one unit of `asset` at `price` lovelace.
    pub fn list(label: impl Into<String>, asset: AssetId, price: impl Into<Quantity>) -> Self {
        Self::new(
            label,
            InputClaim::asset(asset.clone(), 1u32),
            ItemAction::Listing(ListingAction::List {
                asset,
                price: price.into(),
            }),
        )
    }

    /// Cancel listing `listing_id`, spending a lovelace-only output.
    pub fn delist(label: impl Into<String>, listing_id: impl Into<String>) -> Self {
        Self::new(
            label,
            InputClaim::lovelace_only(),
            ItemAction::Listing(ListingAction::Delist {
                listing_id: listing_id.into(),
            }),
        )
    }
}

/// Plans a transaction for one item from its claimed inputs.
#[async_trait]
pub trait ItemPlanner: Send + Sync {
    async fn plan(&self, item: &BatchItem, inputs: &[Utxo], snapshot: &LedgerSnapshot) -> Result<TxPlan, WalletError>;

    /// Called once the item's transaction was submitted.
    async fn after_submit(&self, _item: &BatchItem, _hash: &str) {}
}

/// What to do after an item fails.
pub enum FailurePolicy {
    Continue,
    Abort,
    /// Ask the operator; `true` continues.
    Ask(Box<dyn FnMut(&str, &WalletError) -> bool + Send>),
}

impl FailurePolicy {
    fn should_continue(&mut self, label: &str, err: &WalletError) -> bool {
        match self {
            FailurePolicy::Continue => true,
            FailurePolicy::Abort => false,
            FailurePolicy::Ask(ask) => ask(label, err),
        }
    }
}

impl std::fmt::Debug for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FailurePolicy::Continue => "Continue",
            FailurePolicy::Abort => "Abort",
            FailurePolicy::Ask(_) => "Ask",
        })
    }
}

/// Everything one batch run needs.
#[derive(Debug, Clone)]
pub struct BatchSpec {
    pub prep: Option<TxPlan>,
    pub fee: Option<TxPlan>,
    pub items: Vec<BatchItem>,
    pub signers: Vec<Signer>,
    /// Wait for each item to settle before moving on.
    pub confirm_items: bool,
}

impl BatchSpec {
    pub fn new(items: Vec<BatchItem>) -> Self {
        Self {
            prep: None,
            fee: None,
            items,
            signers: vec![Signer::Wallet],
            confirm_items: false,
        }
    }

    pub fn with_prep(mut self, plan: TxPlan) -> Self {
        self.prep = Some(plan);
        self
    }

    /// Prep with a split to `address` giving each prep-bound item its output.
    pub fn with_split_prep(self, address: &str) -> Result<Self, WalletError> {
        let items: Vec<_> = self.items.iter().filter_map(|i| i.claim.split_item()).collect();
        let plan = SplitPlan::new(address, items)?;
        Ok(self.with_prep(plan.into()))
    }

    pub fn with_fee(mut self, schedule: &FeeSchedule) -> Result<Self, WalletError> {
        self.fee = Some(FeePlan::new(schedule, self.items.len())?.into());
        Ok(self)
    }

    pub fn with_signers(mut self, signers: Vec<Signer>) -> Self {
        self.signers = signers;
        self
    }

    pub fn confirm_items(mut self, confirm: bool) -> Self {
        self.confirm_items = confirm;
        self
    }
}

// =============================================================================
// Outcomes
// =============================================================================

#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Confirmed { hash: String },
    /// Submitted; settlement was not awaited.
    Submitted { hash: String },
    /// Submitted, but not seen settled within the poll budget.
    Unconfirmed { hash: String },
    Failed(Arc<WalletError>),
    NotAttempted,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Confirmed { .. } | ItemOutcome::Submitted { .. })
    }

    pub fn hash(&self) -> Option<&str> {
        match self {
            ItemOutcome::Confirmed { hash } | ItemOutcome::Submitted { hash } | ItemOutcome::Unconfirmed { hash } => {
                Some(hash)
            }
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ItemOutcome::Failed(e) => Some(e.kind()),
            _ => None,
        }
    }
}

/// Why a batch stopped early.
#[derive(Debug)]
pub enum Abort {
    Prep(WalletError),
    Fee(WalletError),
    /// The operator declined to continue after this item failed.
    Operator { item: String },
}

impl Abort {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Abort::Prep(e) | Abort::Fee(e) => e.kind(),
            Abort::Operator { .. } => ErrorKind::UserAborted,
        }
    }
}

impl std::fmt::Display for Abort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Abort::Prep(e) => write!(f, "preparation failed: {}", e),
            Abort::Fee(e) => write!(f, "fee transaction failed: {}", e),
            Abort::Operator { item } => write!(f, "aborted by operator after {}", item),
        }
    }
}

#[derive(Debug)]
pub struct BatchReport {
    pub prep_hash: Option<String>,
    pub fee_hash: Option<String>,
    pub items: Vec<(String, ItemOutcome)>,
    pub aborted: Option<Abort>,
}

impl BatchReport {
    fn new(items: &[BatchItem]) -> Self {
        Self {
            prep_hash: None,
            fee_hash: None,
            items: items
                .iter()
                .map(|i| (i.label.clone(), ItemOutcome::NotAttempted))
                .collect(),
            aborted: None,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|(_, o)| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|(_, o)| matches!(o, ItemOutcome::Failed(_)))
            .count()
    }

    pub fn unconfirmed(&self) -> usize {
        self.items
            .iter()
            .filter(|(_, o)| matches!(o, ItemOutcome::Unconfirmed { .. }))
            .count()
    }

    pub fn not_attempted(&self) -> usize {
        self.items
            .iter()
            .filter(|(_, o)| matches!(o, ItemOutcome::NotAttempted))
            .count()
    }

    pub fn outcome(&self, index: usize) -> Option<&ItemOutcome> {
        self.items.get(index).map(|(_, o)| o)
    }

    /// "K of N succeeded", noting unconfirmed items when there are any.
    pub fn summary(&self) -> String {
        let summary = format!("{} of {} succeeded", self.succeeded(), self.items.len());
        match self.unconfirmed() {
            0 => summary,
            n => format!("{} ({} unconfirmed)", summary, n),
        }
    }
}

/// Progress events.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    BatchStarted { items: usize },
    StateChanged(BatchState),
    ItemStarted { index: usize, label: String },
    ItemFinished {
        index: usize,
        label: String,
        outcome: ItemOutcome,
    },
    BatchFinished { succeeded: usize, total: usize },
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct BatchOrchestrator {
    state: BatchState,
    exclusions: ExclusionSet,
    policy: FailurePolicy,
}

impl BatchOrchestrator {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            state: BatchState::Idle,
            exclusions: ExclusionSet::new(),
            policy,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Outputs claimed by the current or most recent run.
    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    async fn enter(&mut self, state: BatchState, events: Option<&mpsc::Sender<BatchEvent>>) {
        log::debug!("batch state {:?} -> {:?}", self.state, state);
        self.state = state;
        emit(events, BatchEvent::StateChanged(state)).await;
    }

    /// Run `spec` to completion.
    pub async fn run(
        &mut self,
        ctx: &Context,
        planner: &dyn ItemPlanner,
        spec: &BatchSpec,
        events: Option<&mpsc::Sender<BatchEvent>>,
    ) -> BatchReport {
        self.state = BatchState::Idle;
        self.exclusions = ExclusionSet::new();
        let mut report = BatchReport::new(&spec.items);
        let executor = ctx.executor();
        log::info!("batch of {} item(s) started", spec.items.len());
        emit(
            events,
            BatchEvent::BatchStarted {
                items: spec.items.len(),
            },
        )
        .await;

        self.enter(BatchState::Preparing, events).await;
        if let Some(prep) = &spec.prep {
            let hash = match executor.send(prep, &spec.signers).await {
                Ok((hash, _)) => hash,
                Err(e) => return self.abort(report, Abort::Prep(e.into()), events).await,
            };
            // items spend the prep outputs, so an unconfirmed prep still stops the batch
            report.prep_hash = Some(hash.clone());
            if let Err(e) = executor.confirm(&hash).await {
                return self.abort(report, Abort::Prep(e.into()), events).await;
            }
        }

        self.enter(BatchState::Fee, events).await;
        if let Some(fee) = &spec.fee {
            match executor.send(fee, &spec.signers).await {
                Ok((hash, _)) => report.fee_hash = Some(hash),
                Err(e) => return self.abort(report, Abort::Fee(e.into()), events).await,
            }
        }

        for (index, item) in spec.items.iter().enumerate() {
            self.enter(BatchState::Executing(index), events).await;
            emit(
                events,
                BatchEvent::ItemStarted {
                    index,
                    label: item.label.clone(),
                },
            )
            .await;

            let outcome = match self
                .run_item(ctx, planner, spec, item, report.prep_hash.as_deref())
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::warn!("{} failed: {}", item.label, e);
                    ItemOutcome::Failed(Arc::new(e))
                }
            };
            report.items[index].1 = outcome.clone();
            emit(
                events,
                BatchEvent::ItemFinished {
                    index,
                    label: item.label.clone(),
                    outcome: outcome.clone(),
                },
            )
            .await;

            if let ItemOutcome::Failed(e) = &outcome {
                let last = index + 1 == spec.items.len();
                if !last && !self.policy.should_continue(&item.label, e) {
                    report.aborted = Some(Abort::Operator {
                        item: item.label.clone(),
                    });
                    break;
                }
            }
        }

        self.finish(report, events).await
    }

    async fn run_item(
        &mut self,
        ctx: &Context,
        planner: &dyn ItemPlanner,
        spec: &BatchSpec,
        item: &BatchItem,
        prep_hash: Option<&str>,
    ) -> Result<ItemOutcome, WalletError> {
        let snapshot = ctx.snapshot().await?;
        let inputs = self.resolve(&item.claim, &snapshot, prep_hash)?;
        self.exclusions.claim_all(inputs.iter().map(|u| &u.out_ref));

        let plan = planner.plan(item, &inputs, &snapshot).await?;
        let executor = ctx.executor();
        let (hash, _) = executor.send(&plan, &spec.signers).await?;
        log::info!("{}: submitted {}", item.label, hash);
        let outcome = if !spec.confirm_items {
            ItemOutcome::Submitted { hash }
        } else {
            match executor.confirm(&hash).await {
                Ok(()) => ItemOutcome::Confirmed { hash },
                Err(SettleError::ConfirmationTimeout { attempts, .. }) => {
                    log::warn!("{}: {} unconfirmed after {} attempts", item.label, hash, attempts);
                    ItemOutcome::Unconfirmed { hash }
                }
                Err(e) => return Err(e.into()),
            }
        };
        if let Some(hash) = outcome.hash() {
            planner.after_submit(item, hash).await;
        }
        Ok(outcome)
    }

    fn resolve(
        &self,
        claim: &InputClaim,
        snapshot: &LedgerSnapshot,
        prep_hash: Option<&str>,
    ) -> Result<Vec<Utxo>, WalletError> {
        match claim {
            InputClaim::Unpinned => Ok(Vec::new()),
            InputClaim::Outputs(refs) => refs
                .iter()
                .map(|r| {
                    if self.exclusions.contains(r) {
                        return Err(WalletError::Validation(format!("output {} already used in this batch", r)));
                    }
                    snapshot
                        .find(r)
                        .cloned()
                        .ok_or_else(|| WalletError::Validation(format!("output {} not in wallet", r)))
                })
                .collect(),
            InputClaim::Match { asset, .. } => snapshot
                .utxos
                .iter()
                .find(|u| !self.exclusions.contains(&u.out_ref) && claim.matches(u, prep_hash))
                .cloned()
                .map(|u| vec![u])
                .ok_or_else(|| {
                    WalletError::Validation(match asset {
                        Some(a) => format!("no unclaimed output holds {}", a.unit()),
                        None => "no unclaimed lovelace-only output".to_string(),
                    })
                }),
        }
    }

    async fn abort(
        &mut self,
        mut report: BatchReport,
        abort: Abort,
        events: Option<&mpsc::Sender<BatchEvent>>,
    ) -> BatchReport {
        log::warn!("batch aborted: {}", abort);
        report.aborted = Some(abort);
        self.finish(report, events).await
    }

    async fn finish(&mut self, report: BatchReport, events: Option<&mpsc::Sender<BatchEvent>>) -> BatchReport {
        self.enter(BatchState::Completed, events).await;
        log::info!("batch finished: {}", report.summary());
        emit(
            events,
            BatchEvent::BatchFinished {
                succeeded: report.succeeded(),
                total: report.items.len(),
            },
        )
        .await;
        report
    }
}

async fn emit(events: Option<&mpsc::Sender<BatchEvent>>, event: BatchEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, asset, hash, utxo, FakeIndexer, FakeTx, FakeWallet, SELF_ADDR};
    use cnft_tx::{PaymentPlan, TxError};
    use cnft_types::AssetMap;

    /// Pays 1 ADA to a fixed address from the claimed inputs.
    struct PayPlanner;

    #[async_trait]
    impl ItemPlanner for PayPlanner {
        async fn plan(&self, item: &BatchItem, inputs: &[Utxo], _: &LedgerSnapshot) -> Result<TxPlan, WalletError> {
            if item.label == "bad plan" {
                return Err(TxError::Validation("cannot plan".into()).into());
            }
            let plan = PaymentPlan::new(vec![Payment {
                address: "addr_test1qdest".into(),
                lovelace: Quantity::from(1_000_000u32),
            }])?
            .with_inputs(inputs.to_vec());
            Ok(plan.into())
        }
    }

    fn item(label: &str, b: u8) -> BatchItem {
        BatchItem::new(
            label,
            InputClaim::asset(asset(b, label), 1u32),
            ItemAction::Pay {
                payments: Vec::new(),
                message: None,
            },
        )
    }

    fn wallet_with(assets: &[(u8, &str)]) -> Arc<FakeWallet> {
        let utxos = assets
            .iter()
            .enumerate()
            .map(|(i, (b, name))| {
                utxo(
                    1,
                    i as u32,
                    SELF_ADDR,
                    AssetMap::from_lovelace(2_000_000u64).with(asset(*b, name), 1u64),
                )
            })
            .collect();
        FakeWallet::new(utxos)
    }

    #[test]
    fn test_lovelace_only_match() {
        let claim = InputClaim::lovelace_only();
        let plain = utxo(1, 0, SELF_ADDR, AssetMap::from_lovelace(5_000_000u64));
        let with_token = utxo(1, 1, SELF_ADDR, AssetMap::from_lovelace(5_000_000u64).with(asset(1, "A"), 1u64));
        assert!(claim.matches(&plain, None));
        assert!(!claim.matches(&with_token, None));
        assert!(!claim.matches(&plain, Some(&hash(9))));
    }

    #[test]
    fn test_split_prep_from_claims() {
        let spec = BatchSpec::new(vec![
            BatchItem::list("A", asset(1, "A"), 10_000_000u64),
            BatchItem::delist("B", "7"),
            BatchItem::new("C", InputClaim::Unpinned, ItemAction::Pay { payments: vec![], message: None }),
        ])
        .with_split_prep(SELF_ADDR)
        .unwrap();
        let Some(TxPlan::Split(split)) = &spec.prep else {
            panic!("expected split prep");
        };
        assert_eq!(split.items, vec![SplitItem::asset(asset(1, "A"), 1u32), SplitItem::lovelace_only()]);
    }

    #[tokio::test]
    async fn test_items_run_in_order_and_claim_once() {
        let wallet = wallet_with(&[(1, "A"), (1, "B"), (1, "C")]);
        let tx = FakeTx::with_ledger(wallet.clone());
        let ctx = testing::context(wallet, tx.clone(), FakeIndexer::new()).await;

        let spec = BatchSpec::new(vec![item("A", 1), item("B", 1), item("C", 1)]);
        let (etx, mut erx) = mpsc::channel(64);
        let mut orch = BatchOrchestrator::new(FailurePolicy::Continue);
        let report = orch.run(&ctx, &PayPlanner, &spec, Some(&etx)).await;
        drop(etx);

        assert_eq!(report.summary(), "3 of 3 succeeded");
        assert_eq!(orch.state(), BatchState::Completed);
        assert_eq!(orch.exclusions().len(), 3);

        let mut states = Vec::new();
        let mut started = Vec::new();
        while let Some(ev) = erx.recv().await {
            match ev {
                BatchEvent::StateChanged(s) => states.push(s),
                BatchEvent::ItemStarted { label, .. } => started.push(label),
                _ => {}
            }
        }
        assert_eq!(
            states,
            vec![
                BatchState::Preparing,
                BatchState::Fee,
                BatchState::Executing(0),
                BatchState::Executing(1),
                BatchState::Executing(2),
                BatchState::Completed,
            ]
        );
        assert_eq!(started, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_same_asset_twice_is_not_double_claimed() {
        // one output, two items asking for the same asset
        let wallet = wallet_with(&[(1, "A")]);
        let tx = FakeTx::default();
        let ctx = testing::context(wallet, Arc::new(tx), FakeIndexer::new()).await;

        let spec = BatchSpec::new(vec![item("A", 1), item("A", 1)]);
        let mut orch = BatchOrchestrator::new(FailurePolicy::Continue);
        let report = orch.run(&ctx, &PayPlanner, &spec, None).await;
        assert!(report.outcome(0).unwrap().is_success());
        assert_eq!(report.outcome(1).unwrap().error_kind(), Some(ErrorKind::Validation));
        assert_eq!(orch.exclusions().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_item_continues() {
        let wallet = wallet_with(&[(1, "A"), (1, "bad plan"), (1, "C")]);
        let tx = FakeTx::with_ledger(wallet.clone());
        let ctx = testing::context(wallet, tx, FakeIndexer::new()).await;

        let spec = BatchSpec::new(vec![item("A", 1), item("bad plan", 1), item("C", 1)]);
        let mut orch = BatchOrchestrator::new(FailurePolicy::Continue);
        let report = orch.run(&ctx, &PayPlanner, &spec, None).await;
        assert_eq!(report.summary(), "2 of 3 succeeded");
        assert!(report.outcome(2).unwrap().is_success());
        assert!(report.aborted.is_none());
        // the failed item's output stays claimed
        assert_eq!(orch.exclusions().len(), 3);
    }

    #[tokio::test]
    async fn test_declining_leaves_rest_not_attempted() {
        let wallet = wallet_with(&[(1, "A"), (1, "bad plan"), (1, "C")]);
        let tx = FakeTx::with_ledger(wallet.clone());
        let ctx = testing::context(wallet, tx, FakeIndexer::new()).await;

        let asked = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = asked.clone();
        let policy = FailurePolicy::Ask(Box::new(move |label, _| {
            seen.lock().unwrap().push(label.to_string());
            false
        }));
        let spec = BatchSpec::new(vec![item("A", 1), item("bad plan", 1), item("C", 1)]);
        let mut orch = BatchOrchestrator::new(policy);
        let report = orch.run(&ctx, &PayPlanner, &spec, None).await;

        assert_eq!(*asked.lock().unwrap(), vec!["bad plan"]);
        assert!(matches!(report.outcome(2), Some(ItemOutcome::NotAttempted)));
        assert_eq!(report.aborted.as_ref().unwrap().kind(), ErrorKind::UserAborted);
        assert_eq!(report.summary(), "1 of 3 succeeded");
        assert_eq!(orch.state(), BatchState::Completed);
    }

    #[tokio::test]
    async fn test_fee_failure_aborts_everything() {
        let wallet = wallet_with(&[(1, "A")]);
        let tx = Arc::new(FakeTx::default());
        tx.respond(Err(crate::backend::BackendError::Rejected("insufficient funds".into())));
        let ctx = testing::context(wallet, tx.clone(), FakeIndexer::new()).await;

        let spec = BatchSpec::new(vec![item("A", 1)])
            .with_fee(&FeeSchedule::new("addr_test1qfee"))
            .unwrap();
        let mut orch = BatchOrchestrator::new(FailurePolicy::Continue);
        let report = orch.run(&ctx, &PayPlanner, &spec, None).await;
        assert!(matches!(report.aborted, Some(Abort::Fee(_))));
        assert_eq!(report.not_attempted(), 1);
        assert_eq!(report.summary(), "0 of 1 succeeded");
        assert!(orch.exclusions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prep_outputs_are_preferred() {
        // an older output also holds A; the split's output must be used
        let wallet = wallet_with(&[(1, "A")]);
        let tx = FakeTx::with_ledger(wallet.clone());
        let ctx = testing::context(wallet.clone(), tx.clone(), FakeIndexer::new()).await;

        let spec = BatchSpec::new(vec![item("A", 1)]).with_split_prep(SELF_ADDR).unwrap();
        let mut orch = BatchOrchestrator::new(FailurePolicy::Continue);
        let report = orch.run(&ctx, &PayPlanner, &spec, None).await;

        let prep = report.prep_hash.clone().unwrap();
        assert!(report.outcome(0).unwrap().is_success());
        let claimed: Vec<_> = orch.exclusions().iter().cloned().collect();
        assert_eq!(claimed, vec![OutputRef::new(prep, 0)]);
    }

    #[tokio::test]
    async fn test_malformed_second_hash_fails_only_that_item() {
        let wallet = wallet_with(&[(1, "A"), (1, "B")]);
        let tx = FakeTx::with_ledger(wallet.clone());
        tx.respond(Ok(hash(0xa1)));
        tx.respond(Ok("0123456789ab".into()));
        let ctx = testing::context(wallet, tx.clone(), FakeIndexer::new()).await;

        let spec = BatchSpec::new(vec![item("A", 1), item("B", 1)]);
        let mut orch = BatchOrchestrator::new(FailurePolicy::Continue);
        let report = orch.run(&ctx, &PayPlanner, &spec, None).await;

        assert_eq!(report.summary(), "1 of 2 succeeded");
        assert_eq!(report.outcome(0).unwrap().hash(), Some(hash(0xa1).as_str()));
        assert_eq!(report.outcome(1).unwrap().error_kind(), Some(ErrorKind::MalformedResponse));
        assert_eq!(report.outcome(1).unwrap().hash(), None);
        assert_eq!(report.failed(), 1);
        assert_eq!(tx.submitted.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout_is_unconfirmed_not_failed() {
        // no ledger: submitted transactions never reach the wallet
        let wallet = wallet_with(&[(1, "A"), (1, "B")]);
        let tx = Arc::new(FakeTx::default());
        let ctx = testing::context(wallet, tx.clone(), FakeIndexer::new()).await;

        let asked = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = asked.clone();
        let policy = FailurePolicy::Ask(Box::new(move |label, _| {
            seen.lock().unwrap().push(label.to_string());
            false
        }));
        let spec = BatchSpec::new(vec![item("A", 1), item("B", 1)]).confirm_items(true);
        let mut orch = BatchOrchestrator::new(policy);
        let report = orch.run(&ctx, &PayPlanner, &spec, None).await;

        let first = report.outcome(0).unwrap();
        assert!(matches!(first, ItemOutcome::Unconfirmed { .. }), "{:?}", first);
        assert_eq!(first.hash(), Some(hash(0x1001).as_str()));
        assert!(!first.is_success());
        assert_eq!(first.error_kind(), None);

        // the operator is never asked and the second item still runs
        assert!(asked.lock().unwrap().is_empty());
        assert!(report.aborted.is_none());
        assert_eq!(report.outcome(1).unwrap().hash(), Some(hash(0x1002).as_str()));

        assert_eq!(report.failed(), 0);
        assert_eq!(report.unconfirmed(), 2);
        assert_eq!(report.summary(), "0 of 2 succeeded (2 unconfirmed)");
    }

    #[tokio::test]
    async fn test_each_run_starts_with_fresh_claims() {
        let wallet = wallet_with(&[(1, "bad plan")]);
        let tx = FakeTx::with_ledger(wallet.clone());
        let ctx = testing::context(wallet, tx, FakeIndexer::new()).await;
        let mut orch = BatchOrchestrator::new(FailurePolicy::Continue);

        // planning fails after the output was claimed; nothing is submitted
        let first = orch
            .run(&ctx, &PayPlanner, &BatchSpec::new(vec![item("bad plan", 1)]), None)
            .await;
        assert_eq!(first.summary(), "0 of 1 succeeded");
        assert_eq!(orch.exclusions().len(), 1);
        assert_eq!(orch.state(), BatchState::Completed);

        let retry = BatchItem::new(
            "retry",
            InputClaim::asset(asset(1, "bad plan"), 1u32),
            ItemAction::Pay {
                payments: Vec::new(),
                message: None,
            },
        );
        let (etx, mut erx) = mpsc::channel(16);
        let second = orch.run(&ctx, &PayPlanner, &BatchSpec::new(vec![retry]), Some(&etx)).await;
        drop(etx);
        assert_eq!(second.summary(), "1 of 1 succeeded");
        assert_eq!(orch.exclusions().len(), 1);

        let mut states = Vec::new();
        while let Some(ev) = erx.recv().await {
            if let BatchEvent::StateChanged(s) = ev {
                states.push(s);
            }
        }
        assert_eq!(states.first(), Some(&BatchState::Preparing));
        assert_eq!(states.last(), Some(&BatchState::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_prep_keeps_its_hash() {
        let wallet = wallet_with(&[(1, "A")]);
        let tx = Arc::new(FakeTx::default());
        let ctx = testing::context(wallet, tx, FakeIndexer::new()).await;

        let spec = BatchSpec::new(vec![item("A", 1)]).with_split_prep(SELF_ADDR).unwrap();
        let mut orch = BatchOrchestrator::new(FailurePolicy::Continue);
        let report = orch.run(&ctx, &PayPlanner, &spec, None).await;

        assert_eq!(report.prep_hash, Some(hash(0x1001)));
        let Some(Abort::Prep(e)) = &report.aborted else {
            panic!("expected prep abort, got {:?}", report.aborted);
        };
        assert_eq!(e.kind(), ErrorKind::ConfirmationTimeout);
        assert_eq!(report.not_attempted(), 1);
    }
}
