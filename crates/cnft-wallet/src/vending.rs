//! Vending machine.
//!
//! Watches a vending address for incoming payments and answers each one
//! with a mint (or a refund) back to whoever paid. The session owns its
//! descriptor queue and its exclusion set and runs in a single task, so
//! cycles never overlap and nothing else touches either.
//!
//! ```text
//! Stopped -> Initializing -> Running -> Stopped
//! ```
//!
//! A payment output is claimed before its transaction is built, so a slow
//! submission can never make the next cycle vend it twice. Errors inside a
//! cycle go to the audit log and the loop keeps going; only a stop request
//! ends it.

use crate::backend::Signer;
use crate::context::Context;
use crate::error::WalletError;
use crate::exclusion::ExclusionSet;
use crate::filter::require_ratio;
use crate::metadata;
use chrono::{DateTime, SecondsFormat, Utc};
use cnft_tx::{MintDescriptor, MintPlan, MintPolicy, TxPlan};
use cnft_types::{LedgerSnapshot, Network, PolicyId, Quantity, Utxo};
use num_traits::{ToPrimitive, Zero};
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Delay between cycles.
pub const VENDING_INTERVAL: Duration = Duration::from_secs(5);

/// Per-payment cap when a priced session does not set one.
pub const DEFAULT_SINGLE_VEND_MAX: u32 = 100;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pricing {
    /// Every payment gets up to `cap` mints whatever it paid.
    Free { cap: Option<u32> },
    /// `price` lovelace per mint, at most `cap` per payment.
    Priced { price: Quantity, cap: Option<u32> },
}

impl Pricing {
    fn cap(&self) -> u32 {
        match self {
            Pricing::Free { cap } => cap.unwrap_or(0),
            Pricing::Priced { cap, .. } => cap.unwrap_or(DEFAULT_SINGLE_VEND_MAX),
        }
    }

    fn validate(self) -> Result<Self, WalletError> {
        match self {
            Pricing::Free { cap: None } => Err(WalletError::Validation(
                "free mints need an explicit per-payment cap".into(),
            )),
            Pricing::Free { cap: Some(0) } | Pricing::Priced { cap: Some(0), .. } => {
                Err(WalletError::Validation("per-payment cap must be at least 1".into()))
            }
            Pricing::Priced { price, .. } if price.is_zero() => Err(WalletError::Validation(
                "price must be positive; use free pricing for free mints".into(),
            )),
            Pricing::Priced { price, cap } => Ok(Pricing::Priced {
                price,
                cap: Some(cap.unwrap_or(DEFAULT_SINGLE_VEND_MAX)),
            }),
            free => Ok(free),
        }
    }
}

/// Holdings required to run on mainnet: one unit under `policies` per
/// `ratio` queued descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatioGate {
    pub policies: Vec<PolicyId>,
    pub ratio: u64,
}

impl RatioGate {
    /// Only mainnet sessions are gated.
    pub fn check(&self, network: Network, snapshot: &LedgerSnapshot, items: usize) -> Result<(), WalletError> {
        if network != Network::Mainnet {
            return Ok(());
        }
        require_ratio(snapshot, &self.policies, items, self.ratio)
    }
}

#[derive(Debug, Clone)]
pub struct VendingConfig {
    pub vending_address: String,
    /// Receives the proceeds of priced sales.
    pub profit_vault: String,
    /// Key controlling the vending address.
    pub vending_key: Signer,
    pub policy_key: Signer,
    pub policy: MintPolicy,
    pub pricing: Pricing,
    pub shuffle: bool,
    pub interval: Duration,
    pub ratio_gate: Option<RatioGate>,
}

impl VendingConfig {
    fn validate(mut self) -> Result<Self, WalletError> {
        if self.vending_address.trim().is_empty() {
            return Err(WalletError::Validation("missing vending address".into()));
        }
        if self.profit_vault.trim().is_empty() {
            return Err(WalletError::Validation("missing profit vault address".into()));
        }
        if self.vending_address == self.profit_vault {
            return Err(WalletError::Validation(
                "vending address and profit vault must differ".into(),
            ));
        }
        if self.policy.script.cbor.is_empty() {
            return Err(WalletError::Validation("missing policy script".into()));
        }
        self.pricing = self.pricing.validate()?;
        Ok(self)
    }
}

// =============================================================================
// Sale Arithmetic
// =============================================================================

/// What one payment buys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleTerms {
    pub granted: usize,
    /// Lovelace returned to the payer on top of the minted assets.
    pub overage: Quantity,
    /// Whether balancing change goes to the payer rather than the vault.
    pub change_to_payer: bool,
}

/// Terms for a payment of `balance` with `remaining` descriptors queued.
pub fn sale_terms(pricing: &Pricing, balance: &Quantity, remaining: usize) -> SaleTerms {
    let cap = pricing.cap() as usize;
    match pricing {
        Pricing::Free { .. } => SaleTerms {
            granted: cap.min(remaining),
            overage: Quantity::zero(),
            change_to_payer: true,
        },
        Pricing::Priced { price, .. } => {
            let requested = (balance / price).to_usize().unwrap_or(usize::MAX);
            let granted = cap.min(remaining).min(requested);
            if granted == 0 {
                return SaleTerms {
                    granted,
                    overage: Quantity::zero(),
                    change_to_payer: true,
                };
            }
            SaleTerms {
                granted,
                overage: balance - price * Quantity::from(granted),
                change_to_payer: false,
            }
        }
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendingState {
    Stopped,
    Initializing,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl std::fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.at.to_rfc3339_opts(SecondsFormat::Millis, true), self.message)
    }
}

pub struct VendingSession {
    config: VendingConfig,
    queue: VecDeque<MintDescriptor>,
    exclusions: ExclusionSet,
    audit: Vec<AuditEntry>,
    state: VendingState,
    minted: usize,
}

impl VendingSession {
    /// Validate the configuration and queue, checking the holdings gate
    /// against the operator's wallet.
    pub async fn prepare(
        ctx: &Context,
        config: VendingConfig,
        descriptors: Vec<MintDescriptor>,
    ) -> Result<Self, WalletError> {
        let config = config.validate()?;
        for d in &descriptors {
            metadata::check_descriptor(&d.name, d)?;
        }
        metadata::check_unique(&descriptors)?;
        if let Some(gate) = &config.ratio_gate {
            let snapshot = ctx.snapshot().await?;
            gate.check(ctx.network(), &snapshot, descriptors.len())?;
        }

        let mut descriptors = descriptors;
        if config.shuffle {
            descriptors.shuffle(&mut rand::thread_rng());
        }
        let mut session = Self {
            config,
            queue: descriptors.into(),
            exclusions: ExclusionSet::new(),
            audit: Vec::new(),
            state: VendingState::Initializing,
            minted: 0,
        };
        session.log(format!("prepared with {} mint(s) queued", session.queue.len()));
        Ok(session)
    }

    pub fn state(&self) -> VendingState {
        self.state
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn minted(&self) -> usize {
        self.minted
    }

    pub fn audit_log(&self) -> &[AuditEntry] {
        &self.audit
    }

    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    fn log(&mut self, message: String) {
        log::info!("vending: {}", message);
        self.audit.push(AuditEntry {
            at: Utc::now(),
            message,
        });
    }

    /// Spawn the loop. The first cycle runs one interval after start.
    pub fn start(mut self, ctx: Context) -> VendingHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        self.state = VendingState::Running;
        self.log("vending machine started".into());
        let join = tokio::spawn(self.run(ctx, stop_rx));
        VendingHandle { stop_tx, join }
    }

    async fn run(mut self, ctx: Context, mut stop: watch::Receiver<bool>) -> Self {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *stop.borrow() {
                break;
            }
            self.run_cycle(&ctx).await;
        }
        self.state = VendingState::Stopped;
        self.log("vending machine stopped".into());
        self
    }

    /// One scan of the vending address.
    pub async fn run_cycle(&mut self, ctx: &Context) {
        self.log(format!(
            "{} mints remaining, looking for new payments",
            self.queue.len()
        ));
        let utxos = match ctx.indexer.utxos_at(&self.config.vending_address).await {
            Ok(u) => u,
            Err(e) => {
                self.log(format!("could not fetch vending outputs: {}", e));
                return;
            }
        };
        for utxo in utxos {
            if utxo.lovelace().is_zero() || !self.exclusions.claim(&utxo.out_ref) {
                continue;
            }
            let out_ref = utxo.out_ref.clone();
            if let Err(e) = self.vend(ctx, utxo).await {
                self.log(format!("payment {} not vended: {}", out_ref, e));
            }
        }
    }

    async fn vend(&mut self, ctx: &Context, payment: Utxo) -> Result<(), WalletError> {
        let payer = ctx.indexer.payer_of(&payment.out_ref.tx_hash).await?;
        let balance = payment.lovelace();
        let terms = sale_terms(&self.config.pricing, &balance, self.queue.len());
        let descriptors: Vec<_> = self.queue.drain(..terms.granted).collect();

        match self.submit_sale(ctx, payment, &payer, descriptors.clone(), &terms).await {
            Ok(hash) => {
                if descriptors.is_empty() {
                    self.log(format!("refunded {} lovelace to {} ({})", balance, payer, hash));
                } else {
                    self.minted += descriptors.len();
                    let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
                    self.log(format!("minted {} to {} ({})", names.join(", "), payer, hash));
                }
                Ok(())
            }
            Err(e) => {
                if never_submitted(&e) {
                    for d in descriptors.into_iter().rev() {
                        self.queue.push_front(d);
                    }
                }
                Err(e)
            }
        }
    }

    async fn submit_sale(
        &self,
        ctx: &Context,
        payment: Utxo,
        payer: &str,
        descriptors: Vec<MintDescriptor>,
        terms: &SaleTerms,
    ) -> Result<String, WalletError> {
        let policy = self.config.policy.clone();
        let plan = if descriptors.is_empty() {
            MintPlan::refund(ctx.network(), policy, payment, payer)?
        } else {
            let change_to = if terms.change_to_payer {
                payer
            } else {
                self.config.profit_vault.as_str()
            };
            MintPlan::sale(
                ctx.network(),
                policy,
                descriptors,
                payment,
                payer,
                terms.overage.clone(),
                change_to,
            )?
        };
        let signers = if plan.is_refund() {
            vec![self.config.vending_key.clone()]
        } else {
            vec![self.config.policy_key.clone(), self.config.vending_key.clone()]
        };
        let (hash, _) = ctx.executor().send(&TxPlan::Mint(plan), &signers).await?;
        Ok(hash)
    }
}

fn never_submitted(e: &WalletError) -> bool {
    match e {
        WalletError::Tx(_) => true,
        WalletError::Settle(s) => s.never_submitted(),
        _ => false,
    }
}

/// Validate, then spawn a session.
pub async fn start(
    ctx: Context,
    config: VendingConfig,
    descriptors: Vec<MintDescriptor>,
) -> Result<VendingHandle, WalletError> {
    let session = VendingSession::prepare(&ctx, config, descriptors).await?;
    Ok(session.start(ctx))
}

/// Operator's handle on a running session.
pub struct VendingHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<VendingSession>,
}

impl VendingHandle {
    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }

    /// Request a stop and wait for the in-flight cycle to finish.
    pub async fn stop(self) -> Result<VendingSession, WalletError> {
        let _ = self.stop_tx.send(true);
        self.join
            .await
            .map_err(|e| WalletError::Other(format!("vending task failed: {}", e)))
    }
}
