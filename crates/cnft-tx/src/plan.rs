//! Transaction plans.
//!
//! A [`TxPlan`] is a closed set of intents, each with a fixed field set.
//! Constructors validate everything up front and return
//! [`TxError::Validation`]; a plan that exists is complete. Plans are never
//! patched: build a new one instead. [`TxPlan::lower`] turns a plan into the
//! [`TxDraft`] the transaction library finalizes, and lowering the same plan
//! twice yields identical drafts.

use crate::builder::TxBuilder;
use crate::fee::FeeSchedule;
use crate::plutus::PlutusData;
use crate::schema::{Listing, Payee, SchemaRegistry};
use crate::types::{Script, TxDescriptor, TxDraft, TxInput};
use crate::TxError;
use cnft_types::constants::{LOVELACE_PER_ADA, MAX_METADATA_STR_LEN, MESSAGE_METADATA_LABEL, NFT_METADATA_LABEL};
use cnft_types::asset::quantity_str;
use cnft_types::{parse_quantity, AssetId, AssetMap, Network, OutputRef, PolicyId, Quantity, Utxo};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Lovelace carried by each split output alongside its asset (5 ADA).
pub const SPLIT_OUTPUT_LOVELACE: u64 = 5 * LOVELACE_PER_ADA;

/// Listing prices must exceed this (5 ADA).
pub const MIN_LISTING_PRICE: u64 = 5 * LOVELACE_PER_ADA;

fn require(field: &str, value: &str) -> Result<(), TxError> {
    if value.trim().is_empty() {
        return Err(TxError::Validation(format!("missing {}", field)));
    }
    Ok(())
}

// =============================================================================
// Fee
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePlan {
    pub address: String,
    #[serde(with = "quantity_str")]
    pub amount: Quantity,
    pub item_count: usize,
}

impl FeePlan {
    pub fn new(schedule: &FeeSchedule, item_count: usize) -> Result<Self, TxError> {
        require("fee address", &schedule.address)?;
        Ok(Self {
            address: schedule.address.clone(),
            amount: schedule.amount(item_count),
            item_count,
        })
    }

    fn lower(&self) -> Result<TxDraft, TxError> {
        let desc = TxBuilder::new()
            .pay_to(&self.address, AssetMap::from_lovelace(self.amount.clone()))
            .build()?;
        Ok(TxDraft::Declarative(desc))
    }
}

// =============================================================================
// Split
// =============================================================================

/// One dedicated output to create. `asset: None` or a zero quantity yields a
/// lovelace-only output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<AssetId>,
    #[serde(with = "quantity_str")]
    pub quantity: Quantity,
}

impl SplitItem {
    pub fn lovelace_only() -> Self {
        Self {
            asset: None,
            quantity: Quantity::zero(),
        }
    }

    pub fn asset(asset: AssetId, quantity: impl Into<Quantity>) -> Self {
        Self {
            asset: Some(asset),
            quantity: quantity.into(),
        }
    }

    /// Value the split output carries.
    pub fn output_value(&self) -> AssetMap {
        let mut value = AssetMap::from_lovelace(SPLIT_OUTPUT_LOVELACE);
        if let Some(asset) = &self.asset {
            if !self.quantity.is_zero() {
                value.add(asset.clone(), self.quantity.clone());
            }
        }
        value
    }
}

/// Send-to-self that leaves one output per batch item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPlan {
    pub address: String,
    pub items: Vec<SplitItem>,
}

impl SplitPlan {
    pub fn new(address: impl Into<String>, items: Vec<SplitItem>) -> Result<Self, TxError> {
        let address = address.into();
        require("split address", &address)?;
        if items.is_empty() {
            return Err(TxError::Validation("split plan has no items".into()));
        }
        if items.iter().any(|i| matches!(&i.asset, Some(AssetId::Lovelace))) {
            return Err(TxError::Validation("split item asset must be native".into()));
        }
        Ok(Self { address, items })
    }

    fn lower(&self) -> Result<TxDraft, TxError> {
        let mut b = TxBuilder::new();
        for item in &self.items {
            b = b.pay_to(&self.address, item.output_value());
        }
        Ok(TxDraft::Declarative(b.build()?))
    }
}

// =============================================================================
// Listing
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ListingAction {
    List {
        asset: AssetId,
        #[serde(with = "quantity_str")]
        price: Quantity,
    },
    Delist { listing_id: String },
}

impl ListingAction {
    /// Checks run before the marketplace is contacted.
    pub fn validate(&self) -> Result<(), TxError> {
        match self {
            ListingAction::List { asset, price } => {
                if asset.is_lovelace() {
                    return Err(TxError::Validation("cannot list lovelace".into()));
                }
                if *price <= Quantity::from(MIN_LISTING_PRICE) {
                    return Err(TxError::Validation(format!(
                        "price {} must exceed {} lovelace",
                        price, MIN_LISTING_PRICE
                    )));
                }
                Ok(())
            }
            ListingAction::Delist { listing_id } => require("listing id", listing_id),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ListingAction::List { .. })
    }
}

/// Marketplace-built list/delist transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingPlan {
    pub action: ListingAction,
    pub input: OutputRef,
    pub collateral: OutputRef,
    pub descriptor: TxDescriptor,
}

impl ListingPlan {
    pub fn new(
        action: ListingAction,
        input: OutputRef,
        collateral: OutputRef,
        descriptor: TxDescriptor,
    ) -> Result<Self, TxError> {
        action.validate()?;
        require("transaction cbor", &descriptor.cbor)?;
        if hex::decode(&descriptor.cbor).is_err() {
            return Err(TxError::Validation("marketplace cbor is not hex".into()));
        }
        Ok(Self {
            action,
            input,
            collateral,
            descriptor,
        })
    }
}

// =============================================================================
// Purchase
// =============================================================================

/// A resolved script spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseSpend {
    pub listing: Listing,
    /// Hex CBOR redeemer.
    pub redeemer: String,
    /// Hex CBOR datum.
    pub datum: String,
    pub payees: Vec<Payee>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PurchasePlan {
    /// Spends marketplace script outputs directly.
    Scripted {
        buyer: String,
        spends: Vec<PurchaseSpend>,
        script: Script,
    },
    /// Purchase transaction built by the marketplace.
    Prebuilt { descriptor: TxDescriptor },
}

impl PurchasePlan {
    /// Resolve each listing through its schema handler.
    pub fn build(
        registry: &SchemaRegistry,
        buyer: impl Into<String>,
        listings: Vec<Listing>,
        script: Script,
    ) -> Result<Self, TxError> {
        let buyer = buyer.into();
        require("buyer address", &buyer)?;
        require("marketplace script", &script.cbor)?;
        if listings.is_empty() {
            return Err(TxError::Validation("no listings to purchase".into()));
        }

        let mut spends = Vec::with_capacity(listings.len());
        for listing in listings {
            let handler = registry.resolve(&listing.schema)?;
            if !listing.utxo.holds(&listing.asset) {
                return Err(TxError::Validation(format!(
                    "output {} does not hold {}",
                    listing.utxo.out_ref,
                    listing.asset.unit()
                )));
            }
            let payees = handler.payees(&listing)?;
            for p in &payees {
                require("payee address", &p.address)?;
            }
            let datum = hex::encode(handler.datum(&listing)?);
            let redeemer = handler.redeemer(&listing).to_hex();
            spends.push(PurchaseSpend {
                listing,
                redeemer,
                datum,
                payees,
            });
        }
        Ok(PurchasePlan::Scripted {
            buyer,
            spends,
            script,
        })
    }

    pub fn prebuilt(descriptor: TxDescriptor) -> Result<Self, TxError> {
        require("transaction cbor", &descriptor.cbor)?;
        Ok(PurchasePlan::Prebuilt { descriptor })
    }

    fn lower(&self) -> Result<TxDraft, TxError> {
        match self {
            PurchasePlan::Prebuilt { descriptor } => Ok(TxDraft::Prebuilt(descriptor.clone())),
            PurchasePlan::Scripted {
                buyer,
                spends,
                script,
            } => {
                let mut b = TxBuilder::new().attach_script(script.clone()).change_to(buyer);
                let mut purchased = AssetMap::new();
                for spend in spends {
                    b = b.with_input(TxInput {
                        utxo: spend.listing.utxo.clone(),
                        redeemer: Some(spend.redeemer.clone()),
                        datum: Some(spend.datum.clone()),
                    });
                    for p in &spend.payees {
                        let value = AssetMap::from_lovelace(p.amount.clone());
                        b = match &p.datum {
                            Some(d) => {
                                let bytes = hex::decode(d)
                                    .map_err(|e| TxError::Validation(format!("payee datum: {}", e)))?;
                                b.pay_to_with_datum(&p.address, value, &bytes)
                            }
                            None => b.pay_to(&p.address, value),
                        };
                    }
                    purchased.add(spend.listing.asset.clone(), spend.listing.utxo.assets.quantity(&spend.listing.asset));
                }
                b = b.pay_to(buyer, purchased);
                Ok(TxDraft::Declarative(b.build()?))
            }
        }
    }
}

// =============================================================================
// Mint
// =============================================================================

/// Minting policy: identifier, script, and optional expiry slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintPolicy {
    pub id: PolicyId,
    pub script: Script,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_slot: Option<u64>,
}

/// One asset to mint: its name and the CIP-25 body published for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintDescriptor {
    pub name: String,
    pub metadata: Value,
}

impl MintDescriptor {
    /// From a metadata file's JSON: an object with exactly one key, the
    /// asset name, mapping to its body.
    pub fn from_json(value: &Value) -> Result<Self, TxError> {
        let obj = value
            .as_object()
            .ok_or_else(|| TxError::Validation("metadata must be a JSON object".into()))?;
        if obj.len() != 1 {
            return Err(TxError::Validation(format!(
                "exactly one asset name per file, found {}",
                obj.len()
            )));
        }
        let (name, body) = obj
            .iter()
            .next()
            .ok_or_else(|| TxError::Validation("empty metadata".into()))?;
        Ok(Self {
            name: name.clone(),
            metadata: body.clone(),
        })
    }

    pub fn asset_id(&self, policy: &PolicyId) -> AssetId {
        AssetId::native(*policy, self.name.as_bytes().to_vec())
    }
}

/// Vending sale: consume one payment, mint the popped descriptors to the
/// payer, and route overage and change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintPlan {
    pub policy: MintPolicy,
    pub descriptors: Vec<MintDescriptor>,
    pub payment: Utxo,
    pub payer: String,
    /// Lovelace paid back to the payer.
    #[serde(with = "quantity_str")]
    pub overage: Quantity,
    pub change_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to_ms: Option<u64>,
}

impl MintPlan {
    pub fn sale(
        network: Network,
        policy: MintPolicy,
        descriptors: Vec<MintDescriptor>,
        payment: Utxo,
        payer: impl Into<String>,
        overage: Quantity,
        change_to: impl Into<String>,
    ) -> Result<Self, TxError> {
        let payer = payer.into();
        let change_to = change_to.into();
        require("payer address", &payer)?;
        require("change address", &change_to)?;
        require("policy script", &policy.script.cbor)?;
        if overage > payment.lovelace() {
            return Err(TxError::Validation(format!(
                "overage {} exceeds payment {}",
                overage,
                payment.lovelace()
            )));
        }
        let mut names = std::collections::BTreeSet::new();
        for d in &descriptors {
            require("asset name", &d.name)?;
            if d.name.len() > MAX_METADATA_STR_LEN || !names.insert(d.name.as_str()) {
                return Err(TxError::Validation(format!("bad asset name {:?}", d.name)));
            }
        }
        let valid_to_ms = policy.expiry_slot.map(|s| network.slot_to_unix_ms(s));
        Ok(Self {
            policy,
            descriptors,
            payment,
            payer,
            overage,
            change_to,
            valid_to_ms,
        })
    }

    /// Return the whole payment to the payer, minting nothing.
    pub fn refund(network: Network, policy: MintPolicy, payment: Utxo, payer: impl Into<String>) -> Result<Self, TxError> {
        let payer = payer.into();
        Self::sale(network, policy, Vec::new(), payment, payer.clone(), Quantity::zero(), payer)
    }

    pub fn is_refund(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Assets minted by this sale, one unit each.
    pub fn minted(&self) -> AssetMap {
        self.descriptors
            .iter()
            .map(|d| (d.asset_id(&self.policy.id), Quantity::from(1u32)))
            .collect()
    }

    /// CIP-25 metadata: `{policy: {name: body}}`.
    pub fn nft_metadata(&self) -> Value {
        let mut assets = Map::new();
        for d in &self.descriptors {
            assets.insert(d.name.clone(), d.metadata.clone());
        }
        let mut by_policy = Map::new();
        by_policy.insert(self.policy.id.to_hex(), Value::Object(assets));
        Value::Object(by_policy)
    }

    fn lower(&self) -> Result<TxDraft, TxError> {
        let mut b = TxBuilder::new().collect_from(self.payment.clone());
        if !self.overage.is_zero() {
            b = b.pay_to(&self.payer, AssetMap::from_lovelace(self.overage.clone()));
        }
        if !self.is_refund() {
            let minted = self.minted();
            b = b
                .attach_script(self.policy.script.clone())
                .attach_metadata(NFT_METADATA_LABEL, self.nft_metadata())
                .mint(minted.clone())
                .pay_to(&self.payer, minted);
        }
        if let Some(ms) = self.valid_to_ms {
            b = b.valid_to(ms);
        }
        Ok(TxDraft::Declarative(b.change_to(&self.change_to).build()?))
    }
}

// =============================================================================
// Payment
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub address: String,
    #[serde(with = "quantity_str")]
    pub lovelace: Quantity,
}

/// Lovelace payments, optionally from pinned inputs with a receipt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub inputs: Vec<Utxo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PaymentPlan {
    pub fn new(payments: Vec<Payment>) -> Result<Self, TxError> {
        if payments.is_empty() {
            return Err(TxError::Validation("no payments".into()));
        }
        for p in &payments {
            require("payment address", &p.address)?;
            if p.lovelace.is_zero() {
                return Err(TxError::Validation(format!("zero payment to {}", p.address)));
            }
        }
        Ok(Self {
            payments,
            inputs: Vec::new(),
            message: None,
        })
    }

    pub fn with_inputs(mut self, inputs: Vec<Utxo>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.message = (!message.is_empty()).then_some(message);
        self
    }

    /// Parse `address,lovelace` lines. Blank lines are skipped.
    pub fn parse_csv(text: &str) -> Result<Vec<Payment>, TxError> {
        let mut out = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let bad = || TxError::Validation(format!("line {}: expected address,lovelace: {}", n + 1, line));
            let (address, amount) = line.split_once(',').ok_or_else(bad)?;
            let (address, amount) = (address.trim(), amount.trim());
            if address.is_empty() || amount.contains(',') {
                return Err(bad());
            }
            let lovelace = parse_quantity(amount).map_err(|_| bad())?;
            out.push(Payment {
                address: address.to_string(),
                lovelace,
            });
        }
        Ok(out)
    }

    fn lower(&self) -> Result<TxDraft, TxError> {
        let mut b = TxBuilder::new().collect_all(self.inputs.iter().cloned());
        if let Some(msg) = &self.message {
            b = b.attach_metadata(MESSAGE_METADATA_LABEL, json!({ "msg": message_chunks(msg) }));
        }
        for p in &self.payments {
            b = b.pay_to(&p.address, AssetMap::from_lovelace(p.lovelace.clone()));
        }
        Ok(TxDraft::Declarative(b.build()?))
    }
}

/// Split a message into pieces that fit a metadata string.
pub fn message_chunks(msg: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut cur = String::new();
    for c in msg.chars() {
        if cur.len() + c.len_utf8() > MAX_METADATA_STR_LEN {
            chunks.push(std::mem::take(&mut cur));
        }
        cur.push(c);
    }
    if !cur.is_empty() {
        chunks.push(cur);
    }
    chunks
}

// =============================================================================
// Voting
// =============================================================================

/// How long a cast ballot transaction stays valid (10 minutes).
pub const VOTE_WINDOW_MS: u64 = 10 * 60 * 1000;

/// An on-chain poll.
///
/// Both scripts are opaque. The ballot policy mints one ballot per voting
/// token sent back to its holder, only while polls are open, and only when
/// the ballots are locked at the counter. The counter releases outputs to
/// its owner's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    /// Tokens under this policy carry one vote each.
    pub reference_policy: PolicyId,
    pub ballot_policy: MintPolicy,
    pub counter_address: String,
    pub counter_script: Script,
    /// Key hash the counter requires to release ballots.
    pub owner_key_hash: String,
    /// Ballots can no longer be minted from here on, POSIX milliseconds.
    pub closes_ms: u64,
}

impl Poll {
    pub fn validate(&self) -> Result<(), TxError> {
        require("vote counter address", &self.counter_address)?;
        require("vote counter script", &self.counter_script.cbor)?;
        require("ballot policy script", &self.ballot_policy.script.cbor)?;
        if self.owner_key_hash.len() != 56 || hex::decode(&self.owner_key_hash).is_err() {
            return Err(TxError::Validation(format!("bad counter owner key hash {:?}", self.owner_key_hash)));
        }
        if self.ballot_policy.id == self.reference_policy {
            return Err(TxError::Validation("ballot policy must differ from the voting policy".into()));
        }
        Ok(())
    }

    /// The ballot minted for a voting token: same name, ballot policy.
    pub fn ballot_for(&self, reference: &AssetId) -> Option<AssetId> {
        (reference.policy() == Some(&self.reference_policy))
            .then(|| AssetId::native(self.ballot_policy.id, reference.name().to_vec()))
    }
}

/// Inline datum locked with a voter's ballots: a map of UTF-8 byte strings
/// `{"voter": address, "vote": choice}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDatum {
    pub voter: String,
    pub vote: String,
}

impl VoteDatum {
    pub fn to_data(&self) -> PlutusData {
        let text = |s: &str| PlutusData::bytes(s.as_bytes().to_vec());
        PlutusData::Map(vec![
            (text("voter"), text(&self.voter)),
            (text("vote"), text(&self.vote)),
        ])
    }

    pub fn from_data(data: &PlutusData) -> Result<Self, TxError> {
        let field = |key: &str| -> Result<String, TxError> {
            let bytes = data
                .lookup(key)
                .and_then(PlutusData::as_bytes)
                .ok_or_else(|| TxError::Validation(format!("vote datum has no {:?}", key)))?;
            String::from_utf8(bytes.to_vec()).map_err(|_| TxError::Validation(format!("vote datum {:?} is not text", key)))
        };
        Ok(Self {
            voter: field("voter")?,
            vote: field("vote")?,
        })
    }
}

/// A counter output holding ballots, with the vote it records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub utxo: Utxo,
    pub datum: VoteDatum,
    /// Ballot tokens of the poll in the output.
    pub ballots: AssetMap,
}

impl Ballot {
    /// Read a counter output. Outputs without ballots of `poll` yield
    /// `None`; an output with ballots but no readable inline datum is an error.
    pub fn from_utxo(poll: &Poll, utxo: Utxo) -> Result<Option<Self>, TxError> {
        let ballots: AssetMap = utxo
            .assets
            .native_assets()
            .filter(|(a, _)| a.policy() == Some(&poll.ballot_policy.id))
            .map(|(a, q)| (a.clone(), q.clone()))
            .collect();
        if ballots.is_empty() {
            return Ok(None);
        }
        let datum = utxo
            .datum
            .as_deref()
            .ok_or_else(|| TxError::Validation(format!("ballot output {} has no inline datum", utxo.out_ref)))?;
        let datum = VoteDatum::from_data(&PlutusData::from_hex(datum)?)?;
        Ok(Some(Self { utxo, datum, ballots }))
    }

    pub fn count(&self) -> Quantity {
        self.ballots.native_assets().map(|(_, q)| q).sum()
    }
}

/// Cast a vote: mint one ballot per voting token, lock the ballots at the
/// counter under a [`VoteDatum`], and send the voting tokens back to the voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotePlan {
    pub ballot_policy: MintPolicy,
    pub counter_address: String,
    pub datum: VoteDatum,
    /// Voting tokens returned to the voter, one unit each.
    pub reference: AssetMap,
    pub valid_to_ms: u64,
}

impl VotePlan {
    /// `voting_assets` is the voter's eligible holdings; anything outside
    /// the poll's voting policy is ignored.
    pub fn cast(
        poll: &Poll,
        voter: impl Into<String>,
        vote: impl Into<String>,
        voting_assets: &AssetMap,
        now_ms: u64,
    ) -> Result<Self, TxError> {
        poll.validate()?;
        let datum = VoteDatum {
            voter: voter.into(),
            vote: vote.into(),
        };
        require("voter address", &datum.voter)?;
        require("vote", &datum.vote)?;
        if now_ms >= poll.closes_ms {
            return Err(TxError::Validation("polls are closed".into()));
        }
        let reference: AssetMap = voting_assets
            .native_assets()
            .filter(|(a, _)| poll.ballot_for(a).is_some())
            .map(|(a, _)| (a.clone(), Quantity::from(1u32)))
            .collect();
        if reference.is_empty() {
            return Err(TxError::Validation(format!(
                "no voting tokens under {}",
                poll.reference_policy
            )));
        }
        Ok(Self {
            ballot_policy: poll.ballot_policy.clone(),
            counter_address: poll.counter_address.clone(),
            datum,
            reference,
            valid_to_ms: (now_ms + VOTE_WINDOW_MS).min(poll.closes_ms),
        })
    }

    /// Ballots minted by this vote, one per voting token.
    pub fn ballots(&self) -> AssetMap {
        self.reference
            .native_assets()
            .map(|(a, q)| (AssetId::native(self.ballot_policy.id, a.name().to_vec()), q.clone()))
            .collect()
    }

    fn lower(&self) -> Result<TxDraft, TxError> {
        let ballots = self.ballots();
        let b = TxBuilder::new()
            .attach_script(self.ballot_policy.script.clone())
            .mint(ballots.clone())
            .mint_redeemer(PlutusData::unit(0))
            .pay_to_with_datum(&self.counter_address, ballots, &self.datum.to_data().to_cbor())
            .pay_to(&self.datum.voter, self.reference.clone())
            .valid_to(self.valid_to_ms)
            .change_to(&self.datum.voter);
        Ok(TxDraft::Declarative(b.build()?))
    }
}

/// Redeem a poll: spend every ballot output at the counter and repay each
/// voter their ballots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyPlan {
    pub counter_script: Script,
    pub owner_key_hash: String,
    pub ballots: Vec<Ballot>,
    pub change_to: String,
}

impl TallyPlan {
    pub fn new(poll: &Poll, ballots: Vec<Ballot>, change_to: impl Into<String>) -> Result<Self, TxError> {
        poll.validate()?;
        let change_to = change_to.into();
        require("change address", &change_to)?;
        if ballots.is_empty() {
            return Err(TxError::Validation("no ballots at the vote counter".into()));
        }
        for ballot in &ballots {
            if ballot.ballots.native_assets().any(|(a, _)| a.policy() != Some(&poll.ballot_policy.id)) {
                return Err(TxError::Validation(format!(
                    "output {} holds tokens outside the ballot policy",
                    ballot.utxo.out_ref
                )));
            }
        }
        Ok(Self {
            counter_script: poll.counter_script.clone(),
            owner_key_hash: poll.owner_key_hash.clone(),
            ballots,
            change_to,
        })
    }

    /// Ballots owed back to each voter.
    pub fn repayments(&self) -> BTreeMap<&str, AssetMap> {
        let mut owed: BTreeMap<&str, AssetMap> = BTreeMap::new();
        for ballot in &self.ballots {
            owed.entry(ballot.datum.voter.as_str()).or_default().merge(&ballot.ballots);
        }
        owed
    }

    /// Ballot count per vote choice.
    pub fn results(&self) -> BTreeMap<&str, Quantity> {
        let mut counts: BTreeMap<&str, Quantity> = BTreeMap::new();
        for ballot in &self.ballots {
            *counts.entry(ballot.datum.vote.as_str()).or_default() += ballot.count();
        }
        counts
    }

    fn lower(&self) -> Result<TxDraft, TxError> {
        let mut b = TxBuilder::new()
            .attach_script(self.counter_script.clone())
            .add_signer(&self.owner_key_hash)
            .change_to(&self.change_to);
        for ballot in &self.ballots {
            b = b.collect_with(ballot.utxo.clone(), &PlutusData::unit(0), None);
        }
        for (voter, ballots) in self.repayments() {
            b = b.pay_to(voter, ballots);
        }
        Ok(TxDraft::Declarative(b.build()?))
    }
}

// =============================================================================
// Plan
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "plan", rename_all = "snake_case")]
pub enum TxPlan {
    Fee(FeePlan),
    Split(SplitPlan),
    Listing(ListingPlan),
    Purchase(PurchasePlan),
    Mint(MintPlan),
    Payment(PaymentPlan),
    Vote(VotePlan),
    Tally(TallyPlan),
}

impl TxPlan {
    pub fn kind(&self) -> &'static str {
        match self {
            TxPlan::Fee(_) => "fee",
            TxPlan::Split(_) => "split",
            TxPlan::Listing(l) if l.action.is_list() => "list",
            TxPlan::Listing(_) => "delist",
            TxPlan::Purchase(_) => "purchase",
            TxPlan::Mint(m) if m.is_refund() => "refund",
            TxPlan::Mint(_) => "mint",
            TxPlan::Payment(_) => "payment",
            TxPlan::Vote(_) => "vote",
            TxPlan::Tally(_) => "tally",
        }
    }

    pub fn lower(&self) -> Result<TxDraft, TxError> {
        match self {
            TxPlan::Fee(p) => p.lower(),
            TxPlan::Split(p) => p.lower(),
            TxPlan::Listing(p) => Ok(TxDraft::Prebuilt(p.descriptor.clone())),
            TxPlan::Purchase(p) => p.lower(),
            TxPlan::Mint(p) => p.lower(),
            TxPlan::Payment(p) => p.lower(),
            TxPlan::Vote(p) => p.lower(),
            TxPlan::Tally(p) => p.lower(),
        }
    }
}

impl From<FeePlan> for TxPlan {
    fn from(p: FeePlan) -> Self {
        TxPlan::Fee(p)
    }
}

impl From<SplitPlan> for TxPlan {
    fn from(p: SplitPlan) -> Self {
        TxPlan::Split(p)
    }
}

impl From<ListingPlan> for TxPlan {
    fn from(p: ListingPlan) -> Self {
        TxPlan::Listing(p)
    }
}

impl From<PurchasePlan> for TxPlan {
    fn from(p: PurchasePlan) -> Self {
        TxPlan::Purchase(p)
    }
}

impl From<MintPlan> for TxPlan {
    fn from(p: MintPlan) -> Self {
        TxPlan::Mint(p)
    }
}

impl From<PaymentPlan> for TxPlan {
    fn from(p: PaymentPlan) -> Self {
        TxPlan::Payment(p)
    }
}

impl From<VotePlan> for TxPlan {
    fn from(p: VotePlan) -> Self {
        TxPlan::Vote(p)
    }
}

impl From<TallyPlan> for TxPlan {
    fn from(p: TallyPlan) -> Self {
        TxPlan::Tally(p)
    }
}
