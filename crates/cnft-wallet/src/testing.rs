//! In-memory collaborators for unit tests.
//!
//! `FakeWallet` doubles as a tiny ledger: `FakeTx` applies each submitted
//! declarative draft to it, spending pinned inputs and creating outputs at
//! the wallet's address under the returned hash.

use crate::backend::*;
use crate::context::Context;
use crate::settle::SettleConfig;
use async_trait::async_trait;
use cnft_rpc::indexer::TxUtxos;
use cnft_rpc::marketplace::TokenListing;
use cnft_rpc::RpcError;
use cnft_tx::{TxDescriptor, TxDraft};
use cnft_types::{AssetId, AssetMap, Network, OutputRef, PolicyId, Quantity, Utxo};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SELF_ADDR: &str = "addr_test1qself";

pub fn hash(n: u64) -> String {
    format!("{:064x}", n)
}

pub fn policy(b: u8) -> PolicyId {
    PolicyId::from_bytes([b; 28])
}

pub fn asset(b: u8, name: &str) -> AssetId {
    AssetId::native(policy(b), name.as_bytes().to_vec())
}

pub fn utxo(tx: u64, index: u32, address: &str, assets: AssetMap) -> Utxo {
    let mut u = Utxo::new(OutputRef::new(hash(tx), index), address, assets);
    u.cbor = Some(format!("82{:02x}", index));
    u
}

// =============================================================================
// Wallet
// =============================================================================

pub struct FakeWallet {
    pub network_id: u8,
    pub utxos: Mutex<Vec<Utxo>>,
    pub collateral: Mutex<Vec<Utxo>>,
    pub fail_utxos: Mutex<bool>,
}

impl FakeWallet {
    pub fn new(utxos: Vec<Utxo>) -> Arc<Self> {
        Arc::new(Self {
            network_id: 0,
            utxos: Mutex::new(utxos),
            collateral: Mutex::new(vec![utxo(900, 0, SELF_ADDR, AssetMap::from_lovelace(5_000_000u64))]),
            fail_utxos: Mutex::new(false),
        })
    }

    pub fn holdings(&self) -> Vec<Utxo> {
        self.utxos.lock().unwrap().clone()
    }

    fn apply(&self, tx_hash: &str, draft: &TxDraft) {
        let TxDraft::Declarative(desc) = draft else {
            return;
        };
        let mut utxos = self.utxos.lock().unwrap();
        let spent: BTreeSet<_> = desc.inputs.iter().map(|i| i.utxo.out_ref.clone()).collect();
        utxos.retain(|u| !spent.contains(&u.out_ref));
        for (i, out) in desc.outputs.iter().enumerate() {
            if out.address == SELF_ADDR {
                let mut u = Utxo::new(OutputRef::new(tx_hash, i as u32), SELF_ADDR, out.assets.clone());
                u.cbor = Some(format!("82{:02x}", i));
                utxos.push(u);
            }
        }
    }
}

#[async_trait]
impl WalletBackend for FakeWallet {
    async fn network_id(&self) -> Result<u8, BackendError> {
        Ok(self.network_id)
    }

    async fn utxos(&self) -> Result<Vec<Utxo>, BackendError> {
        if *self.fail_utxos.lock().unwrap() {
            return Err(BackendError::Unavailable("wallet locked".into()));
        }
        Ok(self.holdings())
    }

    async fn collateral(&self) -> Result<Vec<Utxo>, BackendError> {
        Ok(self.collateral.lock().unwrap().clone())
    }

    async fn change_address(&self) -> Result<String, BackendError> {
        Ok(SELF_ADDR.to_string())
    }

    async fn reward_address(&self) -> Result<Option<String>, BackendError> {
        Ok(Some("stake_test1uself".to_string()))
    }
}

// =============================================================================
// Transaction Library
// =============================================================================

#[derive(Default)]
pub struct FakeTx {
    pub ledger: Option<Arc<FakeWallet>>,
    /// Scripted submit responses; a fresh hash is minted when empty.
    pub responses: Mutex<VecDeque<Result<String, BackendError>>>,
    pub submitted: Mutex<Vec<(String, TxDraft)>>,
    pub signed_by: Mutex<Vec<Signer>>,
    pub finalize_error: Mutex<Option<BackendError>>,
    counter: Mutex<u64>,
}

impl FakeTx {
    pub fn with_ledger(ledger: Arc<FakeWallet>) -> Arc<Self> {
        Arc::new(Self {
            ledger: Some(ledger),
            ..Default::default()
        })
    }

    pub fn respond(&self, r: Result<String, BackendError>) {
        self.responses.lock().unwrap().push_back(r);
    }

    pub fn submitted_kinds(&self) -> Vec<String> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|(_, d)| match d {
                TxDraft::Declarative(_) => "declarative".to_string(),
                TxDraft::Prebuilt(p) => format!("prebuilt:{}", p.cbor),
            })
            .collect()
    }
}

#[async_trait]
impl TxBackend for FakeTx {
    async fn finalize(&self, draft: &TxDraft) -> Result<UnsignedTx, BackendError> {
        if let Some(e) = self.finalize_error.lock().unwrap().clone() {
            return Err(e);
        }
        let body = serde_json::to_vec(draft).map_err(|e| BackendError::Malformed(e.to_string()))?;
        Ok(UnsignedTx { body })
    }

    async fn sign(&self, tx: &UnsignedTx, signer: &Signer) -> Result<Witness, BackendError> {
        self.signed_by.lock().unwrap().push(signer.clone());
        let who = match signer {
            Signer::Wallet => "wallet".to_string(),
            Signer::Key(k) if k == "decline" => return Err(BackendError::Declined("user declined".into())),
            Signer::Key(k) => k.clone(),
        };
        Ok(Witness {
            cbor: format!("{}:{}", who, tx.body.len()),
        })
    }

    async fn assemble(&self, tx: &UnsignedTx, witnesses: &[Witness]) -> Result<SignedTx, BackendError> {
        let ws: Vec<_> = witnesses.iter().map(|w| w.cbor.clone()).collect();
        Ok(SignedTx {
            cbor: format!("{}|{}", tx.body_hex(), ws.join(",")),
        })
    }

    async fn submit(&self, tx: &SignedTx) -> Result<String, BackendError> {
        let body_hex = tx.cbor.split('|').next().unwrap_or_default();
        let body = hex::decode(body_hex).map_err(|e| BackendError::Malformed(e.to_string()))?;
        let draft: TxDraft = serde_json::from_slice(&body).map_err(|e| BackendError::Malformed(e.to_string()))?;

        let scripted = self.responses.lock().unwrap().pop_front();
        let returned = match scripted {
            Some(r) => r?,
            None => {
                let mut c = self.counter.lock().unwrap();
                *c += 1;
                hash(0x1000 + *c)
            }
        };
        if returned.len() == 64 {
            if let Some(ledger) = &self.ledger {
                ledger.apply(&returned, &draft);
            }
        }
        self.submitted.lock().unwrap().push((returned.clone(), draft));
        Ok(returned)
    }
}

// =============================================================================
// Indexer
// =============================================================================

pub struct FakeIndexer {
    pub network: Network,
    pub at: Mutex<BTreeMap<String, Vec<Utxo>>>,
    pub payers: Mutex<BTreeMap<String, String>>,
    pub settled: Mutex<BTreeSet<String>>,
    pub tx_utxos: Mutex<BTreeMap<String, TxUtxos>>,
    pub accounts: Mutex<BTreeMap<String, String>>,
    pub fail: Mutex<bool>,
}

impl FakeIndexer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            network: Network::Preprod,
            at: Mutex::new(BTreeMap::new()),
            payers: Mutex::new(BTreeMap::new()),
            settled: Mutex::new(BTreeSet::new()),
            tx_utxos: Mutex::new(BTreeMap::new()),
            accounts: Mutex::new(BTreeMap::new()),
            fail: Mutex::new(false),
        })
    }

    fn check(&self) -> Result<(), RpcError> {
        if *self.fail.lock().unwrap() {
            return Err(RpcError::Other("indexer down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Indexer for FakeIndexer {
    fn network(&self) -> Network {
        self.network
    }

    async fn utxos_at(&self, address: &str) -> Result<Vec<Utxo>, RpcError> {
        self.check()?;
        Ok(self.at.lock().unwrap().get(address).cloned().unwrap_or_default())
    }

    async fn payer_of(&self, tx_hash: &str) -> Result<String, RpcError> {
        self.check()?;
        self.payers
            .lock()
            .unwrap()
            .get(tx_hash)
            .cloned()
            .ok_or(RpcError::NoResult {
                context: format!("payer_of({})", tx_hash),
            })
    }

    async fn tx_settled(&self, tx_hash: &str) -> Result<bool, RpcError> {
        self.check()?;
        Ok(self.settled.lock().unwrap().contains(tx_hash))
    }

    async fn tx_utxos(&self, tx_hash: &str) -> Result<TxUtxos, RpcError> {
        self.check()?;
        self.tx_utxos
            .lock()
            .unwrap()
            .get(tx_hash)
            .cloned()
            .ok_or(RpcError::NotFound {
                context: tx_hash.to_string(),
            })
    }

    async fn account_of(&self, address: &str) -> Result<String, RpcError> {
        self.check()?;
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_else(|| address.to_string()))
    }

    async fn account_addresses(&self, stake_address: &str) -> Result<Vec<String>, RpcError> {
        self.check()?;
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| s.as_str() == stake_address)
            .map(|(a, _)| a.clone())
            .collect())
    }

    async fn transactions_of(&self, address: &str) -> Result<Vec<String>, RpcError> {
        self.check()?;
        Ok(self
            .tx_utxos
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| t.inputs.iter().chain(&t.outputs).any(|io| io.address == address))
            .map(|(h, _)| h.clone())
            .collect())
    }
}

// =============================================================================
// Marketplace
// =============================================================================

#[derive(Default)]
pub struct FakeMarketplace {
    pub built: Mutex<Vec<String>>,
    pub healed: Mutex<Vec<AssetId>>,
    pub fail_build: Mutex<bool>,
    pub listings: Mutex<BTreeMap<String, Vec<TokenListing>>>,
}

#[async_trait]
impl Marketplace for FakeMarketplace {
    async fn build_listing(
        &self,
        asset: &AssetId,
        price: &Quantity,
        _collateral: &Utxo,
        input: &Utxo,
        _address: &str,
        _stake_address: &str,
    ) -> Result<TxDescriptor, RpcError> {
        if *self.fail_build.lock().unwrap() {
            return Err(RpcError::Other("build refused".into()));
        }
        self.built.lock().unwrap().push(format!("sell {} {} from {}", asset.unit(), price, input.out_ref));
        Ok(TxDescriptor {
            cbor: format!("84a5{:02x}", input.out_ref.index),
        })
    }

    async fn build_delisting(
        &self,
        listing_id: u64,
        _collateral: &Utxo,
        input: &Utxo,
        _address: &str,
        _stake_address: &str,
    ) -> Result<TxDescriptor, RpcError> {
        self.built.lock().unwrap().push(format!("delist {} from {}", listing_id, input.out_ref));
        Ok(TxDescriptor {
            cbor: format!("84a6{:02x}", input.out_ref.index),
        })
    }

    async fn heal(&self, asset: &AssetId) -> Result<(), RpcError> {
        self.healed.lock().unwrap().push(asset.clone());
        Ok(())
    }

    async fn search_listings(
        &self,
        policy_id: &str,
        _traits: &serde_json::Value,
        size: u32,
    ) -> Result<Vec<TokenListing>, RpcError> {
        let all = self.listings.lock().unwrap().get(policy_id).cloned().unwrap_or_default();
        Ok(all.into_iter().take(size as usize).collect())
    }
}

/// Context over fakes, polling every second up to three times.
pub async fn context(wallet: Arc<FakeWallet>, tx: Arc<FakeTx>, indexer: Arc<FakeIndexer>) -> Context {
    Context::connect(wallet, tx, indexer)
        .await
        .unwrap()
        .with_settle_config(SettleConfig {
            poll_interval: Duration::from_secs(1),
            max_attempts: 3,
            ..Default::default()
        })
}
