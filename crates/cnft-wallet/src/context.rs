//! Session context.
//!
//! Every operation receives its collaborators explicitly through a
//! [`Context`]; there is no ambient wallet or session state.

use crate::backend::{Indexer, Marketplace, MetadataStore, TxBackend, WalletBackend};
use crate::error::WalletError;
use crate::settle::{ConfirmVia, ConfirmationSource, Executor, IndexerStatus, SettleConfig, WalletUtxos};
use cnft_types::{LedgerSnapshot, Network};
use std::sync::Arc;

#[derive(Clone)]
pub struct Context {
    network: Network,
    pub wallet: Arc<dyn WalletBackend>,
    pub tx: Arc<dyn TxBackend>,
    pub indexer: Arc<dyn Indexer>,
    pub marketplace: Option<Arc<dyn Marketplace>>,
    pub storage: Option<Arc<dyn MetadataStore>>,
    pub settle: SettleConfig,
}

impl Context {
    /// Bind collaborators, refusing a wallet on a different network than
    /// the indexer. Nothing is planned before this check passes.
    pub async fn connect(
        wallet: Arc<dyn WalletBackend>,
        tx: Arc<dyn TxBackend>,
        indexer: Arc<dyn Indexer>,
    ) -> Result<Self, WalletError> {
        let network = indexer.network();
        let wallet_id = wallet.network_id().await?;
        if wallet_id != network.network_id() {
            return Err(WalletError::Config(format!(
                "wallet is on network id {} but the indexer key is for {}",
                wallet_id, network
            )));
        }
        log::info!("connected on {}", network);
        Ok(Self {
            network,
            wallet,
            tx,
            indexer,
            marketplace: None,
            storage: None,
            settle: SettleConfig::default(),
        })
    }

    pub fn with_marketplace(mut self, marketplace: Arc<dyn Marketplace>) -> Self {
        self.marketplace = Some(marketplace);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn MetadataStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_settle_config(mut self, settle: SettleConfig) -> Self {
        self.settle = settle;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn marketplace(&self) -> Result<&Arc<dyn Marketplace>, WalletError> {
        self.marketplace
            .as_ref()
            .ok_or_else(|| WalletError::Config("no marketplace configured".into()))
    }

    pub fn storage(&self) -> Result<&Arc<dyn MetadataStore>, WalletError> {
        self.storage
            .as_ref()
            .ok_or_else(|| WalletError::Config("no metadata storage configured".into()))
    }

    /// Fresh snapshot of the connected wallet.
    pub async fn snapshot(&self) -> Result<LedgerSnapshot, WalletError> {
        Ok(self.wallet.snapshot().await?)
    }

    pub fn confirmation_source(&self) -> Arc<dyn ConfirmationSource> {
        match self.settle.confirm_via {
            ConfirmVia::WalletUtxos => Arc::new(WalletUtxos(self.wallet.clone())),
            ConfirmVia::Indexer => Arc::new(IndexerStatus(self.indexer.clone())),
        }
    }

    pub fn executor(&self) -> Executor {
        Executor::new(self.tx.clone(), self.confirmation_source(), self.settle.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{FakeIndexer, FakeTx, FakeWallet};
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_network_mismatch_is_refused() {
        let mainnet_wallet = Arc::new(FakeWallet {
            network_id: 1,
            utxos: Mutex::new(Vec::new()),
            collateral: Mutex::new(Vec::new()),
            fail_utxos: Mutex::new(false),
        });
        let err = Context::connect(mainnet_wallet, Arc::new(FakeTx::default()), FakeIndexer::new())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_confirmation_source_follows_config() {
        let ctx = Context::connect(FakeWallet::new(Vec::new()), Arc::new(FakeTx::default()), FakeIndexer::new())
            .await
            .unwrap();
        assert_eq!(ctx.network(), Network::Preprod);
        assert!(ctx.marketplace().is_err());
        assert_eq!(ctx.settle.confirm_via, ConfirmVia::WalletUtxos);

        let ctx = ctx.with_settle_config(SettleConfig {
            confirm_via: ConfirmVia::Indexer,
            ..Default::default()
        });
        assert_eq!(ctx.executor().config().confirm_via, ConfirmVia::Indexer);
    }
}
