//! Cardano NFT toolkit RPC client library.
//!
//! Provides async HTTP clients for the chain indexer (Blockfrost-compatible),
//! the marketplace transaction-build API, and content-addressed metadata
//! storage, sharing one retrying REST client.
//!
//! # Example
//!
//! ```ignore
//! use cnft_rpc::IndexerRpc;
//! use cnft_types::Network;
//!
//! #[tokio::main]
//! async fn main() {
//!     let indexer = IndexerRpc::new(Network::Preprod, "preprodXXXXXXXX");
//!     let utxos = indexer.utxos_at("addr_test1...").await.unwrap();
//!     println!("{} outputs", utxos.len());
//! }
//! ```

pub mod client;
pub mod error;
pub mod indexer;
pub mod marketplace;
pub mod storage;

pub use client::{Backoff, RpcClient, RpcConfig};
pub use error::RpcError;
pub use indexer::IndexerRpc;
pub use marketplace::MarketplaceRpc;
pub use storage::StorageRpc;
