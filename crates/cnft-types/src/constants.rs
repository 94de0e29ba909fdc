//! Cardano network constants, indexer endpoints, and slot arithmetic.
//!
//! Reference: Shelley genesis parameters per network, CIP-25 and CIP-20.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

// =============================================================================
// Ledger Constants
// =============================================================================

/// Lovelace per ADA.
pub const LOVELACE_PER_ADA: u64 = 1_000_000;

/// Length of a transaction hash in hex characters (32-byte blake2b digest).
pub const TX_HASH_LENGTH: usize = 64;

/// Length of a minting policy id in bytes.
pub const POLICY_ID_BYTES: usize = 28;

/// Longest string the ledger accepts inside transaction metadata.
pub const MAX_METADATA_STR_LEN: usize = 64;

/// CIP-25 NFT metadata label.
pub const NFT_METADATA_LABEL: u64 = 721;

/// CIP-20 transaction message label.
pub const MESSAGE_METADATA_LABEL: u64 = 674;

// =============================================================================
// Network Types
// =============================================================================

/// Network type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Preprod,
    Preview,
}

/// Parameters for converting between slots and POSIX time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotConfig {
    /// POSIX milliseconds of `zero_slot`.
    pub zero_time_ms: u64,
    /// First slot of the Shelley era on this network.
    pub zero_slot: u64,
    /// Slot length in milliseconds.
    pub slot_length_ms: u64,
}

impl Network {
    /// Network id as reported by a CIP-30 wallet (`getNetworkId`).
    pub fn network_id(&self) -> u8 {
        match self {
            Network::Mainnet => 1,
            Network::Preprod | Network::Preview => 0,
        }
    }

    /// Infer the network from an indexer project id.
    ///
    /// Project ids carry their network as a prefix (`mainnet...`,
    /// `preprod...`, `preview...`). Legacy `testnet...` keys map to preprod.
    pub fn from_project_id(project_id: &str) -> Option<Network> {
        if project_id.starts_with("mainnet") {
            Some(Network::Mainnet)
        } else if project_id.starts_with("preprod") || project_id.starts_with("testnet") {
            Some(Network::Preprod)
        } else if project_id.starts_with("preview") {
            Some(Network::Preview)
        } else {
            None
        }
    }

    /// Default indexer base URL.
    pub fn indexer_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://cardano-mainnet.blockfrost.io/api/v0",
            Network::Preprod => "https://cardano-preprod.blockfrost.io/api/v0",
            Network::Preview => "https://cardano-preview.blockfrost.io/api/v0",
        }
    }

    /// Bech32 prefix of reward (stake) addresses.
    pub fn stake_prefix(&self) -> &'static str {
        match self {
            Network::Mainnet => "stake1",
            Network::Preprod | Network::Preview => "stake_test1",
        }
    }

    pub fn slot_config(&self) -> SlotConfig {
        match self {
            Network::Mainnet => SlotConfig {
                zero_time_ms: 1_596_059_091_000,
                zero_slot: 4_492_800,
                slot_length_ms: 1000,
            },
            Network::Preprod => SlotConfig {
                zero_time_ms: 1_655_769_600_000,
                zero_slot: 86_400,
                slot_length_ms: 1000,
            },
            Network::Preview => SlotConfig {
                zero_time_ms: 1_666_656_000_000,
                zero_slot: 0,
                slot_length_ms: 1000,
            },
        }
    }

    /// POSIX milliseconds at the start of `slot`.
    pub fn slot_to_unix_ms(&self, slot: u64) -> u64 {
        let cfg = self.slot_config();
        cfg.zero_time_ms + slot.saturating_sub(cfg.zero_slot) * cfg.slot_length_ms
    }

    /// Slot containing the POSIX millisecond timestamp `unix_ms`.
    pub fn unix_ms_to_slot(&self, unix_ms: u64) -> u64 {
        let cfg = self.slot_config();
        cfg.zero_slot + unix_ms.saturating_sub(cfg.zero_time_ms) / cfg.slot_length_ms
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Preprod => write!(f, "preprod"),
            Network::Preview => write!(f, "preview"),
        }
    }
}

impl FromStr for Network {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, TypesError> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "preprod" | "testnet" => Ok(Network::Preprod),
            "preview" => Ok(Network::Preview),
            _ => Err(TypesError::UnknownNetwork(s.to_string())),
        }
    }
}
