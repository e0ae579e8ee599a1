//! Chain-agnostic view of the host chains.
//!
//! Per-chain transaction encoding, address derivation and hashing live
//! in external chain modules; the core only needs the kind of each
//! chain, the signature algorithm that kind implies, and a tagged
//! transaction payload to hand through.

use serde::{Deserialize, Serialize};
use vaultic_core::{Result, SignatureAlgorithm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    Bitcoin,
    Litecoin,
    Dogecoin,
    Ethereum,
    BscChain,
    Polygon,
    Avalanche,
    Cosmos,
    Thorchain,
    Tron,
    Ripple,
    Solana,
    Sui,
    Polkadot,
    Ton,
    Cardano,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainKind {
    Evm,
    Utxo,
    Cosmos,
    Tron,
    Ripple,
    Solana,
    Sui,
    Polkadot,
    Ton,
    Cardano,
}

impl Chain {
    pub fn kind(&self) -> ChainKind {
        match self {
            Chain::Bitcoin | Chain::Litecoin | Chain::Dogecoin => ChainKind::Utxo,
            Chain::Ethereum | Chain::BscChain | Chain::Polygon | Chain::Avalanche => {
                ChainKind::Evm
            }
            Chain::Cosmos | Chain::Thorchain => ChainKind::Cosmos,
            Chain::Tron => ChainKind::Tron,
            Chain::Ripple => ChainKind::Ripple,
            Chain::Solana => ChainKind::Solana,
            Chain::Sui => ChainKind::Sui,
            Chain::Polkadot => ChainKind::Polkadot,
            Chain::Ton => ChainKind::Ton,
            Chain::Cardano => ChainKind::Cardano,
        }
    }
}

impl ChainKind {
    /// Fixed kind-to-algorithm mapping shared by every SDK.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            ChainKind::Evm
            | ChainKind::Utxo
            | ChainKind::Cosmos
            | ChainKind::Tron
            | ChainKind::Ripple => SignatureAlgorithm::Ecdsa,
            ChainKind::Solana
            | ChainKind::Sui
            | ChainKind::Polkadot
            | ChainKind::Ton
            | ChainKind::Cardano => SignatureAlgorithm::Eddsa,
        }
    }

    pub fn is_utxo(&self) -> bool {
        matches!(self, ChainKind::Utxo)
    }
}

/// Chain-specific transaction payload, opaque to the signing core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainTransaction {
    Evm { raw: Vec<u8> },
    Utxo { psbt_base64: String },
    Cosmos { sign_doc: Vec<u8> },
    Opaque { bytes: Vec<u8> },
}

/// External chain module contract: pure, deterministic, no I/O.
pub trait ChainModule: Send + Sync {
    fn pre_signing_hashes(&self, chain: Chain, transaction: &ChainTransaction)
        -> Result<Vec<String>>;

    /// BIP44-style path, possibly with hardened segments quoted
    /// (`m/44'/60'/0'/0/0`).
    fn derivation_path(&self, chain: Chain) -> String;
}

/// The MPC module wants paths without hardened-segment quotes.
pub fn normalize_derivation_path(path: &str) -> String {
    path.replace('\'', "")
}
