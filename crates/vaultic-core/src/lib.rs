//! Vaultic core: vault data model, `.vult` container codec, and
//! persistence for threshold-signed key material.
//!
//! Everything network- or protocol-shaped (relay, MPC coordination,
//! signing orchestration) lives in `vaultic-mpc`; this crate is the part
//! that must stay bit-compatible with the other SDKs sharing the
//! container format.

pub mod container;
pub mod crypto;
pub mod error;
pub mod password_cache;
pub mod proto;
pub mod storage;
pub mod store;
pub mod vault;

pub use error::{Error, Result};
pub use vault::{
    KeyShare, LibType, SignatureAlgorithm, Vault, VaultPublicKeys, VaultSecurity, VaultSummary,
};
