//! Seam to the threshold-cryptography module (DKLS for ECDSA, Schnorr
//! for EdDSA).
//!
//! The engine drives its own round messaging against the relay URL it is
//! handed; the coordinator only sequences phases around it. One engine
//! value serves one operation at a time and is not reentrant across
//! concurrent sessions.

use async_trait::async_trait;
use vaultic_core::{Result, SignatureAlgorithm};

#[derive(Debug, Clone)]
pub struct KeygenInput<'a> {
    pub algorithm: SignatureAlgorithm,
    pub is_initiator: bool,
    pub relay_url: &'a str,
    pub session_id: &'a str,
    pub local_party_id: &'a str,
    pub committee: &'a [String],
    /// Non-empty only for reshares.
    pub old_committee: &'a [String],
    pub hex_encryption_key: &'a str,
    /// Followers pass the initiator's blob; the EdDSA run always reuses
    /// the DKLS one so both runs agree on committee ordering.
    pub setup_message: Option<&'a [u8]>,
}

#[derive(Debug, Clone)]
pub struct KeygenOutput {
    pub public_key: String,
    pub chain_code: String,
    pub keyshare: String,
}

#[derive(Debug, Clone)]
pub struct KeysignInput<'a> {
    pub keyshare: &'a str,
    pub algorithm: SignatureAlgorithm,
    /// Pre-sign hash, lowercase hex.
    pub message: &'a str,
    pub chain_path: &'a str,
    pub local_party_id: &'a str,
    pub peers: &'a [String],
    pub relay_url: &'a str,
    pub session_id: &'a str,
    pub hex_encryption_key: &'a str,
    pub is_initiator: bool,
}

#[derive(Debug, Clone)]
pub struct KeysignOutput {
    pub r: String,
    pub s: String,
    pub der_signature: String,
    pub recovery_id: Option<u8>,
}

#[async_trait]
pub trait TssEngine: Send + Sync {
    async fn start_keygen(&self, input: KeygenInput<'_>) -> Result<KeygenOutput>;

    /// The setup blob of the most recent DKLS keygen run.
    async fn setup_message(&self) -> Result<Vec<u8>>;

    async fn keysign(&self, input: KeysignInput<'_>) -> Result<KeysignOutput>;
}
