//! Session parameters and protocol timings.

use std::time::Duration;
use uuid::Uuid;
use vaultic_core::crypto::random_hex_32;

/// Role prefix baked into generated party identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyRole {
    Client,
    Server,
    SdkParty,
}

impl PartyRole {
    pub fn prefix(&self) -> &'static str {
        match self {
            PartyRole::Client => "client",
            PartyRole::Server => "server",
            PartyRole::SdkParty => "sdk-party",
        }
    }
}

/// `<prefix>-<short random tag>`, unique enough to tell devices apart
/// within one committee.
pub fn generate_party_id(role: PartyRole) -> String {
    let tag: u16 = rand::random();
    format!("{}-{:04x}", role.prefix(), tag)
}

/// Everything the initiator mints for one keygen or keysign run.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub session_id: String,
    pub hex_encryption_key: String,
    /// Present only during keygen.
    pub hex_chain_code: Option<String>,
    pub local_party_id: String,
}

impl SessionParams {
    pub fn new_keygen(role: PartyRole) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            hex_encryption_key: random_hex_32(),
            hex_chain_code: Some(random_hex_32()),
            local_party_id: generate_party_id(role),
        }
    }

    pub fn new_keysign(role: PartyRole) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            hex_encryption_key: random_hex_32(),
            hex_chain_code: None,
            local_party_id: generate_party_id(role),
        }
    }
}

/// Coordination timings. Defaults match the relay's ~5 minute session
/// envelope; tests shrink them to milliseconds.
#[derive(Debug, Clone)]
pub struct MpcTimings {
    pub peer_poll_interval: Duration,
    pub peer_wait_timeout: Duration,
    pub complete_wait_timeout: Duration,
    pub keysign_timeout: Duration,
}

impl Default for MpcTimings {
    fn default() -> Self {
        Self {
            peer_poll_interval: Duration::from_secs(2),
            peer_wait_timeout: Duration::from_secs(30),
            complete_wait_timeout: Duration::from_secs(60),
            keysign_timeout: Duration::from_secs(120),
        }
    }
}
