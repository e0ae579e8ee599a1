use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 50;

/// Signer-id prefix that marks a share held by a cooperating server.
pub const SERVER_SIGNER_PREFIX: &str = "Server-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Ecdsa,
    Eddsa,
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureAlgorithm::Ecdsa => write!(f, "ecdsa"),
            SignatureAlgorithm::Eddsa => write!(f, "eddsa"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LibType {
    Gg20,
    Dkls,
}

/// Derived security class of a vault, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultSecurity {
    Fast,
    Secure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultPublicKeys {
    pub ecdsa: String,
    pub eddsa: String,
}

/// One party's share of one threshold key, bound to the joint public key
/// it reconstructs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    pub public_key: String,
    pub keyshare: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub name: String,
    pub public_keys: VaultPublicKeys,
    pub hex_chain_code: String,
    pub signers: Vec<String>,
    pub local_party_id: String,
    pub key_shares: Vec<KeyShare>,
    pub lib_type: LibType,
    #[serde(default)]
    pub reshare_prefix: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_backed_up: bool,
    #[serde(default)]
    pub order: i64,
    pub last_modified: DateTime<Utc>,
}

/// Listing row: everything the UI needs, no key material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSummary {
    pub id: String,
    pub name: String,
    pub security: VaultSecurity,
    pub signer_count: usize,
    pub threshold: usize,
    pub is_backed_up: bool,
    pub created_at: DateTime<Utc>,
}

impl Vault {
    /// Primary identity: the compressed ECDSA public key, lowercase hex.
    pub fn id(&self) -> &str {
        &self.public_keys.ecdsa
    }

    /// A vault is `fast` iff any signer's share is held by a server.
    pub fn security(&self) -> VaultSecurity {
        if self
            .signers
            .iter()
            .any(|s| s.starts_with(SERVER_SIGNER_PREFIX))
        {
            VaultSecurity::Fast
        } else {
            VaultSecurity::Secure
        }
    }

    /// Signing threshold: majority of n+1 for committees larger than two,
    /// otherwise both parties.
    pub fn threshold(&self) -> usize {
        let n = self.signers.len();
        if n > 2 {
            (n + 2) / 2
        } else {
            2
        }
    }

    pub fn key_share(&self, algorithm: SignatureAlgorithm) -> Option<&KeyShare> {
        let public_key = match algorithm {
            SignatureAlgorithm::Ecdsa => &self.public_keys.ecdsa,
            SignatureAlgorithm::Eddsa => &self.public_keys.eddsa,
        };
        self.key_shares.iter().find(|s| &s.public_key == public_key)
    }

    pub fn summary(&self) -> VaultSummary {
        VaultSummary {
            id: self.id().to_string(),
            name: self.name.clone(),
            security: self.security(),
            signer_count: self.signers.len(),
            threshold: self.threshold(),
            is_backed_up: self.is_backed_up,
            created_at: self.created_at,
        }
    }

    /// Enforce the structural invariants every imported or freshly
    /// generated vault must satisfy.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        let id = hex::decode(&self.public_keys.ecdsa)
            .map_err(|_| Error::InvalidInput("ecdsa public key is not hex".into()))?;
        if id.len() != 33 {
            return Err(Error::InvalidInput(
                "ecdsa public key must be 33 bytes compressed".into(),
            ));
        }
        if self.public_keys.ecdsa != self.public_keys.ecdsa.to_lowercase() {
            return Err(Error::InvalidInput(
                "vault id must be lowercase hex".into(),
            ));
        }
        if self.public_keys.eddsa.is_empty() {
            return Err(Error::InvalidInput("eddsa public key missing".into()));
        }
        let chain_code = hex::decode(&self.hex_chain_code)
            .map_err(|_| Error::InvalidInput("chain code is not hex".into()))?;
        if chain_code.len() != 32 {
            return Err(Error::InvalidInput("chain code must be 32 bytes".into()));
        }
        if self.signers.len() < 2 {
            return Err(Error::InvalidInput("vault needs at least 2 signers".into()));
        }
        if !self.signers.contains(&self.local_party_id) {
            return Err(Error::InvalidInput(
                "local party is not among the signers".into(),
            ));
        }
        for algorithm in [SignatureAlgorithm::Ecdsa, SignatureAlgorithm::Eddsa] {
            if self.key_share(algorithm).is_none() {
                return Err(Error::KeyShareMissing(algorithm.to_string()));
            }
        }
        Ok(())
    }
}

/// 2..=50 chars, letters/digits/space/`-`/`_`.
pub fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(Error::InvalidInput(format!(
            "vault name must be {MIN_NAME_LEN}..{MAX_NAME_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '_')
    {
        return Err(Error::InvalidInput(
            "vault name may only contain letters, digits, spaces, '-' and '_'".into(),
        ));
    }
    Ok(())
}
