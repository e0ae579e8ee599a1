//! Wire messages of the `.vult` container.
//!
//! Declared in the shape `prost-build` emits so the encoding stays
//! bit-compatible with the other SDKs sharing this container format.
//! Field tags are frozen; additions must use fresh tags.

use crate::error::{Error, Result};
use crate::vault;
use chrono::{DateTime, TimeZone, Utc};
use prost::Message;

/// Outer container: `version` is 1, `vault` is the base64 of either the
/// inner [`Vault`] protobuf or its encrypted form, per `is_encrypted`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VaultContainer {
    #[prost(uint64, tag = "1")]
    pub version: u64,
    #[prost(string, tag = "2")]
    pub vault: ::prost::alloc::string::String,
    #[prost(bool, tag = "3")]
    pub is_encrypted: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Vault {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub public_key_ecdsa: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub public_key_eddsa: ::prost::alloc::string::String,
    #[prost(string, repeated, tag = "4")]
    pub signers: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// Milliseconds since the Unix epoch.
    #[prost(int64, tag = "5")]
    pub created_at: i64,
    #[prost(string, tag = "6")]
    pub hex_chain_code: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "7")]
    pub key_shares: ::prost::alloc::vec::Vec<KeyShare>,
    #[prost(string, tag = "8")]
    pub local_party_id: ::prost::alloc::string::String,
    #[prost(string, tag = "9")]
    pub reshare_prefix: ::prost::alloc::string::String,
    #[prost(enumeration = "LibType", tag = "10")]
    pub lib_type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyShare {
    #[prost(string, tag = "1")]
    pub public_key: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub keyshare: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum LibType {
    Gg20 = 0,
    Dkls = 1,
}

pub const CONTAINER_VERSION: u64 = 1;

pub fn encode_vault(vault: &vault::Vault) -> Vec<u8> {
    let message = Vault {
        name: vault.name.clone(),
        public_key_ecdsa: vault.public_keys.ecdsa.clone(),
        public_key_eddsa: vault.public_keys.eddsa.clone(),
        signers: vault.signers.clone(),
        created_at: vault.created_at.timestamp_millis(),
        hex_chain_code: vault.hex_chain_code.clone(),
        key_shares: vault
            .key_shares
            .iter()
            .map(|s| KeyShare {
                public_key: s.public_key.clone(),
                keyshare: s.keyshare.clone(),
            })
            .collect(),
        local_party_id: vault.local_party_id.clone(),
        reshare_prefix: vault.reshare_prefix.clone(),
        lib_type: match vault.lib_type {
            vault::LibType::Gg20 => LibType::Gg20 as i32,
            vault::LibType::Dkls => LibType::Dkls as i32,
        },
    };
    message.encode_to_vec()
}

pub fn decode_vault(bytes: &[u8]) -> Result<vault::Vault> {
    let message = Vault::decode(bytes)?;
    let created_at = millis_to_datetime(message.created_at)?;
    let lib_type = match LibType::try_from(message.lib_type) {
        Ok(LibType::Gg20) => vault::LibType::Gg20,
        Ok(LibType::Dkls) => vault::LibType::Dkls,
        Err(_) => return Err(Error::CorruptedData("unknown lib type".into())),
    };
    Ok(vault::Vault {
        name: message.name,
        public_keys: vault::VaultPublicKeys {
            ecdsa: message.public_key_ecdsa,
            eddsa: message.public_key_eddsa,
        },
        hex_chain_code: message.hex_chain_code,
        signers: message.signers,
        local_party_id: message.local_party_id,
        key_shares: message
            .key_shares
            .into_iter()
            .map(|s| vault::KeyShare {
                public_key: s.public_key,
                keyshare: s.keyshare,
            })
            .collect(),
        lib_type,
        reshare_prefix: message.reshare_prefix,
        created_at,
        is_backed_up: false,
        order: 0,
        last_modified: created_at,
    })
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| Error::CorruptedData("timestamp out of range".into()))
}
