//! `.vult` container codec.
//!
//! Outer value: base64 of a `VaultContainer` protobuf. The container's
//! `vault` field is the base64 of either the inner `Vault` protobuf
//! (plaintext) or its password-sealed form (see [`crate::crypto`]).

use crate::crypto;
use crate::error::{Error, Result};
use crate::proto;
use crate::vault::Vault;
use base64::{engine::general_purpose, Engine as _};
use prost::Message;
use zeroize::Zeroizing;

/// Encode a vault into the on-wire `.vult` string. With a password the
/// inner payload is sealed; without one it is embedded in the clear.
pub fn encode(vault: &Vault, password: Option<&str>) -> Result<String> {
    let inner = Zeroizing::new(proto::encode_vault(vault));
    let (payload, is_encrypted) = match password {
        Some(password) => (crypto::seal(password, &inner)?, true),
        None => (inner.to_vec(), false),
    };
    let container = proto::VaultContainer {
        version: proto::CONTAINER_VERSION,
        vault: general_purpose::STANDARD.encode(payload),
        is_encrypted,
    };
    Ok(general_purpose::STANDARD.encode(container.encode_to_vec()))
}

/// Decode a `.vult` string back into a vault.
pub fn decode(content: &str, password: Option<&str>) -> Result<Vault> {
    let container = parse_container(content)?;
    let payload = general_purpose::STANDARD
        .decode(container.vault.trim())
        .map_err(|e| Error::CorruptedData(format!("inner base64: {e}")))?;

    let vault = if container.is_encrypted {
        let password = password.ok_or(Error::PasswordRequired)?;
        let plaintext = crypto::open(password, &payload)?;
        proto::decode_vault(&plaintext)?
    } else {
        proto::decode_vault(&payload)?
    };
    vault.validate()?;
    Ok(vault)
}

/// Whether the container is password-protected. Parses only the outer
/// layer, never the vault payload.
pub fn is_encrypted(content: &str) -> Result<bool> {
    Ok(parse_container(content)?.is_encrypted)
}

fn parse_container(content: &str) -> Result<proto::VaultContainer> {
    let bytes = general_purpose::STANDARD
        .decode(content.trim())
        .map_err(|e| Error::CorruptedData(format!("outer base64: {e}")))?;
    let container = proto::VaultContainer::decode(bytes.as_slice())
        .map_err(|e| Error::CorruptedData(format!("container: {e}")))?;
    if container.version != proto::CONTAINER_VERSION {
        return Err(Error::CorruptedData(format!(
            "unsupported container version {}",
            container.version
        )));
    }
    Ok(container)
}
