//! Signing orchestration (C5).
//!
//! Takes a vault and a chain-agnostic signing payload, picks the
//! algorithm and mode, drives the keysign coordinator, and assembles the
//! final signature value for the host chain.

use crate::cancel::CancelToken;
use crate::chain::{normalize_derivation_path, Chain, ChainModule, ChainTransaction};
use crate::keysign::{KeysignCoordinator, KeysignMode, KeysignPhase, KeysignRequest};
use crate::session::{MpcTimings, PartyRole, SessionParams};
use crate::tss::KeysignOutput;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use vaultic_core::password_cache::PasswordCache;
use vaultic_core::{Error, Result, SignatureAlgorithm, Vault, VaultSecurity};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningPayload {
    pub chain: Chain,
    pub transaction: ChainTransaction,
    /// Pre-sign hashes from the chain module, lowercase hex. One for
    /// account chains, one per input for UTXO chains.
    pub message_hashes: Vec<String>,
}

impl SigningPayload {
    /// Build a payload by asking the chain module for the pre-sign
    /// hashes of `transaction`.
    pub fn for_transaction(
        chains: &dyn ChainModule,
        chain: Chain,
        transaction: ChainTransaction,
    ) -> Result<Self> {
        let message_hashes = chains.pre_signing_hashes(chain, &transaction)?;
        Ok(Self {
            chain,
            transaction,
            message_hashes,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningMode {
    Fast,
    Relay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureFormat {
    #[serde(rename = "ECDSA")]
    Ecdsa,
    #[serde(rename = "EdDSA")]
    Eddsa,
    #[serde(rename = "DER")]
    Der,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignaturePart {
    pub r: String,
    pub s: String,
    pub der: String,
}

/// Chain-agnostic signing result handed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub signature: String,
    pub format: SignatureFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery: Option<u8>,
    /// Per-input signatures for UTXO chains, in input order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<SignaturePart>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningStep {
    Preparing,
    Coordinating,
    Signing,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct SigningProgress {
    pub step: SigningStep,
    pub percent: u8,
    pub mode: SigningMode,
    pub participant_count: usize,
    pub participants_ready: usize,
    pub message: String,
}

/// Pairing info surfaced to the UI in relay mode, rendered as a QR code
/// for the co-signing devices.
#[derive(Debug, Clone, Serialize)]
pub struct RelayPairing {
    pub session_id: String,
    pub hex_encryption_key: String,
    pub service_name: String,
    pub use_fast_vault: bool,
}

pub type ProgressFn = Arc<dyn Fn(SigningProgress) + Send + Sync>;
pub type PairingFn = Arc<dyn Fn(RelayPairing) + Send + Sync>;

#[derive(Clone, Default)]
pub struct SignOptions {
    /// Vault password; fast mode falls back to the password cache.
    pub password: Option<String>,
    /// Force a mode instead of deriving it from the vault.
    pub mode: Option<SigningMode>,
    /// Overall deadline; `MpcTimings::keysign_timeout` when unset.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
    pub on_progress: Option<ProgressFn>,
    pub on_pairing: Option<PairingFn>,
}

pub struct SigningOrchestrator {
    coordinator: KeysignCoordinator,
    chains: Arc<dyn ChainModule>,
    password_cache: Arc<PasswordCache>,
    timings: MpcTimings,
}

impl SigningOrchestrator {
    pub fn new(
        coordinator: KeysignCoordinator,
        chains: Arc<dyn ChainModule>,
        password_cache: Arc<PasswordCache>,
        timings: MpcTimings,
    ) -> Self {
        Self {
            coordinator,
            chains,
            password_cache,
            timings,
        }
    }

    pub async fn sign(
        &self,
        vault: &Vault,
        payload: &SigningPayload,
        options: &SignOptions,
    ) -> Result<Signature> {
        if payload.message_hashes.is_empty() {
            return Err(Error::InvalidInput("payload has no message hashes".into()));
        }

        let algorithm = payload.chain.kind().signature_algorithm();
        let key_share = vault
            .key_share(algorithm)
            .ok_or_else(|| Error::KeyShareMissing(algorithm.to_string()))?;

        let (mode, password) = self.resolve_mode(vault, options)?;
        let timeout = options.timeout.unwrap_or(self.timings.keysign_timeout);
        let cancel = options.cancel.clone().unwrap_or_else(CancelToken::never);

        let params = SessionParams::new_keysign(PartyRole::SdkParty);
        info!(
            vault_id = %vault.id(),
            chain = ?payload.chain,
            ?mode,
            hashes = payload.message_hashes.len(),
            "signing started"
        );

        let progress = ProgressReporter::new(options.on_progress.clone(), mode);
        progress.report(
            SigningStep::Preparing,
            0,
            0,
            0,
            "preparing signing session",
        );

        if mode == SigningMode::Relay {
            if let Some(on_pairing) = &options.on_pairing {
                on_pairing(RelayPairing {
                    session_id: params.session_id.clone(),
                    hex_encryption_key: params.hex_encryption_key.clone(),
                    service_name: params.local_party_id.clone(),
                    use_fast_vault: false,
                });
            }
        }

        let chain_path = normalize_derivation_path(&self.chains.derivation_path(payload.chain));
        let request = KeysignRequest {
            params,
            mode: match mode {
                SigningMode::Fast => KeysignMode::Fast {
                    vault_password: password
                        .as_ref()
                        .map(|p| p.to_string())
                        .unwrap_or_default(),
                },
                SigningMode::Relay => KeysignMode::Relay,
            },
            algorithm,
            public_key: key_share.public_key.clone(),
            keyshare: key_share.keyshare.clone(),
            message_hashes: payload.message_hashes.clone(),
            chain_path,
        };

        let observer = |phase: KeysignPhase| match phase {
            KeysignPhase::Joined => {
                progress.report(SigningStep::Coordinating, 30, 1, 1, "session joined");
            }
            KeysignPhase::PeersReady { participants } => {
                progress.report(
                    SigningStep::Coordinating,
                    50,
                    participants.len(),
                    participants.len(),
                    "co-signing peers discovered",
                );
            }
            KeysignPhase::Started { participants } => {
                progress.report(
                    SigningStep::Coordinating,
                    60,
                    participants.len(),
                    participants.len(),
                    "session started",
                );
            }
            KeysignPhase::Signing { index, .. } => {
                if index == 0 {
                    progress.report(SigningStep::Signing, 70, 0, 0, "signing in progress");
                }
            }
            KeysignPhase::Signed { .. } => {
                progress.report(SigningStep::Signing, 90, 0, 0, "signatures collected");
            }
        };

        let run = self.coordinator.run(&request, &cancel, &observer);
        let signatures = match tokio::time::timeout(timeout, run).await {
            Ok(outcome) => outcome?,
            Err(_) => return Err(Error::KeysignFailed("signing timed out".into())),
        };

        let signature = assemble_signature(payload, algorithm, &signatures)?;
        progress.report(SigningStep::Complete, 100, 0, 0, "signing complete");
        Ok(signature)
    }

    /// Fast mode needs a fast vault and a password (option or cache);
    /// everything else goes through the relay.
    fn resolve_mode(
        &self,
        vault: &Vault,
        options: &SignOptions,
    ) -> Result<(SigningMode, Option<Zeroizing<String>>)> {
        let cached = || self.password_cache.get(vault.id());
        let password = options
            .password
            .as_ref()
            .map(|p| Zeroizing::new(p.clone()))
            .or_else(cached);

        match options.mode {
            Some(SigningMode::Fast) => {
                if vault.security() != VaultSecurity::Fast {
                    return Err(Error::InvalidInput(
                        "fast signing requires a fast vault".into(),
                    ));
                }
                if password.is_none() {
                    return Err(Error::PasswordRequired);
                }
                Ok((SigningMode::Fast, password))
            }
            Some(SigningMode::Relay) => Ok((SigningMode::Relay, None)),
            None => {
                if vault.security() == VaultSecurity::Fast && password.is_some() {
                    Ok((SigningMode::Fast, password))
                } else {
                    Ok((SigningMode::Relay, None))
                }
            }
        }
    }
}

/// Keeps the reported percent monotonically non-decreasing no matter
/// how phases interleave.
struct ProgressReporter {
    callback: Option<ProgressFn>,
    mode: SigningMode,
    last_percent: Mutex<u8>,
}

impl ProgressReporter {
    fn new(callback: Option<ProgressFn>, mode: SigningMode) -> Self {
        Self {
            callback,
            mode,
            last_percent: Mutex::new(0),
        }
    }

    fn report(
        &self,
        step: SigningStep,
        percent: u8,
        participant_count: usize,
        participants_ready: usize,
        message: &str,
    ) {
        let Some(callback) = &self.callback else {
            return;
        };
        let mut last = self.last_percent.lock();
        let percent = (*last).max(percent);
        *last = percent;
        callback(SigningProgress {
            step,
            percent,
            mode: self.mode,
            participant_count,
            participants_ready,
            message: message.to_string(),
        });
    }
}

/// Collapse per-hash signatures into the chain-facing result. UTXO
/// chains get the full per-input array plus the first DER as the
/// headline signature; account chains get the single `r || s`.
fn assemble_signature(
    payload: &SigningPayload,
    algorithm: SignatureAlgorithm,
    signatures: &std::collections::BTreeMap<String, KeysignOutput>,
) -> Result<Signature> {
    let ordered: Vec<&KeysignOutput> = payload
        .message_hashes
        .iter()
        .map(|hash| {
            signatures
                .get(hash)
                .ok_or_else(|| Error::KeysignFailed(format!("no signature for hash {hash}")))
        })
        .collect::<Result<_>>()?;

    if payload.chain.kind().is_utxo() {
        let parts: Vec<SignaturePart> = ordered
            .iter()
            .map(|o| SignaturePart {
                r: o.r.clone(),
                s: o.s.clone(),
                der: o.der_signature.clone(),
            })
            .collect();
        return Ok(Signature {
            signature: parts[0].der.clone(),
            format: SignatureFormat::Der,
            recovery: None,
            signatures: Some(parts),
        });
    }

    if ordered.len() != 1 {
        return Err(Error::InvalidInput(
            "account chains sign exactly one message hash".into(),
        ));
    }
    let only = ordered[0];
    let format = match algorithm {
        SignatureAlgorithm::Ecdsa => SignatureFormat::Ecdsa,
        SignatureAlgorithm::Eddsa => SignatureFormat::Eddsa,
    };
    Ok(Signature {
        signature: format!("{}{}", only.r, only.s),
        format,
        recovery: only.recovery_id,
        signatures: None,
    })
}
