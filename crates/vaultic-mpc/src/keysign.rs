//! Keysign coordination (C4).
//!
//! Same session choreography as keygen, minus the ceremony pair: join,
//! wait for the co-signing peers, commit the committee, then one signing
//! round per pre-sign hash. In fast mode the expected peer is the
//! Fast-Vault server, which joins once its sign endpoint has been
//! called.

use crate::cancel::{with_cancel, CancelToken};
use crate::fast_vault::{FastSignRequest, FastVaultClient};
use crate::poll::poll_until;
use crate::relay::RelayClient;
use crate::session::{MpcTimings, SessionParams};
use crate::tss::{KeysignInput, KeysignOutput, TssEngine};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use vaultic_core::{Error, Result, SignatureAlgorithm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeysignState {
    Init,
    Join,
    WaitPeers,
    Start,
    SignRound,
    Done,
}

/// How the co-signers are recruited.
#[derive(Debug, Clone)]
pub enum KeysignMode {
    /// Peers pair via QR and join through the relay on their own.
    Relay,
    /// The Fast-Vault server co-signs; it joins after `/vault/sign`.
    Fast { vault_password: String },
}

impl KeysignMode {
    pub fn is_fast(&self) -> bool {
        matches!(self, KeysignMode::Fast { .. })
    }
}

#[derive(Debug, Clone)]
pub struct KeysignRequest {
    pub params: SessionParams,
    pub mode: KeysignMode,
    pub algorithm: SignatureAlgorithm,
    /// Joint public key for `algorithm`.
    pub public_key: String,
    pub keyshare: String,
    /// Pre-sign hashes, one signing round each, in payload order.
    pub message_hashes: Vec<String>,
    /// Derivation path without hardened-segment quotes.
    pub chain_path: String,
}

/// Coordination milestones, reported as they happen. Percent mapping is
/// the orchestrator's business.
#[derive(Debug, Clone)]
pub enum KeysignPhase {
    Joined,
    PeersReady { participants: Vec<String> },
    Started { participants: Vec<String> },
    Signing { index: usize, total: usize },
    Signed { total: usize },
}

pub type PhaseObserver<'a> = &'a (dyn Fn(KeysignPhase) + Send + Sync);

pub struct KeysignCoordinator {
    relay: RelayClient,
    relay_url: String,
    fast_vault: FastVaultClient,
    engine: Arc<dyn TssEngine>,
    timings: MpcTimings,
}

impl KeysignCoordinator {
    pub fn new(
        relay: RelayClient,
        relay_url: impl Into<String>,
        fast_vault: FastVaultClient,
        engine: Arc<dyn TssEngine>,
        timings: MpcTimings,
    ) -> Self {
        Self {
            relay,
            relay_url: relay_url.into(),
            fast_vault,
            engine,
            timings,
        }
    }

    /// Run the keysign machine to completion. Returns one signature per
    /// message hash, keyed by hash.
    pub async fn run(
        &self,
        request: &KeysignRequest,
        cancel: &CancelToken,
        observer: PhaseObserver<'_>,
    ) -> Result<BTreeMap<String, KeysignOutput>> {
        let session_id = request.params.session_id.clone();
        match self.drive(request, cancel, observer).await {
            Ok(signatures) => Ok(signatures),
            Err(err) => {
                if let Err(cleanup) = self.relay.end_session(&session_id).await {
                    warn!(%session_id, error = %cleanup, "session cleanup failed");
                }
                Err(match err {
                    Error::Cancelled | Error::PeerTimeout | Error::SessionExpired => err,
                    Error::ServerRefused(cause) => Error::ServerRefused(cause),
                    Error::KeysignFailed(cause) => Error::KeysignFailed(cause),
                    other => Error::KeysignFailed(other.to_string()),
                })
            }
        }
    }

    async fn drive(
        &self,
        request: &KeysignRequest,
        cancel: &CancelToken,
        observer: PhaseObserver<'_>,
    ) -> Result<BTreeMap<String, KeysignOutput>> {
        let params = &request.params;
        let session_id = params.session_id.as_str();
        let local = params.local_party_id.as_str();

        if request.message_hashes.is_empty() {
            return Err(Error::InvalidInput("no message hashes to sign".into()));
        }

        self.transition(session_id, KeysignState::Init);
        if let KeysignMode::Fast { vault_password } = &request.mode {
            let sign_request = FastSignRequest {
                public_key: request.public_key.clone(),
                messages: request.message_hashes.clone(),
                session: params.session_id.clone(),
                hex_encryption_key: params.hex_encryption_key.clone(),
                derive_path: request.chain_path.clone(),
                is_ecdsa: request.algorithm == SignatureAlgorithm::Ecdsa,
                vault_password: vault_password.clone(),
            };
            let server_session =
                with_cancel(cancel, self.fast_vault.sign(&sign_request)).await?;
            if server_session != params.session_id {
                return Err(Error::ServerRefused(format!(
                    "server joined session {server_session}, expected {}",
                    params.session_id
                )));
            }
        }

        self.transition(session_id, KeysignState::Join);
        with_cancel(cancel, self.relay.join_session(session_id, local)).await?;
        observer(KeysignPhase::Joined);

        self.transition(session_id, KeysignState::WaitPeers);
        let devices = self.wait_for_peers(session_id, local, cancel).await?;
        observer(KeysignPhase::PeersReady {
            participants: devices.clone(),
        });

        self.transition(session_id, KeysignState::Start);
        with_cancel(cancel, self.relay.start_session(session_id, &devices)).await?;
        observer(KeysignPhase::Started {
            participants: devices.clone(),
        });

        self.transition(session_id, KeysignState::SignRound);
        let total = request.message_hashes.len();
        let mut signatures = BTreeMap::new();
        for (index, message) in request.message_hashes.iter().enumerate() {
            observer(KeysignPhase::Signing { index, total });
            let input = KeysignInput {
                keyshare: &request.keyshare,
                algorithm: request.algorithm,
                message,
                chain_path: &request.chain_path,
                local_party_id: local,
                peers: &devices,
                relay_url: &self.relay_url,
                session_id,
                hex_encryption_key: &params.hex_encryption_key,
                is_initiator: true,
            };
            let output = with_cancel(cancel, self.engine.keysign(input))
                .await
                .map_err(|err| match err {
                    Error::Cancelled => Error::Cancelled,
                    other => Error::KeysignFailed(format!("hash {index}: {other}")),
                })?;
            signatures.insert(message.clone(), output);
        }
        observer(KeysignPhase::Signed { total });

        self.transition(session_id, KeysignState::Done);
        Ok(signatures)
    }

    /// Identical timing to the keygen peer wait: one non-self
    /// participant unlocks the committee commit.
    async fn wait_for_peers(
        &self,
        session_id: &str,
        local: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<String>> {
        let peers = poll_until(
            self.timings.peer_poll_interval,
            self.timings.peer_wait_timeout,
            cancel,
            || async move {
                let participants = self.relay.participants(session_id).await?;
                let mut seen = std::collections::HashSet::new();
                let peers: Vec<String> = participants
                    .into_iter()
                    .filter(|p| p.as_str() != local && seen.insert(p.clone()))
                    .collect();
                Ok(if peers.is_empty() { None } else { Some(peers) })
            },
        )
        .await?;
        let mut devices = vec![local.to_string()];
        devices.extend(peers);
        info!(%session_id, committee = ?devices, "keysign committee assembled");
        Ok(devices)
    }

    fn transition(&self, session_id: &str, state: KeysignState) {
        info!(%session_id, ?state, "keysign state");
    }
}
