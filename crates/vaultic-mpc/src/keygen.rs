//! Keygen coordination (C4).
//!
//! The initiator mints the session, waits for peers, commits the
//! committee, then runs the DKLS (ECDSA) and Schnorr (EdDSA) ceremonies
//! back to back. The Schnorr run reuses the DKLS setup message so every
//! party sees the same committee ordering. Followers mirror the machine,
//! taking the setup message from the relay instead of producing it.

use crate::cancel::{with_cancel, CancelToken};
use crate::poll::poll_until;
use crate::relay::RelayClient;
use crate::session::{MpcTimings, SessionParams};
use crate::tss::{KeygenInput, KeygenOutput, TssEngine};
use std::sync::Arc;
use tracing::{info, warn};
use vaultic_core::{Error, Result, SignatureAlgorithm};

const KEYGEN_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeygenState {
    Init,
    Join,
    WaitPeers,
    Start,
    KeygenEcdsa,
    KeygenEddsa,
    SignalComplete,
    WaitAllComplete,
    Done,
}

#[derive(Debug, Clone)]
pub struct KeygenRequest {
    pub params: SessionParams,
    pub is_initiator: bool,
    /// For reshares; empty on fresh keygen.
    pub old_committee: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct KeygenOutcome {
    /// Committee in committed order, local party first.
    pub devices: Vec<String>,
    pub ecdsa: KeygenOutput,
    pub eddsa: KeygenOutput,
}

pub struct KeygenCoordinator {
    relay: RelayClient,
    relay_url: String,
    engine: Arc<dyn TssEngine>,
    timings: MpcTimings,
}

impl KeygenCoordinator {
    pub fn new(
        relay: RelayClient,
        relay_url: impl Into<String>,
        engine: Arc<dyn TssEngine>,
        timings: MpcTimings,
    ) -> Self {
        Self {
            relay,
            relay_url: relay_url.into(),
            engine,
            timings,
        }
    }

    pub async fn run(&self, request: &KeygenRequest, cancel: &CancelToken) -> Result<KeygenOutcome> {
        let session_id = request.params.session_id.clone();
        match self.drive(request, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // Past JOIN the session may hold half-joined peers.
                if let Err(cleanup) = self.relay.end_session(&session_id).await {
                    warn!(%session_id, error = %cleanup, "session cleanup failed");
                }
                Err(match err {
                    Error::Cancelled | Error::PeerTimeout | Error::SessionExpired => err,
                    Error::KeygenFailed(cause) => Error::KeygenFailed(cause),
                    other => Error::KeygenFailed(other.to_string()),
                })
            }
        }
    }

    async fn drive(&self, request: &KeygenRequest, cancel: &CancelToken) -> Result<KeygenOutcome> {
        let params = &request.params;
        let session_id = params.session_id.as_str();
        let local = params.local_party_id.as_str();

        self.transition(session_id, KeygenState::Init);
        self.transition(session_id, KeygenState::Join);
        with_cancel(cancel, self.relay.join_session(session_id, local)).await?;

        self.transition(session_id, KeygenState::WaitPeers);
        let devices = self.wait_for_peers(session_id, local, cancel).await?;
        info!(%session_id, committee = ?devices, "committee assembled");

        self.transition(session_id, KeygenState::Start);
        with_cancel(cancel, self.relay.start_session(session_id, &devices)).await?;

        // Followers take the initiator's setup blob from the relay.
        let follower_setup = if request.is_initiator {
            None
        } else {
            Some(with_cancel(cancel, self.relay.setup_message(session_id)).await?)
        };

        self.transition(session_id, KeygenState::KeygenEcdsa);
        let ecdsa = self
            .keygen_with_retry(
                request,
                &devices,
                SignatureAlgorithm::Ecdsa,
                follower_setup.as_deref(),
                None,
                cancel,
            )
            .await?;

        // The Schnorr run must see the exact DKLS setup message; the
        // initiator publishes it for followers before continuing.
        let setup = match &follower_setup {
            Some(setup) => setup.clone(),
            None => {
                let setup = with_cancel(cancel, self.engine.setup_message()).await?;
                with_cancel(cancel, self.relay.upload_setup_message(session_id, &setup)).await?;
                setup
            }
        };

        self.transition(session_id, KeygenState::KeygenEddsa);
        let eddsa = self
            .keygen_with_retry(
                request,
                &devices,
                SignatureAlgorithm::Eddsa,
                Some(&setup),
                Some(&ecdsa.chain_code),
                cancel,
            )
            .await?;

        self.transition(session_id, KeygenState::SignalComplete);
        with_cancel(cancel, self.relay.mark_complete(session_id, local)).await?;

        self.transition(session_id, KeygenState::WaitAllComplete);
        self.wait_for_all_complete(session_id, &devices, cancel)
            .await?;

        self.transition(session_id, KeygenState::Done);
        Ok(KeygenOutcome {
            devices,
            ecdsa,
            eddsa,
        })
    }

    /// Poll the participant list until at least one non-self peer shows
    /// up. Committed order: local party first, then peers deduplicated
    /// in first-seen order.
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
                let peers: Vec<String> =
                    dedup(participants.into_iter().filter(|p| p.as_str() != local));
                Ok(if peers.is_empty() { None } else { Some(peers) })
            },
        )
        .await?;
        let mut devices = vec![local.to_string()];
        devices.extend(peers);
        Ok(devices)
    }

    async fn wait_for_all_complete(
        &self,
        session_id: &str,
        devices: &[String],
        cancel: &CancelToken,
    ) -> Result<()> {
        poll_until(
            self.timings.peer_poll_interval,
            self.timings.complete_wait_timeout,
            cancel,
            || async move {
                let completed = self.relay.completed_parties(session_id).await?;
                let all = devices.iter().all(|d| completed.contains(d));
                Ok(if all { Some(()) } else { None })
            },
        )
        .await
    }

    /// Run one keygen ceremony, retrying the whole run (fresh rounds) on
    /// failure. Every successful run must land on `expected_chain_code`
    /// when one is pinned; a divergent chain code means the committee no
    /// longer agrees and the ceremony is unsalvageable.
    async fn keygen_with_retry(
        &self,
        request: &KeygenRequest,
        devices: &[String],
        algorithm: SignatureAlgorithm,
        setup_message: Option<&[u8]>,
        expected_chain_code: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<KeygenOutput> {
        let params = &request.params;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let input = KeygenInput {
                algorithm,
                is_initiator: request.is_initiator,
                relay_url: &self.relay_url,
                session_id: &params.session_id,
                local_party_id: &params.local_party_id,
                committee: devices,
                old_committee: &request.old_committee,
                hex_encryption_key: &params.hex_encryption_key,
                setup_message,
            };
            match with_cancel(cancel, self.engine.start_keygen(input)).await {
                Ok(output) => {
                    if let Some(expected) = expected_chain_code {
                        if expected != output.chain_code {
                            return Err(Error::KeygenFailed(format!(
                                "{algorithm}: chain code diverged from committed value"
                            )));
                        }
                    }
                    return Ok(output);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) if attempt < KEYGEN_ATTEMPTS => {
                    warn!(session_id = %params.session_id, %algorithm, attempt, error = %err, "keygen attempt failed, retrying");
                }
                Err(err) => {
                    return Err(Error::KeygenFailed(format!("{algorithm}: {err}")));
                }
            }
        }
    }

    fn transition(&self, session_id: &str, state: KeygenState) {
        info!(%session_id, ?state, "keygen state");
    }
}

fn dedup(parties: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    parties.filter(|p| seen.insert(p.clone())).collect()
}
