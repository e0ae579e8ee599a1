//! In-memory doubles for the relay, the Fast-Vault server, the TSS
//! engine and the chain module. Everything runs through the real
//! clients and coordinators; only the sockets are gone.

// Not every test binary touches every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vaultic_core::storage::MemoryStorage;
use vaultic_core::{Error, Result, SignatureAlgorithm};
use vaultic_mpc::chain::{Chain, ChainKind, ChainModule, ChainTransaction};
use vaultic_mpc::sdk::{Sdk, SdkConfig};
use vaultic_mpc::session::MpcTimings;
use vaultic_mpc::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use vaultic_mpc::tss::{KeygenInput, KeygenOutput, KeysignInput, KeysignOutput, TssEngine};

pub const RELAY_BASE: &str = "http://relay.test";
pub const FAST_BASE: &str = "http://fast.test";
pub const SERVER_PARTY: &str = "Server-42";

fn method_name(method: Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Post => "POST",
        Method::Delete => "DELETE",
    }
}

#[derive(Default)]
struct SessionState {
    participants: Vec<String>,
    started: Option<Vec<String>>,
    completed: Vec<String>,
    messages: Vec<serde_json::Value>,
    setup: Option<Vec<u8>>,
    participant_gets: usize,
}

struct DelayedJoin {
    session_id: String,
    party: String,
    visible_after_gets: usize,
}

struct Failure {
    method: &'static str,
    path: String,
    remaining: u32,
}

#[derive(Default)]
struct NetState {
    sessions: HashMap<String, SessionState>,
    delayed_joins: Vec<DelayedJoin>,
    failures: Vec<Failure>,
    request_log: Vec<(String, String, String)>,
    fast_create_requests: Vec<serde_json::Value>,
    fast_sign_requests: Vec<serde_json::Value>,
}

/// Fake relay + Fast-Vault server behind the `HttpTransport` seam.
pub struct FakeNet {
    state: Mutex<NetState>,
    /// How many participant GETs pass before the server party shows up
    /// after a create/sign call.
    pub server_join_after_gets: Mutex<usize>,
    /// Set to a huge number to simulate a server that never joins.
    pub verification_code: String,
}

impl FakeNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(NetState::default()),
            server_join_after_gets: Mutex::new(2),
            verification_code: "0000".to_string(),
        })
    }

    pub fn set_server_join_after_gets(&self, gets: usize) {
        *self.server_join_after_gets.lock() = gets;
    }

    /// Serve `count` 500s for the exact relay path before behaving.
    pub fn fail_with_500(&self, method: &'static str, path: &str, count: u32) {
        self.state.lock().failures.push(Failure {
            method,
            path: path.to_string(),
            remaining: count,
        });
    }

    pub fn requests(&self, method: &str, service: &str, path: &str) -> usize {
        self.state
            .lock()
            .request_log
            .iter()
            .filter(|(m, s, p)| m == method && s == service && p == path)
            .count()
    }

    pub fn fast_sign_requests(&self) -> Vec<serde_json::Value> {
        self.state.lock().fast_sign_requests.clone()
    }

    pub fn fast_create_requests(&self) -> Vec<serde_json::Value> {
        self.state.lock().fast_create_requests.clone()
    }

    pub fn completed_parties(&self, session_id: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .sessions
            .get(session_id)
            .map(|s| s.completed.clone())
            .unwrap_or_default()
    }

    pub fn setup_message(&self, session_id: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .sessions
            .get(session_id)
            .and_then(|s| s.setup.clone())
    }

    fn schedule_server_join(&self, state: &mut NetState, session_id: &str) {
        let visible_after_gets = *self.server_join_after_gets.lock();
        state.delayed_joins.push(DelayedJoin {
            session_id: session_id.to_string(),
            party: SERVER_PARTY.to_string(),
            visible_after_gets,
        });
    }

    fn relay(&self, method: Method, path: &str, body: Option<&[u8]>) -> HttpResponse {
        let mut state = self.state.lock();
        if let Some(response) = Self::take_failure(&mut state, method_name(method), path) {
            return response;
        }

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match (method, segments.as_slice()) {
            (Method::Get, ["ping"]) => ok_json(&"pong"),
            (Method::Post, [session_id]) => {
                let session = state.sessions.entry(session_id.to_string()).or_default();
                for party in parse_parties(body) {
                    if !session.participants.contains(&party) {
                        session.participants.push(party);
                    }
                }
                ok_empty()
            }
            (Method::Get, [session_id]) => {
                let session_id = session_id.to_string();
                if !state.sessions.contains_key(&session_id) {
                    return not_found();
                }
                let gets = {
                    let session = state.sessions.get_mut(&session_id).unwrap();
                    session.participant_gets += 1;
                    session.participant_gets
                };
                let joins: Vec<String> = state
                    .delayed_joins
                    .iter()
                    .filter(|j| j.session_id == session_id && gets >= j.visible_after_gets)
                    .map(|j| j.party.clone())
                    .collect();
                let session = state.sessions.get_mut(&session_id).unwrap();
                for party in joins {
                    if !session.participants.contains(&party) {
                        session.participants.push(party);
                    }
                }
                ok_json(&session.participants)
            }
            (Method::Delete, [session_id]) => {
                state.sessions.remove(*session_id);
                ok_empty()
            }
            (Method::Post, ["start", session_id]) => {
                match state.sessions.get_mut(*session_id) {
                    Some(session) => {
                        session.started = Some(parse_parties(body));
                        ok_empty()
                    }
                    None => not_found(),
                }
            }
            (Method::Get, ["start", session_id]) => match state.sessions.get(*session_id) {
                Some(session) => match &session.started {
                    Some(parties) => ok_json(parties),
                    None => not_found(),
                },
                None => not_found(),
            },
            (Method::Post, ["complete", session_id]) => {
                match state.sessions.get_mut(*session_id) {
                    Some(session) => {
                        for party in parse_parties(body) {
                            if !session.completed.contains(&party) {
                                session.completed.push(party);
                            }
                        }
                        ok_empty()
                    }
                    None => not_found(),
                }
            }
            (Method::Get, ["complete", session_id]) => match state.sessions.get(*session_id) {
                Some(session) => {
                    // The hosted co-signer completes on its own; mirror
                    // that by treating joined server parties as done.
                    let mut completed = session.completed.clone();
                    for party in &session.participants {
                        if party.starts_with("Server-") && !completed.contains(party) {
                            completed.push(party.clone());
                        }
                    }
                    ok_json(&completed)
                }
                None => not_found(),
            },
            (Method::Post, ["message", session_id]) => {
                match state.sessions.get_mut(*session_id) {
                    Some(session) => {
                        let envelope: serde_json::Value =
                            serde_json::from_slice(body.unwrap_or_default()).unwrap();
                        let hash = envelope["hash"].as_str().unwrap_or_default();
                        let duplicate = session
                            .messages
                            .iter()
                            .any(|m| m["hash"].as_str() == Some(hash));
                        if !duplicate {
                            session.messages.push(envelope);
                        }
                        ok_empty()
                    }
                    None => not_found(),
                }
            }
            (Method::Get, ["message", session_id, party]) => {
                match state.sessions.get(*session_id) {
                    Some(session) => {
                        let inbox: Vec<&serde_json::Value> = session
                            .messages
                            .iter()
                            .filter(|m| {
                                m["to"]
                                    .as_array()
                                    .map(|to| to.iter().any(|t| t.as_str() == Some(party)))
                                    .unwrap_or(false)
                            })
                            .collect();
                        ok_json(&inbox)
                    }
                    None => not_found(),
                }
            }
            (Method::Delete, ["message", session_id, party, hash]) => {
                match state.sessions.get_mut(*session_id) {
                    Some(session) => {
                        session.messages.retain(|m| {
                            !(m["hash"].as_str() == Some(*hash)
                                && m["to"]
                                    .as_array()
                                    .map(|to| to.iter().any(|t| t.as_str() == Some(*party)))
                                    .unwrap_or(false))
                        });
                        ok_empty()
                    }
                    None => not_found(),
                }
            }
            (Method::Post, ["setup-message", session_id]) => {
                match state.sessions.get_mut(*session_id) {
                    Some(session) => {
                        session.setup = Some(body.unwrap_or_default().to_vec());
                        ok_empty()
                    }
                    None => not_found(),
                }
            }
            (Method::Get, ["setup-message", session_id]) => {
                match state.sessions.get(*session_id).and_then(|s| s.setup.clone()) {
                    Some(setup) => HttpResponse {
                        status: 200,
                        body: setup,
                    },
                    None => not_found(),
                }
            }
            _ => not_found(),
        }
    }

    fn fast(&self, method: Method, path: &str, body: Option<&[u8]>, headers: &[(String, String)]) -> HttpResponse {
        let mut state = self.state.lock();
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match (method, segments.as_slice()) {
            (Method::Post, ["vault", "create"]) => {
                let request: serde_json::Value =
                    serde_json::from_slice(body.unwrap_or_default()).unwrap();
                let session_id = request["session_id"].as_str().unwrap_or_default().to_string();
                state.fast_create_requests.push(request);
                self.schedule_server_join(&mut state, &session_id);
                ok_empty()
            }
            (Method::Post, ["vault", "sign"]) => {
                let request: serde_json::Value =
                    serde_json::from_slice(body.unwrap_or_default()).unwrap();
                let session_id = request["session"].as_str().unwrap_or_default().to_string();
                state.fast_sign_requests.push(request);
                self.schedule_server_join(&mut state, &session_id);
                // The live server answers with a JSON string, quotes and
                // all.
                HttpResponse {
                    status: 200,
                    body: format!("\"{session_id}\"").into_bytes(),
                }
            }
            (Method::Get, ["vault", "verify", _public_key, code]) => {
                if *code == self.verification_code {
                    ok_empty()
                } else {
                    HttpResponse {
                        status: 400,
                        body: Vec::new(),
                    }
                }
            }
            (Method::Post, ["vault", "resend"]) => ok_empty(),
            (Method::Get, ["vault", "get", public_key]) => {
                let authorized = headers
                    .iter()
                    .any(|(name, value)| name == "x-password" && value == "pw");
                if !authorized {
                    return HttpResponse {
                        status: 403,
                        body: Vec::new(),
                    };
                }
                ok_json(&serde_json::json!({
                    "name": "Hosted",
                    "public_key_ecdsa": public_key,
                }))
            }
            _ => not_found(),
        }
    }

    fn take_failure(state: &mut NetState, method: &str, path: &str) -> Option<HttpResponse> {
        for failure in state.failures.iter_mut() {
            if failure.method == method && failure.path == path && failure.remaining > 0 {
                failure.remaining -= 1;
                return Some(HttpResponse {
                    status: 500,
                    body: Vec::new(),
                });
            }
        }
        None
    }
}

#[async_trait]
impl HttpTransport for FakeNet {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let (service, path) = if let Some(path) = request.url.strip_prefix(RELAY_BASE) {
            ("relay", path.to_string())
        } else if let Some(path) = request.url.strip_prefix(FAST_BASE) {
            ("fast", path.to_string())
        } else {
            return Err(Error::RelayTransport(format!("unroutable {}", request.url)));
        };
        self.state.lock().request_log.push((
            method_name(request.method).to_string(),
            service.to_string(),
            path.clone(),
        ));
        let response = match service {
            "relay" => self.relay(request.method, &path, request.body.as_deref()),
            _ => self.fast(request.method, &path, request.body.as_deref(), &request.headers),
        };
        Ok(response)
    }
}

fn parse_parties(body: Option<&[u8]>) -> Vec<String> {
    serde_json::from_slice(body.unwrap_or_default()).unwrap_or_default()
}

fn ok_json<T: serde::Serialize>(value: &T) -> HttpResponse {
    HttpResponse {
        status: 200,
        body: serde_json::to_vec(value).unwrap(),
    }
}

fn ok_empty() -> HttpResponse {
    HttpResponse {
        status: 200,
        body: Vec::new(),
    }
}

fn not_found() -> HttpResponse {
    HttpResponse {
        status: 404,
        body: Vec::new(),
    }
}

/// Deterministic stand-in for the DKLS/Schnorr module.
pub struct MockTss {
    pub ecdsa_public_key: String,
    pub eddsa_public_key: String,
    pub chain_code: String,
    setup: Mutex<Option<Vec<u8>>>,
    fail_keygens: AtomicU32,
    pub keygen_calls: Mutex<Vec<RecordedKeygen>>,
    pub keysign_calls: Mutex<Vec<RecordedKeysign>>,
}

#[derive(Debug, Clone)]
pub struct RecordedKeygen {
    pub algorithm: SignatureAlgorithm,
    pub is_initiator: bool,
    pub committee: Vec<String>,
    pub setup_message: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct RecordedKeysign {
    pub algorithm: SignatureAlgorithm,
    pub message: String,
    pub chain_path: String,
    pub peers: Vec<String>,
}

impl MockTss {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ecdsa_public_key: format!("02{}", "ab".repeat(32)),
            eddsa_public_key: "cd".repeat(32),
            chain_code: "11".repeat(32),
            setup: Mutex::new(None),
            fail_keygens: AtomicU32::new(0),
            keygen_calls: Mutex::new(Vec::new()),
            keysign_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_next_keygens(&self, count: u32) {
        self.fail_keygens.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl TssEngine for MockTss {
    async fn start_keygen(&self, input: KeygenInput<'_>) -> Result<KeygenOutput> {
        self.keygen_calls.lock().push(RecordedKeygen {
            algorithm: input.algorithm,
            is_initiator: input.is_initiator,
            committee: input.committee.to_vec(),
            setup_message: input.setup_message.map(|s| s.to_vec()),
        });
        if self
            .fail_keygens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::RelayTransport("simulated keygen failure".into()));
        }
        if input.algorithm == SignatureAlgorithm::Ecdsa && input.setup_message.is_none() {
            *self.setup.lock() = Some(format!("setup-{}", input.session_id).into_bytes());
        }
        let public_key = match input.algorithm {
            SignatureAlgorithm::Ecdsa => self.ecdsa_public_key.clone(),
            SignatureAlgorithm::Eddsa => self.eddsa_public_key.clone(),
        };
        Ok(KeygenOutput {
            public_key,
            chain_code: self.chain_code.clone(),
            keyshare: format!("{}-keyshare", input.algorithm),
        })
    }

    async fn setup_message(&self) -> Result<Vec<u8>> {
        self.setup
            .lock()
            .clone()
            .ok_or_else(|| Error::Internal("no setup message yet".into()))
    }

    async fn keysign(&self, input: KeysignInput<'_>) -> Result<KeysignOutput> {
        self.keysign_calls.lock().push(RecordedKeysign {
            algorithm: input.algorithm,
            message: input.message.to_string(),
            chain_path: input.chain_path.to_string(),
            peers: input.peers.to_vec(),
        });
        let r = hex::encode(Sha256::digest(format!("{}:r", input.message)));
        let s = hex::encode(Sha256::digest(format!("{}:s", input.message)));
        let der = format!("3044{r}{s}");
        Ok(KeysignOutput {
            recovery_id: match input.algorithm {
                SignatureAlgorithm::Ecdsa => Some(1),
                SignatureAlgorithm::Eddsa => None,
            },
            r,
            s,
            der_signature: der,
        })
    }
}

/// Static chain module: canned derivation paths, hash = SHA-256 of the
/// tagged transaction encoding.
pub struct TestChains;

impl ChainModule for TestChains {
    fn pre_signing_hashes(
        &self,
        _chain: Chain,
        transaction: &ChainTransaction,
    ) -> Result<Vec<String>> {
        let encoded = serde_json::to_vec(transaction)
            .map_err(|e| Error::Internal(format!("encode tx: {e}")))?;
        Ok(vec![hex::encode(Sha256::digest(encoded))])
    }

    fn derivation_path(&self, chain: Chain) -> String {
        match chain.kind() {
            ChainKind::Utxo => "m/84'/0'/0'/0/0".to_string(),
            ChainKind::Evm => "m/44'/60'/0'/0/0".to_string(),
            ChainKind::Solana => "m/44'/501'/0'/0'".to_string(),
            _ => "m/44'/0'/0'/0/0".to_string(),
        }
    }
}

pub struct TestEnv {
    pub net: Arc<FakeNet>,
    pub tss: Arc<MockTss>,
    pub storage: Arc<MemoryStorage>,
    pub sdk: Sdk,
}

pub fn test_timings() -> MpcTimings {
    MpcTimings {
        peer_poll_interval: Duration::from_millis(10),
        peer_wait_timeout: Duration::from_millis(300),
        complete_wait_timeout: Duration::from_millis(500),
        keysign_timeout: Duration::from_secs(10),
    }
}

pub fn test_env() -> TestEnv {
    let net = FakeNet::new();
    let tss = MockTss::new();
    let storage = Arc::new(MemoryStorage::new());
    let config = SdkConfig {
        relay_url: RELAY_BASE.to_string(),
        fast_vault_url: FAST_BASE.to_string(),
        timings: test_timings(),
        ..SdkConfig::default()
    };
    let sdk = Sdk::new(
        config,
        storage.clone(),
        net.clone(),
        tss.clone(),
        Arc::new(TestChains),
    );
    TestEnv {
        net,
        tss,
        storage,
        sdk,
    }
}

/// A fast 2-of-2 vault whose key material matches [`MockTss`].
pub fn fast_vault_fixture(tss: &MockTss) -> vaultic_core::Vault {
    use chrono::{TimeZone, Utc};
    let created_at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    vaultic_core::Vault {
        name: "V1".to_string(),
        public_keys: vaultic_core::VaultPublicKeys {
            ecdsa: tss.ecdsa_public_key.clone(),
            eddsa: tss.eddsa_public_key.clone(),
        },
        hex_chain_code: tss.chain_code.clone(),
        signers: vec!["dev-1".to_string(), SERVER_PARTY.to_string()],
        local_party_id: "dev-1".to_string(),
        key_shares: vec![
            vaultic_core::KeyShare {
                public_key: tss.ecdsa_public_key.clone(),
                keyshare: "ecdsa-keyshare".to_string(),
            },
            vaultic_core::KeyShare {
                public_key: tss.eddsa_public_key.clone(),
                keyshare: "eddsa-keyshare".to_string(),
            },
        ],
        lib_type: vaultic_core::LibType::Dkls,
        reshare_prefix: String::new(),
        created_at,
        is_backed_up: false,
        order: 0,
        last_modified: created_at,
    }
}
