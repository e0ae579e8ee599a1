//! Keysign end to end against the fake relay and Fast-Vault server.

mod common;

use common::{fast_vault_fixture, test_env, SERVER_PARTY};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use vaultic_core::{container, Error};
use vaultic_mpc::cancellation;
use vaultic_mpc::chain::{Chain, ChainTransaction};
use vaultic_mpc::signing::{SignOptions, SigningPayload, SigningStep};
use vaultic_mpc::SignatureFormat;

async fn import_fixture(env: &common::TestEnv) -> String {
    let vault = fast_vault_fixture(&env.tss);
    let content = container::encode(&vault, None).unwrap();
    env.sdk.import_vault(&content, None).await.unwrap();
    vault.public_keys.ecdsa.clone()
}

fn eth_payload(hash: &str) -> SigningPayload {
    SigningPayload {
        chain: Chain::Ethereum,
        transaction: ChainTransaction::Evm { raw: vec![0xde] },
        message_hashes: vec![hash.to_string()],
    }
}

#[tokio::test]
async fn fast_ecdsa_sign_reports_the_full_progress_ladder() {
    let env = test_env();
    let vault_id = import_fixture(&env).await;
    env.net.set_server_join_after_gets(2);

    let progress: Arc<Mutex<Vec<(SigningStep, u8)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    let options = SignOptions {
        password: Some("pw".to_string()),
        on_progress: Some(Arc::new(move |p| sink.lock().push((p.step, p.percent)))),
        ..SignOptions::default()
    };
    let hash = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    let signature = env
        .sdk
        .sign(&vault_id, &eth_payload(hash), &options)
        .await
        .unwrap();

    assert_eq!(signature.format, SignatureFormat::Ecdsa);
    assert!(matches!(signature.recovery, Some(0) | Some(1)));
    assert!(signature.signatures.is_none());

    let steps: Vec<u8> = progress.lock().iter().map(|(_, p)| *p).collect();
    assert_eq!(steps, vec![0, 30, 50, 60, 70, 90, 100]);
    let first = progress.lock().first().copied().unwrap();
    assert_eq!(first.0, SigningStep::Preparing);
    let last = progress.lock().last().copied().unwrap();
    assert_eq!(last.0, SigningStep::Complete);

    // The server was recruited through its sign endpoint and the quoted
    // session id round-tripped.
    let sign_requests = env.net.fast_sign_requests();
    assert_eq!(sign_requests.len(), 1);
    assert_eq!(sign_requests[0]["is_ecdsa"], true);
    assert_eq!(sign_requests[0]["vault_password"], "pw");
    assert_eq!(sign_requests[0]["messages"][0], hash);
    // Hardened-segment quotes never reach the MPC layer.
    assert_eq!(sign_requests[0]["derive_path"], "m/44/60/0/0/0");

    let calls = env.tss.keysign_calls.lock();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].peers.contains(&SERVER_PARTY.to_string()));
    assert!(!calls[0].chain_path.contains('\''));
}

#[tokio::test]
async fn utxo_sign_returns_one_signature_per_input_in_order() {
    let env = test_env();
    let vault_id = import_fixture(&env).await;
    env.net.set_server_join_after_gets(1);

    let hashes = vec!["aa".repeat(32), "bb".repeat(32)];
    let payload = SigningPayload {
        chain: Chain::Bitcoin,
        transaction: ChainTransaction::Utxo {
            psbt_base64: "cHNidP8=".to_string(),
        },
        message_hashes: hashes.clone(),
    };
    let options = SignOptions {
        password: Some("pw".to_string()),
        ..SignOptions::default()
    };

    let signature = env.sdk.sign(&vault_id, &payload, &options).await.unwrap();

    assert_eq!(signature.format, SignatureFormat::Der);
    let parts = signature.signatures.expect("per-input signatures");
    assert_eq!(parts.len(), 2);
    assert_eq!(signature.signature, parts[0].der);

    // Input order, not hash order: the engine saw aa.. then bb.. and the
    // parts line up with the request.
    let calls = env.tss.keysign_calls.lock();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].message, hashes[0]);
    assert_eq!(calls[1].message, hashes[1]);
}

#[tokio::test]
async fn empty_payload_is_rejected_before_any_network_traffic() {
    let env = test_env();
    let vault_id = import_fixture(&env).await;
    let payload = SigningPayload {
        chain: Chain::Ethereum,
        transaction: ChainTransaction::Evm { raw: vec![] },
        message_hashes: vec![],
    };
    let outcome = env
        .sdk
        .sign(&vault_id, &payload, &SignOptions::default())
        .await;
    assert!(matches!(outcome, Err(Error::InvalidInput(_))));
    assert!(env.net.fast_sign_requests().is_empty());
}

#[tokio::test]
async fn eddsa_chain_without_share_is_key_share_missing() {
    let env = test_env();
    let vault = {
        let mut vault = fast_vault_fixture(&env.tss);
        let eddsa = vault.public_keys.eddsa.clone();
        vault.key_shares.retain(|s| s.public_key != eddsa);
        vault
    };
    // Bypass import (which validates) to simulate a legacy record.
    let store = vaultic_core::store::VaultStore::new(env.storage.clone());
    store.put(&vault).await.unwrap();

    let payload = SigningPayload {
        chain: Chain::Solana,
        transaction: ChainTransaction::Opaque { bytes: vec![1] },
        message_hashes: vec!["ee".repeat(32)],
    };
    let outcome = env
        .sdk
        .sign(vault.id(), &payload, &SignOptions::default())
        .await;
    assert!(matches!(outcome, Err(Error::KeyShareMissing(_))));
}

#[tokio::test]
async fn peer_timeout_tears_the_session_down() {
    let env = test_env();
    let vault_id = import_fixture(&env).await;
    // Server never joins inside the wait window.
    env.net.set_server_join_after_gets(10_000);

    let options = SignOptions {
        password: Some("pw".to_string()),
        ..SignOptions::default()
    };
    let hash = "e3".repeat(32);
    let outcome = env.sdk.sign(&vault_id, &eth_payload(&hash), &options).await;

    assert!(matches!(outcome, Err(Error::PeerTimeout)));
    let session = env.net.fast_sign_requests()[0]["session"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(env.net.requests("DELETE", "relay", &format!("/{session}")), 1);
}

#[tokio::test]
async fn cancel_during_peer_wait_resolves_promptly_and_cleans_up() {
    let env = test_env();
    let vault_id = import_fixture(&env).await;
    env.net.set_server_join_after_gets(10_000);

    let (handle, token) = cancellation();
    let options = SignOptions {
        password: Some("pw".to_string()),
        cancel: Some(token),
        ..SignOptions::default()
    };
    let hash = "e3".repeat(32);

    let before = env.sdk.list_vaults().await.unwrap();
    let sdk_task = async { env.sdk.sign(&vault_id, &eth_payload(&hash), &options).await };
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.cancel();
    };
    let started = tokio::time::Instant::now();
    let (outcome, ()) = tokio::join!(sdk_task, canceller);

    assert!(matches!(outcome, Err(Error::Cancelled)));
    // One poll interval plus a second is the contract; the fake is far
    // faster.
    assert!(started.elapsed() < Duration::from_secs(1));
    let session = env.net.fast_sign_requests()[0]["session"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(env.net.requests("DELETE", "relay", &format!("/{session}")), 1);
    assert_eq!(env.sdk.list_vaults().await.unwrap().len(), before.len());
}

#[tokio::test]
async fn two_500s_then_200_is_indistinguishable_from_success() {
    let env = test_env();
    let relay = vaultic_mpc::relay::RelayClient::new(common::RELAY_BASE, env.net.clone());

    relay.join_session("s1", "dev-1").await.unwrap();
    env.net.fail_with_500("GET", "/s1", 2);
    let participants = relay.participants("s1").await.unwrap();
    assert_eq!(participants, vec!["dev-1".to_string()]);
    // Three attempts reached the wire for the one observable success.
    assert_eq!(env.net.requests("GET", "relay", "/s1"), 3);

    // Same contract end to end: a flaky ping still resolves.
    env.net.fail_with_500("GET", "/ping", 2);
    env.sdk.ping().await.unwrap();
}

#[tokio::test]
async fn fast_password_can_come_from_the_cache() {
    let env = test_env();
    let vault_id = import_fixture(&env).await;
    env.net.set_server_join_after_gets(1);
    env.sdk.cache_password(&vault_id, "pw");

    let hash = "e3".repeat(32);
    let signature = env
        .sdk
        .sign(&vault_id, &eth_payload(&hash), &SignOptions::default())
        .await
        .unwrap();
    assert_eq!(signature.format, SignatureFormat::Ecdsa);
    assert_eq!(env.net.fast_sign_requests()[0]["vault_password"], "pw");
}
