//! SDK facade.
//!
//! One immutable context wired at construction: storage, HTTP transport,
//! TSS engine, chain module, endpoints. No process-wide state; hosts may
//! run several `Sdk` values side by side.

use crate::cancel::CancelToken;
use crate::chain::ChainModule;
use crate::fast_vault::{FastResendRequest, FastVaultClient, FastVaultCreateRequest};
use crate::keygen::{KeygenCoordinator, KeygenRequest};
use crate::keysign::KeysignCoordinator;
use crate::relay::RelayClient;
use crate::session::{MpcTimings, PartyRole, SessionParams};
use crate::signing::{SignOptions, Signature, SigningOrchestrator, SigningPayload};
use crate::transport::HttpTransport;
use crate::tss::TssEngine;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use vaultic_core::container;
use vaultic_core::password_cache::{PasswordCache, DEFAULT_PASSWORD_TTL};
use vaultic_core::storage::StorageBackend;
use vaultic_core::store::VaultStore;
use vaultic_core::vault::validate_name;
use vaultic_core::{Error, KeyShare, LibType, Result, Vault, VaultPublicKeys, VaultSummary};

#[derive(Debug, Clone)]
pub struct SdkConfig {
    pub relay_url: String,
    pub fast_vault_url: String,
    pub timings: MpcTimings,
    pub password_ttl: Duration,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            relay_url: "https://api.vaultic.dev/relay".to_string(),
            fast_vault_url: "https://api.vaultic.dev/vault".to_string(),
            timings: MpcTimings::default(),
            password_ttl: DEFAULT_PASSWORD_TTL,
        }
    }
}

pub struct Sdk {
    store: VaultStore,
    fast_vault: FastVaultClient,
    relay: RelayClient,
    keygen: KeygenCoordinator,
    signer: SigningOrchestrator,
    password_cache: Arc<PasswordCache>,
}

impl Sdk {
    pub fn new(
        config: SdkConfig,
        storage: Arc<dyn StorageBackend>,
        transport: Arc<dyn HttpTransport>,
        engine: Arc<dyn TssEngine>,
        chains: Arc<dyn ChainModule>,
    ) -> Self {
        let relay = RelayClient::new(config.relay_url.clone(), transport.clone());
        let fast_vault = FastVaultClient::new(config.fast_vault_url.clone(), transport);
        let password_cache = Arc::new(PasswordCache::new(config.password_ttl));
        let keygen = KeygenCoordinator::new(
            relay.clone(),
            config.relay_url.clone(),
            engine.clone(),
            config.timings.clone(),
        );
        let keysign = KeysignCoordinator::new(
            relay.clone(),
            config.relay_url.clone(),
            fast_vault.clone(),
            engine,
            config.timings.clone(),
        );
        let signer = SigningOrchestrator::new(
            keysign,
            chains,
            password_cache.clone(),
            config.timings.clone(),
        );
        Self {
            store: VaultStore::new(storage),
            fast_vault,
            relay,
            keygen,
            signer,
            password_cache,
        }
    }

    /// Import a `.vult` container. Re-importing a known vault id updates
    /// that vault in place; list membership keeps its position.
    pub async fn import_vault(&self, content: &str, password: Option<&str>) -> Result<Vault> {
        let mut vault = container::decode(content, password)?;
        if let Some(existing) = self.store.get(vault.id()).await? {
            vault.order = existing.order;
            vault.is_backed_up = existing.is_backed_up;
        }
        self.store.put(&vault).await?;
        self.store.set_active(Some(vault.id())).await?;
        info!(vault_id = %vault.id(), "vault imported");
        Ok(vault)
    }

    /// Export a vault as a `.vult` container and mark it backed up.
    pub async fn export_vault(&self, id: &str, password: Option<&str>) -> Result<String> {
        let mut vault = self.require_vault(id).await?;
        let content = container::encode(&vault, password)?;
        vault.is_backed_up = true;
        vault.last_modified = Utc::now();
        self.store.put(&vault).await?;
        Ok(content)
    }

    pub async fn list_vaults(&self) -> Result<Vec<VaultSummary>> {
        Ok(self.store.list().await?.iter().map(Vault::summary).collect())
    }

    pub async fn get_vault(&self, id: &str) -> Result<Vault> {
        self.require_vault(id).await
    }

    pub async fn delete_vault(&self, id: &str) -> Result<()> {
        self.password_cache.remove(id);
        self.store.delete(id).await
    }

    pub async fn rename_vault(&self, id: &str, name: &str) -> Result<Vault> {
        validate_name(name)?;
        let mut vault = self.require_vault(id).await?;
        vault.name = name.to_string();
        vault.last_modified = Utc::now();
        self.store.put(&vault).await?;
        Ok(vault)
    }

    pub async fn set_active_vault(&self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            self.require_vault(id).await?;
        }
        self.store.set_active(id).await
    }

    pub async fn active_vault(&self) -> Result<Option<Vault>> {
        match self.store.active().await? {
            Some(id) => self.store.get(&id).await,
            None => Ok(None),
        }
    }

    /// Create a 2-of-2 fast vault with the Fast-Vault server as the
    /// second party. The server emails a verification code;
    /// [`verify_fast_vault`](Self::verify_fast_vault) checks it.
    pub async fn create_fast_vault(
        &self,
        name: &str,
        password: &str,
        email: &str,
        cancel: &CancelToken,
    ) -> Result<Vault> {
        validate_name(name)?;
        if password.is_empty() {
            return Err(Error::PasswordRequired);
        }
        if email.is_empty() || !email.contains('@') {
            return Err(Error::InvalidInput("a valid email is required".into()));
        }

        let params = SessionParams::new_keygen(PartyRole::SdkParty);
        let create_request = FastVaultCreateRequest {
            name: name.to_string(),
            session_id: params.session_id.clone(),
            hex_encryption_key: params.hex_encryption_key.clone(),
            hex_chain_code: params
                .hex_chain_code
                .clone()
                .ok_or_else(|| Error::Internal("keygen params missing chain code".into()))?,
            local_party_id: params.local_party_id.clone(),
            encryption_password: password.to_string(),
            email: email.to_string(),
            lib_type: "DKLS".to_string(),
        };
        self.fast_vault.create(&create_request).await?;

        let request = KeygenRequest {
            params,
            is_initiator: true,
            old_committee: Vec::new(),
        };
        let outcome = self.keygen.run(&request, cancel).await?;

        let now = Utc::now();
        let next_order = self
            .store
            .list()
            .await?
            .iter()
            .map(|v| v.order)
            .max()
            .map(|o| o + 1)
            .unwrap_or(0);
        let vault = Vault {
            name: name.to_string(),
            public_keys: VaultPublicKeys {
                ecdsa: outcome.ecdsa.public_key.clone(),
                eddsa: outcome.eddsa.public_key.clone(),
            },
            hex_chain_code: outcome.ecdsa.chain_code.clone(),
            signers: outcome.devices.clone(),
            local_party_id: request.params.local_party_id.clone(),
            key_shares: vec![
                KeyShare {
                    public_key: outcome.ecdsa.public_key,
                    keyshare: outcome.ecdsa.keyshare,
                },
                KeyShare {
                    public_key: outcome.eddsa.public_key,
                    keyshare: outcome.eddsa.keyshare,
                },
            ],
            lib_type: LibType::Dkls,
            reshare_prefix: String::new(),
            created_at: now,
            is_backed_up: false,
            order: next_order,
            last_modified: now,
        };
        vault.validate()?;

        self.store.put(&vault).await?;
        self.store.set_active(Some(vault.id())).await?;
        // The freshly chosen password may be needed for an immediate
        // first signature.
        self.password_cache.set(vault.id(), password);
        info!(vault_id = %vault.id(), "fast vault created");
        Ok(vault)
    }

    /// Check the emailed verification code for a hosted share.
    pub async fn verify_fast_vault(&self, id: &str, code: &str) -> Result<bool> {
        self.fast_vault.verify(id, code).await
    }

    pub async fn resend_fast_vault_verification(
        &self,
        id: &str,
        password: &str,
        email: &str,
    ) -> Result<()> {
        self.fast_vault
            .resend(&FastResendRequest {
                public_key_ecdsa: id.to_string(),
                password: password.to_string(),
                email: email.to_string(),
            })
            .await
    }

    /// Sign a chain transaction payload with the vault's threshold key.
    pub async fn sign(
        &self,
        vault_id: &str,
        payload: &SigningPayload,
        options: &SignOptions,
    ) -> Result<Signature> {
        let vault = self.require_vault(vault_id).await?;
        self.signer.sign(&vault, payload, options).await
    }

    /// Relay reachability probe.
    pub async fn ping(&self) -> Result<()> {
        self.relay.ping().await
    }

    pub fn cache_password(&self, vault_id: &str, password: &str) {
        self.password_cache.set(vault_id, password);
    }

    /// Wipe all cached secrets. Call before dropping the SDK.
    pub fn destroy(&self) {
        self.password_cache.destroy();
    }

    async fn require_vault(&self, id: &str) -> Result<Vault> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::VaultNotFound(id.to_string()))
    }
}
