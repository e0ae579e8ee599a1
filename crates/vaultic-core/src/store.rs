//! Vault persistence (C1): JSON vault records behind the storage seam.
//!
//! Strictly pass-through; the backend is the single source of truth and
//! there is no caching layer here.

use crate::error::{Error, Result};
use crate::storage::StorageBackend;
use crate::vault::Vault;
use std::sync::Arc;
use tracing::debug;

const VAULT_KEY_PREFIX: &str = "vault:";
const ACTIVE_VAULT_KEY: &str = "activeVaultId";

pub struct VaultStore {
    backend: Arc<dyn StorageBackend>,
}

impl VaultStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    fn key(id: &str) -> String {
        format!("{VAULT_KEY_PREFIX}{id}")
    }

    /// Persist a vault record. Same id overwrites: two vaults with the
    /// same id are the same vault.
    pub async fn put(&self, vault: &Vault) -> Result<()> {
        let record = serde_json::to_vec(vault)
            .map_err(|e| Error::Internal(format!("serialize vault: {e}")))?;
        self.backend.set(&Self::key(vault.id()), record).await?;
        debug!(vault_id = %vault.id(), "vault persisted");
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Vault>> {
        match self.backend.get(&Self::key(id)).await? {
            Some(record) => Ok(Some(serde_json::from_slice(&record)?)),
            None => Ok(None),
        }
    }

    /// All vaults, ordered by `order` ascending, ties broken by
    /// `created_at` ascending.
    pub async fn list(&self) -> Result<Vec<Vault>> {
        let mut vaults = Vec::new();
        for key in self.backend.keys().await? {
            // Exactly one colon: skips cache entries like "vault:x:meta".
            if !key.starts_with(VAULT_KEY_PREFIX) || key.matches(':').count() != 1 {
                continue;
            }
            if let Some(record) = self.backend.get(&key).await? {
                vaults.push(serde_json::from_slice::<Vault>(&record)?);
            }
        }
        vaults.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(vaults)
    }

    /// Idempotent. Clears the active pointer when it referenced `id`.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.backend.remove(&Self::key(id)).await?;
        if self.active().await?.as_deref() == Some(id) {
            self.set_active(None).await?;
        }
        debug!(vault_id = %id, "vault deleted");
        Ok(())
    }

    pub async fn set_active(&self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) => {
                self.backend
                    .set(ACTIVE_VAULT_KEY, id.as_bytes().to_vec())
                    .await
            }
            None => self.backend.remove(ACTIVE_VAULT_KEY).await,
        }
    }

    pub async fn active(&self) -> Result<Option<String>> {
        match self.backend.get(ACTIVE_VAULT_KEY).await? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes).map_err(|_| {
                Error::CorruptedData("active vault pointer is not utf-8".into())
            })?)),
            None => Ok(None),
        }
    }
}
