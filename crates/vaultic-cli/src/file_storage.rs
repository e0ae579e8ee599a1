//! Directory-backed storage for the CLI: one file per key.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use vaultic_core::storage::{StorageBackend, StorageUsage};
use vaultic_core::{Error, Result};

pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    // Keys may contain characters that are awkward in filenames; encode
    // them as lowercase hex so listing is the exact inverse.
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(hex::encode(key.as_bytes()))
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::StorageUnavailable(e.to_string())),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        tokio::fs::write(self.path_for(key), value)
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::StorageUnavailable(e.to_string())),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Ok(decoded) = hex::decode(name) else { continue };
            if let Ok(key) = String::from_utf8(decoded) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    async fn clear(&self) -> Result<()> {
        for key in self.keys().await? {
            self.remove(&key).await?;
        }
        Ok(())
    }

    async fn usage(&self) -> Result<StorageUsage> {
        let mut used_bytes = 0u64;
        for key in self.keys().await? {
            if let Ok(meta) = tokio::fs::metadata(self.path_for(&key)).await {
                used_bytes += meta.len();
            }
        }
        Ok(StorageUsage {
            used_bytes,
            quota_bytes: None,
        })
    }
}
