//! Short-lived in-memory password cache for fast-vault signing.
//!
//! Entries expire after their TTL and are wiped (zeroized) on expiry,
//! on replacement, and on `destroy()`. Passwords held here must never
//! reach logs or error messages.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use zeroize::Zeroizing;

pub const DEFAULT_PASSWORD_TTL: Duration = Duration::from_secs(5 * 60);

struct Entry {
    password: Zeroizing<String>,
    expires_at: Instant,
}

pub struct PasswordCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for PasswordCache {
    fn default() -> Self {
        Self::new(DEFAULT_PASSWORD_TTL)
    }
}

impl PasswordCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn set(&self, vault_id: &str, password: &str) {
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries);
        entries.insert(
            vault_id.to_string(),
            Entry {
                password: Zeroizing::new(password.to_string()),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Returns the cached password unless it has expired. Expired entries
    /// are dropped (and thereby wiped) on access.
    pub fn get(&self, vault_id: &str) -> Option<Zeroizing<String>> {
        let mut entries = self.entries.lock();
        Self::sweep(&mut entries);
        entries.get(vault_id).map(|e| e.password.clone())
    }

    pub fn remove(&self, vault_id: &str) {
        self.entries.lock().remove(vault_id);
    }

    /// Wipe every entry.
    pub fn destroy(&self) {
        self.entries.lock().clear();
    }

    fn sweep(entries: &mut HashMap<String, Entry>) {
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
    }
}
