//! Persistence contract for the single refresh token held per identity.
//!
//! Records hold the SHA-256 digest of the token, never the raw string. Equal
//! digests are treated as equal tokens.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// One refresh token per identity, replaced on every sign-in and refresh.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Upsert the record for `identity_id`, discarding any previous token.
    async fn set(&self, identity_id: i64, token: &str) -> Result<()>;

    /// True when the stored token for `identity_id` equals `token`.
    async fn verify(&self, identity_id: i64, token: &str) -> Result<bool>;

    /// Replace the record with `replacement` only if it still equals `current`.
    ///
    /// Must be atomic per identity: of two concurrent calls presenting the
    /// same `current`, at most one returns `true`.
    async fn rotate(&self, identity_id: i64, current: &str, replacement: &str) -> Result<bool>;
}

/// Hash a refresh token so raw values never reach storage.
pub(crate) fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Process-local store. Suitable for a single instance and for tests.
#[derive(Debug, Default)]
pub struct MemoryRefreshTokenStore {
    records: Mutex<HashMap<i64, Vec<u8>>>,
}

impl MemoryRefreshTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn set(&self, identity_id: i64, token: &str) -> Result<()> {
        self.records
            .lock()
            .await
            .insert(identity_id, hash_refresh_token(token));
        Ok(())
    }

    async fn verify(&self, identity_id: i64, token: &str) -> Result<bool> {
        let records = self.records.lock().await;
        Ok(records
            .get(&identity_id)
            .is_some_and(|stored| *stored == hash_refresh_token(token)))
    }

    async fn rotate(&self, identity_id: i64, current: &str, replacement: &str) -> Result<bool> {
        let mut records = self.records.lock().await;
        match records.get_mut(&identity_id) {
            Some(stored) if *stored == hash_refresh_token(current) => {
                *stored = hash_refresh_token(replacement);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
