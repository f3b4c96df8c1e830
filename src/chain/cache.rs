//! Object read cache with 6-second TTL for chain queries.
//!
//! Only objects that exist are cached. Absence is always re-read, so a
//! passport minted right after a failed login is visible on the next attempt.

use crate::chain::client::ChainReader;
use crate::chain::error::ChainError;
use crate::modules::crypto::constant_time_eq;
use crate::types::ObjectId;
use async_trait::async_trait;
use log::{debug, warn};
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Cache TTL in seconds (one block time).
const CACHE_TTL_SECONDS: u64 = 6;

#[derive(Clone)]
struct CachedEntry {
    data: Vec<u8>,
    integrity_tag: [u8; 32],
}

/// Caching decorator around any [`ChainReader`].
pub struct CachedChainReader<R> {
    inner: R,
    cache: Cache<ObjectId, CachedEntry>,

    /// Server secret for integrity tags.
    server_secret: [u8; 32],
}

impl<R: ChainReader> CachedChainReader<R> {
    pub fn new(inner: R, server_secret: [u8; 32]) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(CACHE_TTL_SECONDS))
            .build();

        Self {
            inner,
            cache,
            server_secret,
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub async fn invalidate(&self, id: &ObjectId) {
        self.cache.invalidate(id).await;
    }

    async fn cached(&self, id: &ObjectId) -> Option<Vec<u8>> {
        let entry = self.cache.get(id).await?;

        let expected_tag = self.compute_integrity_tag(id, &entry.data);
        if !constant_time_eq(&entry.integrity_tag, &expected_tag) {
            warn!("Cache integrity check failed for object {}", id);
            self.cache.invalidate(id).await;
            return None;
        }

        Some(entry.data)
    }

    fn compute_integrity_tag(&self, id: &ObjectId, data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.server_secret);
        hasher.update(id.as_bytes());
        hasher.update((data.len() as u64).to_le_bytes());
        hasher.update(data);
        hasher.finalize().into()
    }
}

#[async_trait]
impl<R: ChainReader> ChainReader for CachedChainReader<R> {
    async fn read_object(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, ChainError> {
        if let Some(data) = self.cached(id).await {
            debug!("Cache hit for object {}", id);
            return Ok(Some(data));
        }

        debug!("Cache miss for object {}, querying chain", id);
        let data = self.inner.read_object(id).await?;

        if let Some(bytes) = &data {
            let entry = CachedEntry {
                integrity_tag: self.compute_integrity_tag(id, bytes),
                data: bytes.clone(),
            };
            self.cache.insert(*id, entry).await;
        }

        Ok(data)
    }

    async fn latest_block(&self) -> Result<u64, ChainError> {
        self.inner.latest_block().await
    }
}
