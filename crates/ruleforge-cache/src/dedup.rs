//! Deduplicates concurrent fetches for the same rule key. Writes are never
//! deduplicated: the cache contract only requires network fetch work to be
//! shared, not stores.

use async_trait::async_trait;
use dashmap::DashMap;
use ruleforge_core::digest::Digest;
use ruleforge_core::error::Result;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::cache::{ArtifactCache, FetchOutcome};
use crate::entry::ArtifactBundle;

/// Wraps an [`ArtifactCache`] so that concurrent `fetch` calls for the same
/// rule key share one underlying lookup. The in-flight slot is removed once
/// the lookup completes, so a later independent fetch for the same key is
/// free to go to the backing cache again rather than replaying a stale
/// result.
pub struct DedupingArtifactCache<C> {
    inner: C,
    in_flight: DashMap<Digest, Arc<OnceCell<FetchOutcome>>>,
}

impl<C: ArtifactCache> DedupingArtifactCache<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            in_flight: DashMap::new(),
        }
    }
}

#[async_trait]
impl<C: ArtifactCache> ArtifactCache for DedupingArtifactCache<C> {
    async fn fetch(&self, rule_key: Digest) -> Result<FetchOutcome> {
        let slot = self
            .in_flight
            .entry(rule_key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let outcome = slot.get_or_try_init(|| self.inner.fetch(rule_key)).await?;
        let outcome = outcome.clone();
        self.in_flight.remove(&rule_key);
        Ok(outcome)
    }

    async fn store(&self, rule_key: Digest, bundle: ArtifactBundle) {
        self.inner.store(rule_key, bundle).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryArtifactCache;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCache {
        inner: InMemoryArtifactCache,
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ArtifactCache for CountingCache {
        async fn fetch(&self, rule_key: Digest) -> Result<FetchOutcome> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            // Widen the race window so the spawned callers below reliably
            // observe the same in-flight slot instead of each completing
            // before the next is scheduled.
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            self.inner.fetch(rule_key).await
        }
        async fn store(&self, rule_key: Digest, bundle: ArtifactBundle) {
            self.inner.store(rule_key, bundle).await
        }
    }

    #[tokio::test]
    async fn concurrent_fetches_for_the_same_key_hit_the_backing_cache_once() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let key = Digest::of_bytes(b"rule-a");
        let backing = InMemoryArtifactCache::new();
        backing
            .store(
                key,
                ArtifactBundle::new().with_output(PathBuf::from("out.txt"), b"A".to_vec()),
            )
            .await;
        let cache = Arc::new(DedupingArtifactCache::new(CountingCache {
            inner: backing,
            fetches: fetches.clone(),
        }));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.fetch(key).await.unwrap() }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_hit());
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }
}
