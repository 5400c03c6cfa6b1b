//! An in-process backing store for the artifact cache. Stands in for a
//! network- or disk-backed cache in tests and small builds; the transport
//! layer itself (HTTP, directory, no-op) is external to the core.

use async_trait::async_trait;
use dashmap::DashMap;
use ruleforge_core::digest::Digest;
use ruleforge_core::error::Result;
use std::sync::Arc;
use tracing::warn;

use crate::cache::{ArtifactCache, FetchOutcome};
use crate::entry::ArtifactBundle;

#[derive(Default)]
pub struct InMemoryArtifactCache {
    entries: DashMap<Digest, Arc<ArtifactBundle>>,
}

impl InMemoryArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ArtifactCache for InMemoryArtifactCache {
    async fn fetch(&self, rule_key: Digest) -> Result<FetchOutcome> {
        Ok(match self.entries.get(&rule_key) {
            Some(bundle) => FetchOutcome::Hit(bundle.clone()),
            None => FetchOutcome::Miss,
        })
    }

    async fn store(&self, rule_key: Digest, bundle: ArtifactBundle) {
        if bundle.contents.is_empty() {
            warn!(%rule_key, "storing an artifact bundle with no recorded outputs");
        }
        self.entries.insert(rule_key, Arc::new(bundle));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn miss_then_store_then_hit() {
        let cache = InMemoryArtifactCache::new();
        let key = Digest::of_bytes(b"rule-a");
        assert!(!cache.fetch(key).await.unwrap().is_hit());

        let bundle = ArtifactBundle::new().with_output(PathBuf::from("out.txt"), b"A".to_vec());
        cache.store(key, bundle).await;

        let outcome = cache.fetch(key).await.unwrap();
        match outcome {
            FetchOutcome::Hit(bundle) => {
                assert_eq!(bundle.contents.get(&PathBuf::from("out.txt")).unwrap(), b"A");
            }
            FetchOutcome::Miss => panic!("expected a hit after store"),
        }
    }
}
