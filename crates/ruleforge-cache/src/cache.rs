//! The artifact cache contract: `fetch(rule-key)` and
//! `store(rule-key, bundle)`.

use async_trait::async_trait;
use ruleforge_core::digest::Digest;
use ruleforge_core::error::Result;

use crate::entry::ArtifactBundle;

/// The result of a cache lookup. A miss is not an error: it is the expected
/// outcome of a clean build.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Hit(std::sync::Arc<ArtifactBundle>),
    Miss,
}

impl FetchOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, FetchOutcome::Hit(_))
    }
}

/// A content-addressed store of build outputs, keyed by rule key.
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    async fn fetch(&self, rule_key: Digest) -> Result<FetchOutcome>;

    /// Stores `bundle` under `rule_key`. Failures are the cache's own
    /// business to log; they are never surfaced as a build failure, per the
    /// cache's best-effort store contract.
    async fn store(&self, rule_key: Digest, bundle: ArtifactBundle);
}
