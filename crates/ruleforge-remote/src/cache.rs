//! Shared, read-mostly cache of Merkle directory nodes, keyed by a node's
//! own digest so that two rules whose input sets share a sub-directory
//! reuse the same node rather than re-serializing it.

use std::sync::Arc;

use dashmap::DashMap;
use ruleforge_core::digest::Digest;

use crate::tree::DirNode;

#[derive(Clone, Default)]
pub struct NodeCache {
    nodes: Arc<DashMap<Digest, Arc<DirNode>>>,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the already-cached node for `digest` if an identical
    /// sub-tree has already been built in this build; otherwise inserts
    /// `build()`'s result as the canonical instance. A race between two
    /// callers building the same digest concurrently wastes one build, not
    /// correctness: both results are identical by construction.
    pub fn get_or_insert(&self, digest: Digest, build: impl FnOnce() -> DirNode) -> Arc<DirNode> {
        if let Some(existing) = self.nodes.get(&digest) {
            return existing.clone();
        }
        let node = Arc::new(build());
        self.nodes.entry(digest).or_insert(node).clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
