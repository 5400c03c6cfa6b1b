//! Translates a rule's resolved inputs into a self-contained remote action:
//! a Merkle-tree input root paired with a command description. A rule that
//! cannot be serialized this way is marked unsupported for remote execution
//! and must fall back to local execution on its own, without affecting any
//! other rule's remote eligibility.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::cache::NodeCache;
use crate::tree::{DirNode, TreeBuilder, TreeEntry};

/// A fully-built remote action: the Merkle root of its declared inputs and
/// the command to run once a remote worker has materialized that root.
pub struct RemoteAction {
    pub input_root: Arc<DirNode>,
    pub command: Vec<String>,
}

/// One input a rule contributes to its remote action's tree, already
/// resolved to content (or a literal symlink target).
pub struct ResolvedInput {
    pub path: String,
    pub entry: TreeEntry,
}

/// A rule refused to serialize for remote execution.
#[derive(Debug, Error)]
#[error("rule is not serializable for remote execution: {reason}")]
pub struct Unsupported {
    pub reason: String,
}

/// Builds [`RemoteAction`]s, sharing a [`NodeCache`] across every rule in a
/// build so identical sub-trees are only hashed once.
pub struct RemoteActionBuilder {
    cache: NodeCache,
}

impl RemoteActionBuilder {
    pub fn new(cache: NodeCache) -> Self {
        Self { cache }
    }

    /// Builds a remote action from a rule's resolved inputs and command.
    /// Fails with [`Unsupported`] rather than panicking or partially
    /// mutating the shared cache when the input set cannot be serialized,
    /// e.g. two distinct entries claiming the same path.
    pub fn build(
        &self,
        inputs: Vec<ResolvedInput>,
        command: Vec<String>,
    ) -> std::result::Result<RemoteAction, Unsupported> {
        let mut seen = BTreeMap::new();
        for input in &inputs {
            if seen.insert(input.path.clone(), ()).is_some() {
                return Err(Unsupported {
                    reason: format!("duplicate input path `{}`", input.path),
                });
            }
        }

        let flat: Vec<(String, TreeEntry)> = inputs.into_iter().map(|i| (i.path, i.entry)).collect();
        let input_root = TreeBuilder::new(self.cache.clone()).build(&flat);
        Ok(RemoteAction { input_root, command })
    }
}
