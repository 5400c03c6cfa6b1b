//! Maps target identity to its materialized [`Rule`], constructing each rule
//! exactly once even under concurrent callers.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ruleforge_core::error::{BuildError, Result};
use ruleforge_core::target::TargetLabel;

use crate::rule::Rule;

/// Idempotent target -> rule index. `require` invokes its factory at most
/// once per target: a vacant entry holds the shard's write lock for the
/// duration of the factory call, so a second caller racing on the same new
/// target blocks until the first finishes and then observes the already
/// inserted rule rather than running its own factory.
#[derive(Default)]
pub struct ActionGraphBuilder {
    rules: DashMap<TargetLabel, Arc<dyn Rule>>,
}

impl ActionGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rule for `target`, constructing it via `factory` if this
    /// is the first call for that target. Concurrent callers racing on the
    /// same target all observe the same `Rule` instance: the factory runs at
    /// most once, under the entry's shard lock, so no other caller can ever
    /// observe a vacant slot and duplicate the construction.
    pub fn require<F>(&self, target: &TargetLabel, factory: F) -> Result<Arc<dyn Rule>>
    where
        F: FnOnce() -> Result<Arc<dyn Rule>>,
    {
        match self.rules.entry(target.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let rule = factory()?;
                Ok(entry.insert(rule).clone())
            }
        }
    }

    /// Registers an already-constructed rule under a synthetic sub-target,
    /// for auxiliary rules a description creates alongside its primary rule
    /// (e.g. a symlink-tree rule backing a wrapper rule).
    pub fn add_to_index(&self, target: TargetLabel, rule: Arc<dyn Rule>) {
        self.rules.entry(target).or_insert(rule);
    }

    pub fn get(&self, target: &TargetLabel) -> Option<Arc<dyn Rule>> {
        self.rules.get(target).map(|entry| entry.value().clone())
    }

    pub fn require_existing(&self, target: &TargetLabel) -> Result<Arc<dyn Rule>> {
        self.get(target)
            .ok_or_else(|| BuildError::UnresolvableTarget(target.clone()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
