//! The immutable record produced by parsing a single target declaration.

use std::collections::BTreeSet;

use ruleforge_core::target::TargetLabel;
use serde::{Deserialize, Serialize};

/// Opaque bundle of the rule's declared arguments, as parsed from the build
/// file. The rule graph engine never interprets these; only the rule
/// description (external to this core) knows their shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawArgs(pub serde_json::Map<String, serde_json::Value>);

impl RawArgs {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

/// A pattern describing which packages may depend on a target, e.g.
/// `//foo/...` or `PUBLIC`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VisibilityPattern(pub String);

/// Immutable record produced by parsing: identity, rule type, raw arguments,
/// declared and inferred dependencies, and visibility. Invariant enforced by
/// [`crate::target_graph::TargetGraph`]: every dependency a node names must
/// itself exist in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetNode {
    pub label: TargetLabel,
    pub rule_type: String,
    pub raw_args: RawArgs,
    /// Dependencies declared explicitly in the build file.
    pub declared_deps: BTreeSet<TargetLabel>,
    /// Dependencies inferred at parse time from the raw arguments (e.g. a
    /// source file found to be another target's output).
    pub extra_deps: BTreeSet<TargetLabel>,
    pub visibility: Vec<VisibilityPattern>,
}

impl TargetNode {
    pub fn new(
        label: TargetLabel,
        rule_type: impl Into<String>,
        raw_args: RawArgs,
    ) -> Self {
        Self {
            label,
            rule_type: rule_type.into(),
            raw_args,
            declared_deps: BTreeSet::new(),
            extra_deps: BTreeSet::new(),
            visibility: Vec::new(),
        }
    }

    pub fn with_declared_deps(mut self, deps: impl IntoIterator<Item = TargetLabel>) -> Self {
        self.declared_deps.extend(deps);
        self
    }

    pub fn with_extra_deps(mut self, deps: impl IntoIterator<Item = TargetLabel>) -> Self {
        self.extra_deps.extend(deps);
        self
    }

    /// All dependency edges out of this node, declared and inferred alike,
    /// in a single deterministic set.
    pub fn all_deps(&self) -> impl Iterator<Item = &TargetLabel> {
        self.declared_deps.iter().chain(self.extra_deps.iter())
    }
}
