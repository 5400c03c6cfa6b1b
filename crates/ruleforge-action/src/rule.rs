//! The executable lowering of a [`TargetNode`](ruleforge_graph::TargetNode):
//! a `Rule` carries its target identity, its build dependencies, the
//! procedure that produces its steps, and the fields that contribute to its
//! rule key.
//!
//! Rather than an inheritance hierarchy of rule kinds, a `Rule` is a base
//! interface plus a small set of capability traits a concrete rule may also
//! implement: [`HasSourcePathOutput`] and [`SupportsDepFileRuleKey`]. The
//! scheduler and rule-key engine probe for these through
//! [`Rule::as_source_path_output`] and [`Rule::as_dep_file_rule_key`] instead
//! of downcasting.

use std::path::PathBuf;
use std::sync::Arc;

use ruleforge_core::digest::{Digest, DigestBuilder};
use ruleforge_core::error::Result;
use ruleforge_core::event::EventBus;
use ruleforge_core::target::{SourcePath, TargetLabel};
use ruleforge_core::traits::{CellPaths, Filesystem};
use ruleforge_graph::TargetGraph;

use crate::step::Step;

/// The bundle of collaborators a [`RuleDescription`] receives when lowering a
/// target node into a rule. Passed explicitly; nothing here is a process-wide
/// singleton.
#[derive(Clone)]
pub struct RuleCreationContext {
    pub filesystem: Arc<dyn Filesystem>,
    pub cell_paths: Arc<dyn CellPaths>,
    pub target_graph: Arc<TargetGraph>,
    pub event_bus: Arc<EventBus>,
}

/// The bundle passed to [`Rule::get_build_steps`]: where this rule's outputs
/// and scratch work live.
pub struct BuildableContext {
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
}

/// Records the outputs a rule produced after a successful local build, for
/// the scheduler to hand to the artifact cache.
#[derive(Debug, Default)]
pub struct OutputRecorder {
    outputs: Vec<(PathBuf, Digest)>,
}

impl OutputRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: PathBuf, content: Digest) {
        self.outputs.push((path, content));
    }

    pub fn outputs(&self) -> &[(PathBuf, Digest)] {
        &self.outputs
    }
}

/// Resolves a [`SourcePath`] input to its content digest. Path-like inputs
/// are never hashed by their filesystem path; the rule-key engine passes an
/// implementation of this to [`Rule::append_to_rule_key`] backed by the
/// build's filesystem.
pub trait ContentHasher: Send + Sync {
    fn hash_source(&self, path: &SourcePath) -> Result<Digest>;
}

/// A rule that has a canonical single output addressable as a [`SourcePath`]
/// (so other rules may depend on it directly rather than on a named path
/// within its output directory).
pub trait HasSourcePathOutput: Send + Sync {
    fn source_path_to_output(&self) -> SourcePath;
}

/// A rule that can narrow its rule key using inputs discovered only during
/// its own previous execution (e.g. a compiler's recorded header
/// dependencies), rather than the full declared input set.
pub trait SupportsDepFileRuleKey: Send + Sync {
    fn dep_file_rule_key(&self, discovered_inputs: &[Digest]) -> Digest;
}

/// The executable, keyed unit of the action graph. One instance exists per
/// target identity for the lifetime of a build invocation.
pub trait Rule: Send + Sync {
    fn target(&self) -> &TargetLabel;

    /// Other rules that must complete before this rule's steps may run.
    fn build_deps(&self) -> &[TargetLabel];

    /// Whether this rule participates in the artifact cache at all. A
    /// non-cacheable rule skips both fetch and store.
    fn is_cacheable(&self) -> bool {
        true
    }

    /// Contributes this rule's own key-contributing fields to `sink`, in the
    /// rule's declared field order, resolving any source-path field through
    /// `content_hasher`. Build-dependency keys are folded in by the
    /// rule-key engine, not here.
    fn append_to_rule_key(
        &self,
        sink: &mut DigestBuilder,
        content_hasher: &dyn ContentHasher,
    ) -> Result<()>;

    /// The ordered steps that build this rule's outputs.
    fn get_build_steps(&self, ctx: &BuildableContext) -> Result<Vec<Box<dyn Step>>>;

    /// Records this rule's outputs once its steps have completed
    /// successfully.
    fn record_outputs(&self, ctx: &BuildableContext, sink: &mut OutputRecorder) -> Result<()>;

    fn as_source_path_output(&self) -> Option<&dyn HasSourcePathOutput> {
        None
    }

    fn as_dep_file_rule_key(&self) -> Option<&dyn SupportsDepFileRuleKey> {
        None
    }
}

/// The polymorphic handler that lowers a target's declared arguments into a
/// [`Rule`]. One implementation per rule type.
pub trait RuleDescription: Send + Sync {
    fn create_rule(
        &self,
        ctx: &RuleCreationContext,
        node: &ruleforge_graph::TargetNode,
    ) -> Result<Arc<dyn Rule>>;
}
