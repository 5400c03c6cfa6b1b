//! The action graph: lowering target nodes into executable, keyed rules, and
//! computing each rule's deterministic fingerprint bottom-up in parallel.

pub mod action_graph;
pub mod rule;
pub mod rule_key;
pub mod step;

pub use action_graph::ActionGraphBuilder;
pub use rule::{
    BuildableContext, ContentHasher, HasSourcePathOutput, OutputRecorder, Rule, RuleCreationContext,
    RuleDescription, SupportsDepFileRuleKey,
};
pub use rule_key::RuleKeyEngine;
pub use step::{merge_env, argfile_path, Step, StepContext, StepOutcome};
