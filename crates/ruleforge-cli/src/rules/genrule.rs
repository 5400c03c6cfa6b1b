//! `genrule`: runs an arbitrary shell command against an `out` path inside
//! the rule's output directory. Exists to exercise a real [`ProcessStep`]
//! end to end — `writefile` never leaves the engine's in-memory content, so
//! nothing else in this tree drives a subprocess, env-precedence merging or
//! a non-zero exit through the scheduler.

use std::sync::Arc;

use ruleforge_action::{
    BuildableContext, ContentHasher, OutputRecorder, Rule, RuleCreationContext, RuleDescription, Step,
};
use ruleforge_core::digest::{Digest, DigestBuilder};
use ruleforge_core::error::{BuildError, Result};
use ruleforge_core::target::TargetLabel;
use ruleforge_exec::ProcessStep;

pub const RULE_TYPE: &str = "genrule";
const OUTPUT_NAME: &str = "out";

pub struct GenRule {
    target: TargetLabel,
    cmd: String,
    deps: Vec<TargetLabel>,
}

impl Rule for GenRule {
    fn target(&self) -> &TargetLabel {
        &self.target
    }

    fn build_deps(&self) -> &[TargetLabel] {
        &self.deps
    }

    fn is_cacheable(&self) -> bool {
        false
    }

    fn append_to_rule_key(
        &self,
        sink: &mut DigestBuilder,
        _content_hasher: &dyn ContentHasher,
    ) -> Result<()> {
        sink.update_str("rule_type", RULE_TYPE);
        sink.update_str("cmd", &self.cmd);
        Ok(())
    }

    fn get_build_steps(&self, ctx: &BuildableContext) -> Result<Vec<Box<dyn Step>>> {
        let out_path = ctx.output_dir.join(OUTPUT_NAME).display().to_string();
        Ok(vec![Box::new(
            ProcessStep::new("genrule", "sh", vec!["-c".to_string(), self.cmd.clone()])
                .with_env([("OUT".to_string(), out_path)]),
        )])
    }

    fn record_outputs(&self, _ctx: &BuildableContext, _sink: &mut OutputRecorder) -> Result<()> {
        Ok(())
    }
}

pub struct GenRuleDescription;

impl RuleDescription for GenRuleDescription {
    fn create_rule(
        &self,
        _ctx: &RuleCreationContext,
        node: &ruleforge_graph::TargetNode,
    ) -> Result<Arc<dyn Rule>> {
        let cmd = node
            .raw_args
            .get("cmd")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BuildError::RuleConstruction {
                target: node.label.clone(),
                reason: "genrule requires a string `cmd` argument".to_string(),
            })?
            .to_string();

        let mut deps: Vec<TargetLabel> = node.all_deps().cloned().collect();
        deps.sort();

        Ok(Arc::new(GenRule {
            target: node.label.clone(),
            cmd,
            deps,
        }))
    }
}
