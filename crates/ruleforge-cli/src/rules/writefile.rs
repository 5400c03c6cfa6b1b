//! `writefile`: the minimal rule type used to exercise the rule graph engine
//! end to end. Writes a literal string to a single output file named
//! `out.txt` within its output directory. Carries no process step and no
//! source-path inputs, so it never needs a remote-execution fallback of its
//! own — it exists to drive the engine, not to model a real build tool.

use std::sync::Arc;

use ruleforge_action::{
    BuildableContext, ContentHasher, OutputRecorder, Rule, RuleCreationContext, RuleDescription, Step,
};
use ruleforge_core::digest::{Digest, DigestBuilder};
use ruleforge_core::error::{BuildError, Result};
use ruleforge_core::target::TargetLabel;
use ruleforge_exec::WriteStep;

pub const RULE_TYPE: &str = "writefile";
const OUTPUT_NAME: &str = "out.txt";

pub struct WriteFileRule {
    target: TargetLabel,
    content: String,
    deps: Vec<TargetLabel>,
}

impl Rule for WriteFileRule {
    fn target(&self) -> &TargetLabel {
        &self.target
    }

    fn build_deps(&self) -> &[TargetLabel] {
        &self.deps
    }

    fn append_to_rule_key(
        &self,
        sink: &mut DigestBuilder,
        _content_hasher: &dyn ContentHasher,
    ) -> Result<()> {
        sink.update_str("rule_type", RULE_TYPE);
        sink.update_str("content", &self.content);
        Ok(())
    }

    fn get_build_steps(&self, ctx: &BuildableContext) -> Result<Vec<Box<dyn Step>>> {
        Ok(vec![Box::new(WriteStep {
            path: ctx.output_dir.join(OUTPUT_NAME),
            contents: self.content.clone().into_bytes(),
        })])
    }

    fn record_outputs(&self, ctx: &BuildableContext, sink: &mut OutputRecorder) -> Result<()> {
        sink.record(ctx.output_dir.join(OUTPUT_NAME), Digest::of_bytes(self.content.as_bytes()));
        Ok(())
    }
}

impl WriteFileRule {
    pub fn output_relative_path(ctx: &BuildableContext) -> std::path::PathBuf {
        ctx.output_dir.join(OUTPUT_NAME)
    }
}

pub struct WriteFileDescription;

impl RuleDescription for WriteFileDescription {
    fn create_rule(
        &self,
        _ctx: &RuleCreationContext,
        node: &ruleforge_graph::TargetNode,
    ) -> Result<Arc<dyn Rule>> {
        let content = node
            .raw_args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BuildError::RuleConstruction {
                target: node.label.clone(),
                reason: "writefile requires a string `content` argument".to_string(),
            })?
            .to_string();

        let mut deps: Vec<TargetLabel> = node.all_deps().cloned().collect();
        deps.sort();

        Ok(Arc::new(WriteFileRule {
            target: node.label.clone(),
            content,
            deps,
        }))
    }
}
