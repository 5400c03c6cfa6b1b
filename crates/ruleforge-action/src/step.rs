//! The unit of local work a rule's build steps are made of, and the context
//! they execute under. Concrete step implementations (subprocess, copy,
//! mkdir, write, symlink-tree) live in `ruleforge-exec`, which depends on
//! this trait rather than the reverse.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ruleforge_core::error::Result;
use ruleforge_core::traits::{CellPaths, Filesystem, ProcessExecutor};

/// Everything a step needs to do its work: the filesystem and process
/// collaborators, the rule's scratch and output directories, and the shared
/// cancellation flag the scheduler raises on the first fatal error.
pub struct StepContext {
    pub filesystem: Arc<dyn Filesystem>,
    pub cell_paths: Arc<dyn CellPaths>,
    pub process_executor: Arc<dyn ProcessExecutor>,
    pub scratch_dir: PathBuf,
    pub output_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    cancelled: Arc<AtomicBool>,
}

impl StepContext {
    pub fn new(
        filesystem: Arc<dyn Filesystem>,
        cell_paths: Arc<dyn CellPaths>,
        process_executor: Arc<dyn ProcessExecutor>,
        scratch_dir: PathBuf,
        output_dir: PathBuf,
        env: BTreeMap<String, String>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            filesystem,
            cell_paths,
            process_executor,
            scratch_dir,
            output_dir,
            env,
            cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The outcome of running a single step to completion.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Success,
    Failure { exit_code: i32, stderr: Vec<u8> },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success)
    }
}

/// A single unit of local work within a rule's build: subprocess, file copy,
/// directory creation, file write or symlink-tree creation.
#[async_trait]
pub trait Step: Send + Sync {
    fn short_name(&self) -> &str;
    fn description(&self, ctx: &StepContext) -> String;
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome>;

    /// The tool-scoped layer of the env-precedence merge: environment
    /// variables this specific step's tool requires, overriding every other
    /// layer. Most steps need none.
    fn tool_env(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Merges environment overrides in the declared precedence order:
/// process-inherited < platform-default < rule-scoped < tool-scoped.
pub fn merge_env(
    process_inherited: &BTreeMap<String, String>,
    platform_default: &BTreeMap<String, String>,
    rule_scoped: &BTreeMap<String, String>,
    tool_scoped: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = process_inherited.clone();
    for layer in [platform_default, rule_scoped, tool_scoped] {
        for (k, v) in layer {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

/// A relative path whose argument list exceeds OS limits is instead written
/// to this file and the subprocess invoked with `@file`. Using an argfile is
/// a declared, rule-key-visible behavior, not an incidental optimization.
pub fn argfile_path(scratch_dir: &Path, step_name: &str) -> PathBuf {
    scratch_dir.join(format!("{step_name}.argfile"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_precedence_is_process_then_platform_then_rule_then_tool() {
        let mut process = BTreeMap::new();
        process.insert("PATH".to_string(), "/usr/bin".to_string());
        process.insert("SHARED".to_string(), "process".to_string());
        let mut platform = BTreeMap::new();
        platform.insert("SHARED".to_string(), "platform".to_string());
        let mut rule = BTreeMap::new();
        rule.insert("SHARED".to_string(), "rule".to_string());
        let mut tool = BTreeMap::new();
        tool.insert("SHARED".to_string(), "tool".to_string());

        let merged = merge_env(&process, &platform, &rule, &tool);
        assert_eq!(merged.get("SHARED").map(String::as_str), Some("tool"));
        assert_eq!(merged.get("PATH").map(String::as_str), Some("/usr/bin"));
    }
}
