//! Subprocess execution backing [`crate::steps::ProcessStep`].

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use ruleforge_core::error::Result;
use ruleforge_core::traits::{ProcessExecutor, ProcessOutput};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Launches subprocesses with `tokio::process`, capturing stdout/stderr in
/// full and reporting wall-clock duration.
pub struct TokioProcessExecutor;

#[async_trait]
impl ProcessExecutor for TokioProcessExecutor {
    async fn launch(
        &self,
        command: &[String],
        env: &BTreeMap<String, String>,
        cwd: &Path,
        stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput> {
        let (program, args) = command
            .split_first()
            .expect("a step's command must name a program");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .env_clear()
            .envs(env)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = Instant::now();
        let mut child = cmd.spawn()?;

        if let Some(bytes) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(bytes).await?;
            }
        }

        let output = child.wait_with_output().await?;
        Ok(ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_simple_command_and_captures_output() {
        let executor = TokioProcessExecutor;
        let output = executor
            .launch(
                &["echo".to_string(), "hi".to_string()],
                &BTreeMap::new(),
                Path::new("."),
                None,
            )
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hi");
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_not_errored() {
        let executor = TokioProcessExecutor;
        let output = executor
            .launch(
                &["sh".to_string(), "-c".to_string(), "exit 3".to_string()],
                &BTreeMap::new(),
                Path::new("."),
                None,
            )
            .await
            .unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, 3);
    }
}
