//! External collaborators consumed through typed interfaces: the filesystem,
//! the process executor and cell path resolution. Concrete implementations
//! live outside the core (or in `ruleforge-exec` for the local process
//! executor); the core only depends on these traits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::target::CellName;

/// Filesystem operations over paths relative to a cell root. All paths
/// presented to rules are cell-relative; implementations resolve them
/// against the cell prefix before touching disk.
#[async_trait]
pub trait Filesystem: Send + Sync {
    fn resolve(&self, relative: &Path) -> Result<PathBuf>;
    async fn exists(&self, relative: &Path) -> Result<bool>;
    async fn mkdirs(&self, relative: &Path) -> Result<()>;
    async fn delete_recursive(&self, relative: &Path) -> Result<()>;
    async fn copy(&self, from: &Path, to: &Path) -> Result<()>;
    async fn symlink(&self, target: &Path, link: &Path) -> Result<()>;
    async fn write_bytes(&self, relative: &Path, contents: &[u8]) -> Result<()>;
    async fn read_bytes(&self, relative: &Path) -> Result<Vec<u8>>;
}

/// Resolves cell names to filesystem roots. A build may span multiple cells
/// sharing a common path prefix.
pub trait CellPaths: Send + Sync {
    fn root_of(&self, cell: &CellName) -> Option<&Path>;
}

/// The result of running a subprocess to completion.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Launches subprocesses on behalf of steps.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    async fn launch(
        &self,
        command: &[String],
        env: &std::collections::BTreeMap<String, String>,
        cwd: &Path,
        stdin: Option<&[u8]>,
    ) -> Result<ProcessOutput>;
}
