//! Resolves a rule's [`SourcePath`] inputs to content digests for the
//! rule-key engine, reading cell-relative files off the local filesystem.

use std::sync::Arc;

use ruleforge_action::ContentHasher;
use ruleforge_core::digest::Digest;
use ruleforge_core::error::{BuildError, Result};
use ruleforge_core::target::SourcePath;
use ruleforge_core::traits::{CellPaths, Filesystem};

pub struct FilesystemContentHasher {
    filesystem: Arc<dyn Filesystem>,
    cell_paths: Arc<dyn CellPaths>,
}

impl FilesystemContentHasher {
    pub fn new(filesystem: Arc<dyn Filesystem>, cell_paths: Arc<dyn CellPaths>) -> Self {
        Self { filesystem, cell_paths }
    }
}

impl ContentHasher for FilesystemContentHasher {
    fn hash_source(&self, path: &SourcePath) -> Result<Digest> {
        match path {
            SourcePath::InCell { cell, path } => {
                if self.cell_paths.root_of(cell).is_none() {
                    return Err(BuildError::MissingInputFile {
                        target: ruleforge_core::target::TargetLabel::unconfigured(cell.as_str(), "", ""),
                        path: path.to_string(),
                    });
                }
                let relative = std::path::Path::new(path.as_str());
                let bytes = tokio::task::block_in_place(|| {
                    tokio::runtime::Handle::current().block_on(self.filesystem.read_bytes(relative))
                })?;
                Ok(Digest::of_bytes(&bytes))
            }
            SourcePath::TargetOutput { target, .. } => Err(BuildError::RuleConstruction {
                target: target.clone(),
                reason: "this build has no record of another target's output content".to_string(),
            }),
        }
    }
}
