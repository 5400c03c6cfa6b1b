//! The artifact bundle a cache hit restores and a successful build stores.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ruleforge_core::digest::Digest;

/// Recorded output paths and their content hashes, alongside the full hit
/// set. A hit restores the filesystem to a state indistinguishable from a
/// successful local build for the purposes of downstream rules.
#[derive(Debug, Clone, Default)]
pub struct ArtifactMetadata {
    pub output_paths: Vec<PathBuf>,
    pub content_hashes: BTreeMap<PathBuf, Digest>,
}

/// A complete cache entry: every output path's bytes, plus metadata.
#[derive(Debug, Clone, Default)]
pub struct ArtifactBundle {
    pub contents: BTreeMap<PathBuf, Vec<u8>>,
    pub metadata: ArtifactMetadata,
}

impl ArtifactBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, path: PathBuf, bytes: Vec<u8>) -> Self {
        let content = Digest::of_bytes(&bytes);
        self.metadata.output_paths.push(path.clone());
        self.metadata.content_hashes.insert(path.clone(), content);
        self.contents.insert(path, bytes);
        self
    }
}
