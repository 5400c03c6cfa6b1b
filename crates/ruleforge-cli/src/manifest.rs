//! Loads `BUILD.json` package manifests from a cell root into
//! [`TargetNode`]s. This is the minimal declarative frontend the core's rule
//! graph engine is built to sit behind; a production deployment would parse
//! a richer build-file language instead.
//!
//! One `BUILD.json` per package directory:
//!
//! ```json
//! {
//!   "targets": [
//!     { "name": "a", "rule": "writefile", "content": "A", "deps": [":b"] }
//!   ]
//! }
//! ```
//!
//! A dependency string is either `:name` (same package) or `//pkg:name`
//! (absolute within this cell).

use std::path::{Path, PathBuf};

use ruleforge_core::error::{BuildError, Result};
use ruleforge_core::target::{CellName, PackagePath, TargetLabel};
use ruleforge_graph::{RawArgs, TargetNode};
use serde::Deserialize;

const MANIFEST_FILE: &str = "BUILD.json";

#[derive(Debug, Deserialize)]
struct ManifestFile {
    targets: Vec<ManifestTarget>,
}

#[derive(Debug, Deserialize)]
struct ManifestTarget {
    name: String,
    rule: String,
    #[serde(default)]
    deps: Vec<String>,
    #[serde(flatten)]
    args: serde_json::Map<String, serde_json::Value>,
}

/// Walks `root` for every `BUILD.json` and parses it into [`TargetNode`]s
/// addressed under `cell`, relative to `root`.
pub fn load_cell(cell: &CellName, root: &Path) -> Result<Vec<TargetNode>> {
    let mut nodes = Vec::new();
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let mut entries = std::fs::read_dir(&dir)?.collect::<std::result::Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.path());
        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
                continue;
            }
            if path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE) {
                let package_dir = path.parent().expect("manifest has a parent directory");
                nodes.extend(load_package(cell, root, package_dir, &path)?);
            }
        }
    }
    Ok(nodes)
}

fn load_package(cell: &CellName, root: &Path, package_dir: &Path, manifest_path: &Path) -> Result<Vec<TargetNode>> {
    let package = package_path(root, package_dir);
    let raw = std::fs::read_to_string(manifest_path)?;
    let manifest: ManifestFile = serde_json::from_str(&raw)?;

    let mut seen = std::collections::HashSet::with_capacity(manifest.targets.len());
    manifest
        .targets
        .into_iter()
        .map(|t| {
            let label = TargetLabel::unconfigured(cell.as_str(), package.as_str(), &t.name);
            if !seen.insert(t.name.clone()) {
                return Err(BuildError::DuplicateTarget(label));
            }
            let deps = t
                .deps
                .iter()
                .map(|d| resolve_dep(cell, &package, d))
                .collect::<Result<Vec<_>>>()?;
            Ok(TargetNode::new(label, t.rule, RawArgs(t.args)).with_declared_deps(deps))
        })
        .collect()
}

fn resolve_dep(cell: &CellName, package: &PackagePath, raw: &str) -> Result<TargetLabel> {
    if let Some(name) = raw.strip_prefix(':') {
        return Ok(TargetLabel::unconfigured(cell.as_str(), package.as_str(), name));
    }
    if let Some(rest) = raw.strip_prefix("//") {
        let (pkg, name) = rest
            .split_once(':')
            .ok_or_else(|| BuildError::MalformedPattern(raw.to_string()))?;
        return Ok(TargetLabel::unconfigured(cell.as_str(), pkg, name));
    }
    Err(BuildError::MalformedPattern(raw.to_string()))
}

/// The package path of `dir`, expressed relative to `root` with `/`
/// separators regardless of host path conventions.
fn package_path(root: &Path, dir: &Path) -> PackagePath {
    let relative = dir.strip_prefix(root).unwrap_or(dir);
    let components: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    PackagePath::new(components.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_chain_of_targets_from_a_single_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("BUILD.json"),
            r#"{"targets": [
                {"name": "c", "rule": "writefile", "content": "C"},
                {"name": "b", "rule": "writefile", "content": "B", "deps": [":c"]},
                {"name": "a", "rule": "writefile", "content": "A", "deps": [":b"]}
            ]}"#,
        )
        .unwrap();

        let cell = CellName::new("root");
        let nodes = load_cell(&cell, dir.path()).unwrap();
        assert_eq!(nodes.len(), 3);
        let a = nodes.iter().find(|n| n.label.name.as_str() == "a").unwrap();
        assert_eq!(a.declared_deps.len(), 1);
    }

    #[test]
    fn malformed_dependency_strings_are_rejected() {
        let cell = CellName::new("root");
        let pkg = PackagePath::new("pkg");
        assert!(resolve_dep(&cell, &pkg, "no-prefix").is_err());
    }

    #[test]
    fn duplicate_target_name_within_one_manifest_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("BUILD.json"),
            r#"{"targets": [
                {"name": "a", "rule": "writefile", "content": "first"},
                {"name": "a", "rule": "writefile", "content": "second"}
            ]}"#,
        )
        .unwrap();

        let cell = CellName::new("root");
        let err = load_cell(&cell, dir.path()).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateTarget(label) if label.name.as_str() == "a"));
    }
}
