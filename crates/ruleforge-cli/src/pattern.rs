//! Resolves a CLI target pattern (`//path:name`, `//path:`, `//path/...`, or
//! a bare alias) against the full set of known targets in a cell.

use std::collections::BTreeMap;

use ruleforge_core::error::{BuildError, Result};
use ruleforge_core::target::{CellName, TargetLabel};
use ruleforge_graph::TargetGraph;

/// Resolves `pattern` to the concrete targets it names.
///
/// - `//path:name` resolves to exactly one target.
/// - `//path:` resolves to every target declared directly in `path`.
/// - `//path/...` resolves to every target in `path` and its subpackages.
/// - anything else is looked up in `aliases`; an unresolved alias is a
///   malformed pattern, since by this point it cannot be any other kind.
pub fn resolve(
    pattern: &str,
    cell: &CellName,
    graph: &TargetGraph,
    aliases: &BTreeMap<String, String>,
) -> Result<Vec<TargetLabel>> {
    if let Some(rest) = pattern.strip_prefix("//") {
        if let Some(package) = rest.strip_suffix("/...") {
            return Ok(all_targets(graph)
                .filter(|t| t.cell == *cell && under_package(t.package.as_str(), package))
                .collect());
        }
        if let Some(package) = rest.strip_suffix(':') {
            return Ok(all_targets(graph)
                .filter(|t| t.cell == *cell && t.package.as_str() == package)
                .collect());
        }
        let (package, name) = rest
            .split_once(':')
            .ok_or_else(|| BuildError::MalformedPattern(pattern.to_string()))?;
        let label = TargetLabel::unconfigured(cell.as_str(), package, name);
        if !graph.contains(&label) {
            return Err(BuildError::UnresolvableTarget(label));
        }
        return Ok(vec![label]);
    }

    match aliases.get(pattern) {
        Some(aliased) => resolve(aliased, cell, graph, aliases),
        None => Err(BuildError::MalformedPattern(pattern.to_string())),
    }
}

fn under_package(package: &str, prefix: &str) -> bool {
    package == prefix || package.starts_with(&format!("{prefix}/"))
}

fn all_targets(graph: &TargetGraph) -> impl Iterator<Item = TargetLabel> + '_ {
    graph.topo_sorted().into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleforge_graph::{RawArgs, TargetNode};

    fn build_graph() -> TargetGraph {
        let a = TargetLabel::unconfigured("root", "foo", "a");
        let b = TargetLabel::unconfigured("root", "foo/bar", "b");
        TargetGraph::build(vec![
            TargetNode::new(a, "writefile", RawArgs::default()),
            TargetNode::new(b, "writefile", RawArgs::default()),
        ])
        .unwrap()
    }

    #[test]
    fn exact_pattern_resolves_one_target() {
        let graph = build_graph();
        let cell = CellName::new("root");
        let resolved = resolve("//foo:a", &cell, &graph, &BTreeMap::new()).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name.as_str(), "a");
    }

    #[test]
    fn package_pattern_resolves_direct_targets_only() {
        let graph = build_graph();
        let cell = CellName::new("root");
        let resolved = resolve("//foo:", &cell, &graph, &BTreeMap::new()).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].name.as_str(), "a");
    }

    #[test]
    fn recursive_pattern_includes_subpackages() {
        let graph = build_graph();
        let cell = CellName::new("root");
        let resolved = resolve("//foo/...", &cell, &graph, &BTreeMap::new()).unwrap();
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn unresolvable_exact_target_is_an_error() {
        let graph = build_graph();
        let cell = CellName::new("root");
        assert!(resolve("//foo:missing", &cell, &graph, &BTreeMap::new()).is_err());
    }

    #[test]
    fn alias_resolves_through_to_its_target() {
        let graph = build_graph();
        let cell = CellName::new("root");
        let mut aliases = BTreeMap::new();
        aliases.insert("main".to_string(), "//foo:a".to_string());
        let resolved = resolve("main", &cell, &graph, &aliases).unwrap();
        assert_eq!(resolved[0].name.as_str(), "a");
    }
}
