//! The directed acyclic graph of [`TargetNode`]s produced by parsing a set of
//! build files.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use ruleforge_core::target::TargetLabel;
use thiserror::Error;

use crate::target_node::TargetNode;

#[derive(Debug, Error)]
pub enum TargetGraphError {
    #[error("dependency cycle detected among targets: {path}")]
    Cycle {
        participants: Vec<TargetLabel>,
        path: String,
    },

    #[error("target `{referrer}` depends on unresolved target `{reference}`")]
    MissingDependency {
        referrer: TargetLabel,
        reference: TargetLabel,
    },

    #[error("target `{0}` is not present in the graph")]
    NotFound(TargetLabel),

    #[error("duplicate target `{0}` declared more than once")]
    DuplicateTarget(TargetLabel),
}

/// A directed acyclic graph of target nodes. Closed under dependency
/// traversal: every node's declared and inferred dependencies resolve to
/// another node in the same graph.
#[derive(Debug, Default)]
pub struct TargetGraph {
    nodes: HashMap<TargetLabel, TargetNode>,
    /// Reverse-dependency index: target -> targets that depend on it.
    reverse_deps: HashMap<TargetLabel, BTreeSet<TargetLabel>>,
}

impl TargetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from a complete set of nodes, validating acyclicity and
    /// dependency closure. Fails fast naming the participating targets.
    pub fn build(nodes: Vec<TargetNode>) -> Result<Self, TargetGraphError> {
        let mut graph = TargetGraph::default();
        for node in &nodes {
            if graph.nodes.contains_key(&node.label) {
                return Err(TargetGraphError::DuplicateTarget(node.label.clone()));
            }
            graph.nodes.insert(node.label.clone(), node.clone());
        }

        for node in &nodes {
            for dep in node.all_deps() {
                if !graph.nodes.contains_key(dep) {
                    return Err(TargetGraphError::MissingDependency {
                        referrer: node.label.clone(),
                        reference: dep.clone(),
                    });
                }
                graph
                    .reverse_deps
                    .entry(dep.clone())
                    .or_default()
                    .insert(node.label.clone());
            }
        }

        graph.detect_cycle()?;
        Ok(graph)
    }

    pub fn node(&self, target: &TargetLabel) -> Option<&TargetNode> {
        self.nodes.get(target)
    }

    pub fn contains(&self, target: &TargetLabel) -> bool {
        self.nodes.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct forward dependencies of `target`, in ascending target order.
    pub fn forward_deps(&self, target: &TargetLabel) -> Vec<TargetLabel> {
        self.nodes
            .get(target)
            .map(|n| {
                let mut deps: Vec<TargetLabel> = n.all_deps().cloned().collect();
                deps.sort();
                deps
            })
            .unwrap_or_default()
    }

    /// Targets that directly depend on `target`, in ascending target order.
    pub fn reverse_deps(&self, target: &TargetLabel) -> Vec<TargetLabel> {
        self.reverse_deps
            .get(target)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Extracts the closed subgraph reachable from `roots`.
    pub fn subgraph(&self, roots: &[TargetLabel]) -> Result<TargetGraph, TargetGraphError> {
        let mut seen = HashSet::new();
        let mut stack: Vec<TargetLabel> = roots.to_vec();
        for root in roots {
            if !self.nodes.contains_key(root) {
                return Err(TargetGraphError::NotFound(root.clone()));
            }
        }
        let mut collected = Vec::new();
        while let Some(label) = stack.pop() {
            if !seen.insert(label.clone()) {
                continue;
            }
            let node = self.nodes.get(&label).expect("closure invariant");
            collected.push(node.clone());
            for dep in node.all_deps() {
                if !seen.contains(dep) {
                    stack.push(dep.clone());
                }
            }
        }
        TargetGraph::build(collected)
    }

    /// Visits every node in topologically-sorted order: every dependency is
    /// visited strictly before its dependents. Ties (nodes with no ordering
    /// constraint between them) break by ascending target order, so the
    /// traversal is fully deterministic.
    pub fn topo_sorted(&self) -> Vec<TargetLabel> {
        let mut in_degree: HashMap<TargetLabel, usize> = HashMap::new();
        for node in self.nodes.values() {
            in_degree.entry(node.label.clone()).or_insert(0);
            for dep in node.all_deps() {
                // in_degree counts *incoming* edges from the dependency's
                // perspective: a dependent's in-degree is the number of
                // unvisited dependencies it still has.
                let _ = dep;
            }
        }
        for node in self.nodes.values() {
            *in_degree.entry(node.label.clone()).or_insert(0) += node.all_deps().count();
        }

        let mut ready: BTreeSet<TargetLabel> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(t, _)| t.clone())
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(label) = ready.iter().next().cloned() {
            ready.remove(&label);
            order.push(label.clone());
            for dependent in self.reverse_deps(&label) {
                let deg = in_degree.get_mut(&dependent).expect("known node");
                *deg -= 1;
                if *deg == 0 {
                    ready.insert(dependent);
                }
            }
        }
        order
    }

    fn detect_cycle(&self) -> Result<(), TargetGraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        let mut marks: HashMap<TargetLabel, Mark> = HashMap::new();
        let mut path: Vec<TargetLabel> = Vec::new();

        let mut labels: Vec<&TargetLabel> = self.nodes.keys().collect();
        labels.sort();

        for start in labels {
            if marks.contains_key(start) {
                continue;
            }
            let mut stack: Vec<(TargetLabel, usize)> = vec![(start.clone(), 0)];
            path.push(start.clone());
            marks.insert(start.clone(), Mark::InProgress);

            while let Some((label, idx)) = stack.pop() {
                let deps = self.forward_deps(&label);
                if idx < deps.len() {
                    let dep = deps[idx].clone();
                    stack.push((label.clone(), idx + 1));
                    match marks.get(&dep) {
                        Some(Mark::Done) => continue,
                        Some(Mark::InProgress) => {
                            let cycle_start = path.iter().position(|t| *t == dep).unwrap_or(0);
                            let mut cycle: Vec<TargetLabel> = path[cycle_start..].to_vec();
                            cycle.push(dep);
                            let rendered = cycle
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join(" -> ");
                            return Err(TargetGraphError::Cycle {
                                participants: cycle,
                                path: rendered,
                            });
                        }
                        None => {
                            marks.insert(dep.clone(), Mark::InProgress);
                            path.push(dep.clone());
                            stack.push((dep, 0));
                        }
                    }
                } else {
                    marks.insert(label.clone(), Mark::Done);
                    path.pop();
                }
            }
        }
        Ok(())
    }
}

/// A breadth-first queue of ready work, used by callers that want an
/// explicit frontier rather than the full topological order up front.
pub fn bfs_frontier(graph: &TargetGraph, roots: &[TargetLabel]) -> VecDeque<TargetLabel> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    for root in roots {
        if seen.insert(root.clone()) {
            queue.push_back(root.clone());
        }
    }
    let mut order = VecDeque::new();
    while let Some(label) = queue.pop_front() {
        order.push_back(label.clone());
        for dep in graph.forward_deps(&label) {
            if seen.insert(dep.clone()) {
                queue.push_back(dep);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target_node::RawArgs;

    fn node(name: &str, deps: &[&str]) -> TargetNode {
        let label = TargetLabel::unconfigured("root", "pkg", name);
        let deps = deps
            .iter()
            .map(|d| TargetLabel::unconfigured("root", "pkg", d));
        TargetNode::new(label, "stub", RawArgs::default()).with_declared_deps(deps)
    }

    #[test]
    fn depth_three_chain_builds_and_orders_leaves_first() {
        let graph = TargetGraph::build(vec![node("a", &["b"]), node("b", &["c"]), node("c", &[])])
            .unwrap();
        let order = graph.topo_sorted();
        let pos = |n: &str| {
            order
                .iter()
                .position(|t| t.name.as_str() == n)
                .unwrap()
        };
        assert!(pos("c") < pos("b"));
        assert!(pos("b") < pos("a"));
    }

    #[test]
    fn cycle_is_rejected_naming_both_targets() {
        let err = TargetGraph::build(vec![node("x", &["y"]), node("y", &["x"])]).unwrap_err();
        match err {
            TargetGraphError::Cycle { participants, .. } => {
                let names: Vec<String> =
                    participants.iter().map(|l| l.name.to_string()).collect();
                assert!(names.contains(&"x".to_string()));
                assert!(names.contains(&"y".to_string()));
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn missing_dependency_names_referrer_and_reference() {
        let err = TargetGraph::build(vec![node("a", &["missing"])]).unwrap_err();
        match err {
            TargetGraphError::MissingDependency { referrer, reference } => {
                assert_eq!(referrer.name.as_str(), "a");
                assert_eq!(reference.name.as_str(), "missing");
            }
            other => panic!("expected missing dependency error, got {other:?}"),
        }
    }

    #[test]
    fn subgraph_extraction_is_closed_under_deps() {
        let graph = TargetGraph::build(vec![
            node("a", &["b"]),
            node("b", &["c"]),
            node("c", &[]),
            node("unrelated", &[]),
        ])
        .unwrap();
        let root = TargetLabel::unconfigured("root", "pkg", "a");
        let sub = graph.subgraph(&[root]).unwrap();
        assert_eq!(sub.len(), 3);
        assert!(!sub.contains(&TargetLabel::unconfigured("root", "pkg", "unrelated")));
    }

    #[test]
    fn duplicate_target_label_is_rejected_even_if_contents_differ() {
        let a1 = node("a", &[]);
        let a2 = TargetNode::new(a1.label.clone(), "other-rule", RawArgs::default());
        let err = TargetGraph::build(vec![a1, a2]).unwrap_err();
        match err {
            TargetGraphError::DuplicateTarget(label) => assert_eq!(label.name.as_str(), "a"),
            other => panic!("expected duplicate target error, got {other:?}"),
        }
    }

    #[test]
    fn fan_out_topo_order_keeps_leaves_before_aggregator() {
        let mut nodes = Vec::new();
        let leaves: Vec<String> = (0..100).map(|i| format!("leaf-{i}")).collect();
        for leaf in &leaves {
            nodes.push(node(leaf, &[]));
        }
        let leaf_refs: Vec<&str> = leaves.iter().map(String::as_str).collect();
        nodes.push(node("aggregator", &leaf_refs));
        let graph = TargetGraph::build(nodes).unwrap();
        let order = graph.topo_sorted();
        let agg_pos = order
            .iter()
            .position(|t| t.name.as_str() == "aggregator")
            .unwrap();
        assert_eq!(agg_pos, 100);
    }
}
