//! The target model and target graph: construction, lookup, traversal and
//! cycle detection for a set of parsed build targets.

pub mod target_graph;
pub mod target_node;

pub use target_graph::{bfs_frontier, TargetGraph, TargetGraphError};
pub use target_node::{RawArgs, TargetNode, VisibilityPattern};
