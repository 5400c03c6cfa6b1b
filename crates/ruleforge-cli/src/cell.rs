//! A single-cell [`CellPaths`] resolver, sufficient for a build invocation
//! rooted at one directory. Multi-cell resolution is outside this binary's
//! scope but nothing in the core assumes a single cell.

use std::path::Path;

use ruleforge_core::target::CellName;
use ruleforge_core::traits::CellPaths;

pub struct SingleCellPaths {
    cell: CellName,
    root: std::path::PathBuf,
}

impl SingleCellPaths {
    pub fn new(cell: CellName, root: impl Into<std::path::PathBuf>) -> Self {
        Self { cell, root: root.into() }
    }
}

impl CellPaths for SingleCellPaths {
    fn root_of(&self, cell: &CellName) -> Option<&Path> {
        if *cell == self.cell {
            Some(&self.root)
        } else {
            None
        }
    }
}
