//! Canonical identity of build targets and the source paths they consume.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::SharedStr;

/// An isolated root of source. A build can span multiple cells that share a
/// common path prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellName(SharedStr);

impl CellName {
    pub fn new(name: impl Into<SharedStr>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A slash-separated path to the package directory within a cell, e.g. `foo/bar`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackagePath(SharedStr);

impl PackagePath {
    pub fn new(path: impl Into<SharedStr>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unqualified name of a target within its package, e.g. `lib` in `//foo/bar:lib`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetName(SharedStr);

impl TargetName {
    pub fn new(name: impl Into<SharedStr>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tag that parameterizes a base target, e.g. `shared` or `dwarf-and-dsym`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Flavor(SharedStr);

impl Flavor {
    pub fn new(name: impl Into<SharedStr>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered set of flavor tags. Order is significant for display but two
/// flavor sets compare equal (and hash equal) only when their sorted contents
/// match, since a target's identity must not depend on the order flavors were
/// requested in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlavorSet(Vec<Flavor>);

impl FlavorSet {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_iter(flavors: impl IntoIterator<Item = Flavor>) -> Self {
        let mut v: Vec<Flavor> = flavors.into_iter().collect();
        v.sort();
        v.dedup();
        Self(v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flavor> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn with_flavor(&self, flavor: Flavor) -> Self {
        let mut v = self.0.clone();
        v.push(flavor);
        v.sort();
        v.dedup();
        Self(v)
    }
}

impl PartialEq for FlavorSet {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for FlavorSet {}

impl std::hash::Hash for FlavorSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for FlavorSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FlavorSet {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for FlavorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for flavor in &self.0 {
            write!(f, "#{flavor}")?;
        }
        Ok(())
    }
}

/// The target platform and constraints under which a target is evaluated.
/// Opaque outside of equality and ordering: the rule graph only needs to
/// distinguish configurations, not interpret them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Configuration(SharedStr);

impl Configuration {
    pub fn new(id: impl Into<SharedStr>) -> Self {
        Self(id.into())
    }

    /// The configuration used when no explicit target platform narrows the build.
    pub fn unspecified() -> Self {
        Self::new("<unspecified>")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical identity of a configurable build unit:
/// `(cell, package, name, flavors, configuration)`. Two labels are equal iff
/// all five components are equal, and labels have a total order used for
/// deterministic iteration and hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetLabel {
    pub cell: CellName,
    pub package: PackagePath,
    pub name: TargetName,
    pub flavors: FlavorSet,
    pub configuration: Configuration,
}

impl TargetLabel {
    pub fn new(
        cell: CellName,
        package: PackagePath,
        name: TargetName,
        flavors: FlavorSet,
        configuration: Configuration,
    ) -> Self {
        Self {
            cell,
            package,
            name,
            flavors,
            configuration,
        }
    }

    /// A label for the unconfigured, unflavored target. Useful in tests and
    /// for rule descriptions that do not care about configuration.
    pub fn unconfigured(cell: &str, package: &str, name: &str) -> Self {
        Self::new(
            CellName::new(cell),
            PackagePath::new(package),
            TargetName::new(name),
            FlavorSet::empty(),
            Configuration::unspecified(),
        )
    }

    /// Derive a synthetic sub-target identity for an auxiliary rule created by
    /// a description (e.g. a symlink-tree rule backing a wrapper rule).
    pub fn with_synthetic_flavor(&self, flavor: &str) -> Self {
        Self {
            cell: self.cell.clone(),
            package: self.package.clone(),
            name: self.name.clone(),
            flavors: self.flavors.with_flavor(Flavor::new(flavor)),
            configuration: self.configuration.clone(),
        }
    }
}

impl PartialOrd for TargetLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TargetLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.cell, &self.package, &self.name, &self.flavors, &self.configuration).cmp(&(
            &other.cell,
            &other.package,
            &other.name,
            &other.flavors,
            &other.configuration,
        ))
    }
}

impl fmt::Display for TargetLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}//{}:{}{}",
            self.cell, self.package, self.name, self.flavors
        )
    }
}

/// A reference to a file, either relative to a cell root (no build
/// dependency) or an output produced by a target (carries an implicit
/// dependency on that target). Never an absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourcePath {
    /// A path relative to `cell`'s root.
    InCell { cell: CellName, path: SharedStr },
    /// An output of `target`, addressed by the path relative to that
    /// target's output directory (empty string for the default output).
    TargetOutput {
        target: TargetLabel,
        path: SharedStr,
    },
}

impl SourcePath {
    pub fn in_cell(cell: CellName, path: impl Into<SharedStr>) -> Self {
        SourcePath::InCell {
            cell,
            path: path.into(),
        }
    }

    pub fn target_output(target: TargetLabel, path: impl Into<SharedStr>) -> Self {
        SourcePath::TargetOutput {
            target,
            path: path.into(),
        }
    }

    /// The target this path implicitly depends on, if any.
    pub fn owning_target(&self) -> Option<&TargetLabel> {
        match self {
            SourcePath::InCell { .. } => None,
            SourcePath::TargetOutput { target, .. } => Some(target),
        }
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourcePath::InCell { cell, path } => write!(f, "{cell}//{path}"),
            SourcePath::TargetOutput { target, path } => {
                if path.is_empty() {
                    write!(f, "{target}")
                } else {
                    write!(f, "{target}[{path}]")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_set_order_independent_equality() {
        let a = FlavorSet::from_iter([Flavor::new("shared"), Flavor::new("dwarf")]);
        let b = FlavorSet::from_iter([Flavor::new("dwarf"), Flavor::new("shared")]);
        assert_eq!(a, b);
    }

    #[test]
    fn target_label_total_order_is_stable() {
        let a = TargetLabel::unconfigured("root", "foo", "a");
        let b = TargetLabel::unconfigured("root", "foo", "b");
        let mut v = vec![b.clone(), a.clone()];
        v.sort();
        assert_eq!(v, vec![a, b]);
    }

    #[test]
    fn display_round_trips_recognizable_form() {
        let t = TargetLabel::unconfigured("root", "foo/bar", "lib");
        assert_eq!(t.to_string(), "root//foo/bar:lib");
    }
}
