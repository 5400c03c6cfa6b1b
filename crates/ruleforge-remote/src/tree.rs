//! The Merkle input tree a remote action's inputs are declared as. Children
//! within a directory are always processed in the lexicographic order a
//! `BTreeMap` already walks them in, so two hosts building the same input
//! set produce byte-for-byte identical digests.

use std::collections::BTreeMap;
use std::sync::Arc;

use ruleforge_core::digest::{Digest, DigestBuilder};

use crate::cache::NodeCache;

/// A single input at a path, already resolved to content.
#[derive(Debug, Clone)]
pub enum TreeEntry {
    File { digest: Digest, executable: bool },
    /// Carries the literal target string. Never resolved: a symlink to a
    /// path outside the input set is still just a string here.
    Symlink { target: String },
}

#[derive(Debug, Clone)]
pub enum Child {
    Dir(Arc<DirNode>),
    Leaf(TreeEntry),
}

/// A directory node: its children in canonical sorted order, and the
/// digest of their canonical serialization.
#[derive(Debug, Clone)]
pub struct DirNode {
    children: Vec<(String, Child)>,
    digest: Digest,
}

impl DirNode {
    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn children(&self) -> &[(String, Child)] {
        &self.children
    }
}

enum PathTree {
    Leaf(TreeEntry),
    Dir(BTreeMap<String, PathTree>),
}

fn insert(root: &mut BTreeMap<String, PathTree>, components: &[&str], entry: TreeEntry) {
    match components {
        [] => {}
        [last] => {
            root.insert((*last).to_string(), PathTree::Leaf(entry));
        }
        [first, rest @ ..] => {
            let node = root
                .entry((*first).to_string())
                .or_insert_with(|| PathTree::Dir(BTreeMap::new()));
            if let PathTree::Dir(sub) = node {
                insert(sub, rest, entry);
            }
        }
    }
}

fn file_entry_digest(name: &str, content: Digest, executable: bool) -> Digest {
    let mut sink = DigestBuilder::new();
    sink.update_str("name", name);
    sink.update_str("kind", "file");
    sink.update_content_hash("content", content);
    sink.update_bool("executable", executable);
    sink.finish()
}

fn symlink_entry_digest(name: &str, target: &str) -> Digest {
    let mut sink = DigestBuilder::new();
    sink.update_str("name", name);
    sink.update_str("kind", "symlink");
    sink.update_str("target", target);
    sink.finish()
}

fn dir_entry_digest(name: &str, dir_digest: Digest) -> Digest {
    let mut sink = DigestBuilder::new();
    sink.update_str("name", name);
    sink.update_str("kind", "dir");
    sink.update_content_hash("contents", dir_digest);
    sink.finish()
}

/// Builds Merkle directory nodes bottom-up from a flat set of
/// `(relative-path, entry)` pairs, deduplicating identical sub-trees
/// through a shared [`NodeCache`].
pub struct TreeBuilder {
    cache: NodeCache,
}

impl TreeBuilder {
    pub fn new(cache: NodeCache) -> Self {
        Self { cache }
    }

    /// Builds the tree rooted at `inputs`. Input order does not matter:
    /// paths are grouped into their directory structure here, and every
    /// directory's children are hashed in sorted order regardless of the
    /// order `inputs` arrived in.
    pub fn build(&self, inputs: &[(String, TreeEntry)]) -> Arc<DirNode> {
        let mut root: BTreeMap<String, PathTree> = BTreeMap::new();
        for (path, entry) in inputs {
            let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            insert(&mut root, &components, entry.clone());
        }
        let node = self.build_dir(&root);
        self.cache.get_or_insert(node.digest, || node)
    }

    fn build_dir(&self, tree: &BTreeMap<String, PathTree>) -> DirNode {
        let mut children = Vec::with_capacity(tree.len());
        let mut entry_digests = Vec::with_capacity(tree.len());

        for (name, node) in tree {
            match node {
                PathTree::Leaf(TreeEntry::File { digest, executable }) => {
                    entry_digests.push(file_entry_digest(name, *digest, *executable));
                    children.push((
                        name.clone(),
                        Child::Leaf(TreeEntry::File {
                            digest: *digest,
                            executable: *executable,
                        }),
                    ));
                }
                PathTree::Leaf(TreeEntry::Symlink { target }) => {
                    entry_digests.push(symlink_entry_digest(name, target));
                    children.push((
                        name.clone(),
                        Child::Leaf(TreeEntry::Symlink {
                            target: target.clone(),
                        }),
                    ));
                }
                PathTree::Dir(sub) => {
                    let sub_node = self.build_dir(sub);
                    let cached = self.cache.get_or_insert(sub_node.digest, || sub_node);
                    entry_digests.push(dir_entry_digest(name, cached.digest));
                    children.push((name.clone(), Child::Dir(cached)));
                }
            }
        }

        let mut sink = DigestBuilder::new();
        sink.update_sequence("children", &entry_digests);
        DirNode {
            children,
            digest: sink.finish(),
        }
    }
}
