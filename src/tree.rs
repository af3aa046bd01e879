//! Nested directory view of a flat snapshot.

use crate::file::RepoSnapshot;
use crate::filter::{IgnoreFilter, normalize_path};
use crate::language::{Language, classify};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use tracing::{trace, warn};

/// Marker for leaf nodes, serialized as `"type": "file"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafKind {
    /// A regular file
    File,
}

/// A file leaf in the project tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLeaf {
    /// Always [`LeafKind::File`]
    #[serde(rename = "type")]
    pub kind: LeafKind,
    /// Original snapshot path
    pub path: String,
}

/// A node: either a file leaf or a nested directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TreeNode {
    /// File leaf
    File(FileLeaf),
    /// Nested directory
    Directory(ProjectTree),
}

/// Mapping from path segment to node. Sorted by segment name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProjectTree {
    entries: BTreeMap<String, TreeNode>,
}

impl ProjectTree {
    /// Returns true if the tree has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a direct child by segment name.
    #[must_use]
    pub fn get(&self, segment: &str) -> Option<&TreeNode> {
        self.entries.get(segment)
    }

    /// Iterates over direct children in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TreeNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Counts directory nodes at every depth.
    #[must_use]
    pub fn directory_count(&self) -> usize {
        self.entries
            .values()
            .map(|node| match node {
                TreeNode::Directory(sub) => 1 + sub.directory_count(),
                TreeNode::File(_) => 0,
            })
            .sum()
    }

    /// Counts file leaves at every depth.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.entries
            .values()
            .map(|node| match node {
                TreeNode::Directory(sub) => sub.file_count(),
                TreeNode::File(_) => 1,
            })
            .sum()
    }

    fn collect_languages(&self, languages: &mut BTreeSet<Language>) {
        for node in self.entries.values() {
            match node {
                TreeNode::Directory(sub) => sub.collect_languages(languages),
                TreeNode::File(leaf) => {
                    if let Some(lang) = classify(&leaf.path) {
                        languages.insert(lang);
                    }
                }
            }
        }
    }

    /// Renders an indented listing with box-drawing connectors.
    ///
    /// Directories carry a trailing `/`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, "");
        out
    }

    fn render_into(&self, out: &mut String, prefix: &str) {
        let count = self.entries.len();
        for (i, (name, node)) in self.entries.iter().enumerate() {
            let last = i + 1 == count;
            let connector = if last { "└── " } else { "├── " };
            match node {
                TreeNode::File(_) => {
                    let _ = writeln!(out, "{prefix}{connector}{name}");
                }
                TreeNode::Directory(sub) => {
                    let _ = writeln!(out, "{prefix}{connector}{name}/");
                    let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
                    sub.render_into(out, &child_prefix);
                }
            }
        }
    }

    /// Inserts a normalized path, creating directories as needed.
    ///
    /// Returns false if the path could not be placed as a file because a
    /// directory already occupies that name.
    fn insert(&mut self, segments: &[&str], original: &str) -> bool {
        let Some((leaf, dirs)) = segments.split_last() else {
            return false;
        };

        let mut current = self;
        for segment in dirs {
            let node = current
                .entries
                .entry((*segment).to_string())
                .or_insert_with(|| TreeNode::Directory(Self::default()));

            if let TreeNode::File(existing) = node {
                warn!(
                    "'{}' is both a file and a directory; keeping the directory",
                    existing.path
                );
                *node = TreeNode::Directory(Self::default());
            }

            let TreeNode::Directory(sub) = node else {
                return false;
            };
            current = sub;
        }

        if let Some(TreeNode::Directory(_)) = current.entries.get(*leaf) {
            warn!("'{original}' is both a file and a directory; keeping the directory");
            return false;
        }

        current.entries.insert(
            (*leaf).to_string(),
            TreeNode::File(FileLeaf {
                kind: LeafKind::File,
                path: original.to_string(),
            }),
        );
        true
    }
}

/// Result of building the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeSummary {
    /// Nested structure
    pub structure: ProjectTree,
    /// Languages detected among the retained files
    pub languages: BTreeSet<Language>,
    /// Number of input files, ignored ones included
    pub total_files: usize,
    /// Number of file leaves in the structure
    pub retained_files: usize,
    /// Number of directory nodes at every depth
    pub directory_count: usize,
    /// Number of input files excluded by ignore rules
    pub ignored_files: usize,
}

/// Converts a flat snapshot into a nested tree.
///
/// Paths are processed in sorted normalized order, so the result does not
/// depend on snapshot enumeration order.
#[must_use]
pub fn build_tree(snapshot: &RepoSnapshot, filter: &IgnoreFilter) -> TreeSummary {
    let mut ordered: Vec<(String, &str)> = Vec::with_capacity(snapshot.len());
    let mut ignored_files = 0;

    for (path, _) in snapshot.iter() {
        if filter.is_ignored(path) {
            trace!("Ignoring {path}");
            ignored_files += 1;
            continue;
        }
        ordered.push((normalize_path(path), path));
    }
    ordered.sort();

    let mut structure = ProjectTree::default();
    let mut languages = BTreeSet::new();

    for (normalized, original) in &ordered {
        let segments: Vec<&str> = normalized.split('/').collect();
        structure.insert(&segments, original);
    }

    // Derived from the final leaves: a file displaced by a directory is gone.
    structure.collect_languages(&mut languages);
    let retained_files = structure.file_count();
    let directory_count = structure.directory_count();

    TreeSummary {
        structure,
        languages,
        total_files: snapshot.len(),
        retained_files,
        directory_count,
        ignored_files,
    }
}
