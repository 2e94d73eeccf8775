//! Namespace Reconstruction
//!
//! Builds a parent → children index from `$FILE_NAME` attributes and answers
//! path, listing and subtree queries from it. The index is derived from one
//! full scan and never updated afterwards.
//!
//! Corrupt images can contain parent cycles, so every traversal here carries
//! a visited set.

use crate::ntfs::attribute::AttributeBody;
use crate::ntfs::structs::{FilenameNamespace, ROOT_ENTRY_NUMBER};
use crate::ntfs::Entry;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

// ============================================================================
// Edges
// ============================================================================

/// One `$FILE_NAME`: `child` is called `name` inside directory `parent`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceEdge {
    pub parent: u64,
    pub name: String,
    pub child: u64,
    pub namespace: FilenameNamespace,
}

impl NamespaceEdge {
    pub fn new(parent: u64, name: impl Into<String>, child: u64) -> Self {
        Self {
            parent,
            name: name.into(),
            child,
            namespace: FilenameNamespace::Win32,
        }
    }

    fn is_self_link(&self) -> bool {
        self.parent == self.child
    }
}

// ============================================================================
// Resolved Path
// ============================================================================

/// Path of an entry, root first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
    pub entry: u64,
    pub components: Vec<String>,
    /// False when the walk stopped at an entry with no parent edge (or a
    /// cycle) before reaching the root
    pub reached_root: bool,
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("\\");
        }
        for component in &self.components {
            write!(f, "\\{}", component)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tree
// ============================================================================

/// A node in a directory tree built by [`NamespaceIndex::build_tree`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub entry: u64,
    pub name: String,
    pub children: Vec<TreeNode>,
    /// Already on the current descent path; not expanded again
    pub cycle: bool,
    /// Has children that the depth limit kept out
    pub truncated: bool,
}

impl TreeNode {
    fn new(entry: u64, name: String) -> Self {
        Self {
            entry,
            name,
            children: Vec::new(),
            cycle: false,
            truncated: false,
        }
    }

    /// Number of nodes in this subtree, self included
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::node_count).sum::<usize>()
    }
}

/// Statistics about the index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceStats {
    pub edges: usize,
    /// Distinct entries that have at least one name
    pub named_entries: usize,
    /// Distinct entries acting as a parent
    pub parents: usize,
    /// Named entries whose parent has no name of its own (and is not the root)
    pub orphans: usize,
    /// `$FILE_NAME` attributes whose name could not be decoded
    pub unreadable_names: usize,
}

// ============================================================================
// Namespace Index
// ============================================================================

/// Parent → children index over every decoded `$FILE_NAME`
#[derive(Debug, Clone)]
pub struct NamespaceIndex {
    root: u64,
    /// Scan order
    edges: Vec<NamespaceEdge>,
    by_parent: HashMap<u64, Vec<usize>>,
    by_child: HashMap<u64, Vec<usize>>,
    by_name: HashMap<String, Vec<usize>>,
    unreadable_names: usize,
}

impl NamespaceIndex {
    /// Index every readable `$FILE_NAME` of `entries`; duplicates are kept
    pub fn build<'e, 'a: 'e>(entries: impl IntoIterator<Item = &'e Entry<'a>>) -> Self {
        let mut edges = Vec::new();
        let mut unreadable = 0;

        for entry in entries {
            for attr in &entry.attributes {
                match &attr.body {
                    AttributeBody::FileName(Ok(fname)) => match &fname.name {
                        Ok(name) => edges.push(NamespaceEdge {
                            parent: fname.parent_entry,
                            name: name.clone(),
                            child: entry.entry_number,
                            namespace: fname.namespace,
                        }),
                        Err(_) => unreadable += 1,
                    },
                    AttributeBody::FileName(Err(e)) => {
                        tracing::debug!(entry = entry.entry_number, error = %e, "undecodable $FILE_NAME");
                        unreadable += 1;
                    }
                    _ => {}
                }
            }
        }

        let mut index = Self::from_edges(edges);
        index.unreadable_names = unreadable;
        tracing::info!(
            edges = index.edges.len(),
            unreadable_names = unreadable,
            "namespace index built"
        );
        index
    }

    /// Index a prepared edge list
    pub fn from_edges(edges: Vec<NamespaceEdge>) -> Self {
        let mut by_parent: HashMap<u64, Vec<usize>> = HashMap::new();
        let mut by_child: HashMap<u64, Vec<usize>> = HashMap::new();
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();

        for (i, edge) in edges.iter().enumerate() {
            by_parent.entry(edge.parent).or_default().push(i);
            by_child.entry(edge.child).or_default().push(i);
            by_name.entry(edge.name.clone()).or_default().push(i);
        }

        Self {
            root: ROOT_ENTRY_NUMBER,
            edges,
            by_parent,
            by_child,
            by_name,
            unreadable_names: 0,
        }
    }

    /// Use another entry number as the root
    pub fn with_root(mut self, root: u64) -> Self {
        self.root = root;
        self
    }

    pub fn root(&self) -> u64 {
        self.root
    }

    pub fn edges(&self) -> &[NamespaceEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    fn edges_at<'s>(&'s self, slots: Option<&'s Vec<usize>>) -> impl Iterator<Item = &'s NamespaceEdge> {
        slots.into_iter().flatten().map(move |&i| &self.edges[i])
    }

    /// Every name of `entry`, in scan order
    pub fn parents_of(&self, entry: u64) -> Vec<&NamespaceEdge> {
        self.edges_at(self.by_child.get(&entry)).collect()
    }

    /// Edges below `entry`, in scan order. Self links such as the root's
    /// `.` are not children.
    pub fn children_of(&self, entry: u64) -> Vec<&NamespaceEdge> {
        self.edges_at(self.by_parent.get(&entry))
            .filter(|e| !e.is_self_link())
            .collect()
    }

    /// Best name of `entry`: non-DOS namespaces first, then scan order
    pub fn name_of(&self, entry: u64) -> Option<&str> {
        self.primary_edge(entry).map(|e| e.name.as_str())
    }

    fn primary_edge(&self, entry: u64) -> Option<&NamespaceEdge> {
        self.edges_at(self.by_child.get(&entry))
            .min_by_key(|e| e.namespace.rank())
    }

    /// First edge, in scan order, whose name is exactly `name`
    pub fn lookup(&self, name: &str) -> Option<&NamespaceEdge> {
        self.by_name
            .get(name)
            .and_then(|slots| slots.first())
            .map(|&i| &self.edges[i])
    }

    /// Entry number for a name, with the root reachable as `\`
    pub fn entry_named(&self, name: &str) -> Option<u64> {
        if name.is_empty() || name == "\\" {
            return Some(self.root);
        }
        self.lookup(name).map(|e| e.child)
    }

    /// Full path of the first entry named `target`
    pub fn resolve_path(&self, target: &str) -> Option<ResolvedPath> {
        let edge = self.lookup(target)?;
        Some(self.walk_up(edge.child, vec![edge.name.clone()], edge.parent))
    }

    /// Full path of `entry` along its primary names
    pub fn path_of(&self, entry: u64) -> ResolvedPath {
        self.walk_up(entry, Vec::new(), entry)
    }

    fn walk_up(&self, entry: u64, mut components: Vec<String>, start: u64) -> ResolvedPath {
        let mut visited = HashSet::new();
        let mut current = start;
        let mut reached_root = false;

        loop {
            if current == self.root {
                reached_root = true;
                break;
            }
            if !visited.insert(current) {
                tracing::debug!(entry, at = current, "parent cycle while resolving path");
                break;
            }
            let Some(edge) = self.primary_edge(current) else {
                break;
            };
            components.push(edge.name.clone());
            current = edge.parent;
        }

        // collected leaf first
        components.reverse();

        ResolvedPath {
            entry,
            components,
            reached_root,
        }
    }

    /// Children of the entry named `name` (`\` or empty for the root),
    /// one per child entry. `None` when the name is unknown.
    pub fn list_children(&self, name: &str) -> Option<Vec<&NamespaceEdge>> {
        let entry = self.entry_named(name)?;
        Some(self.unique_children(entry))
    }

    /// One edge per child entry, preferring its best-ranked name
    fn unique_children(&self, entry: u64) -> Vec<&NamespaceEdge> {
        let mut best: HashMap<u64, &NamespaceEdge> = HashMap::new();
        let mut order = Vec::new();
        for edge in self.children_of(entry) {
            match best.get(&edge.child) {
                None => {
                    order.push(edge.child);
                    best.insert(edge.child, edge);
                }
                Some(current) if edge.namespace.rank() < current.namespace.rank() => {
                    best.insert(edge.child, edge);
                }
                Some(_) => {}
            }
        }
        order.into_iter().filter_map(|child| best.get(&child).copied()).collect()
    }

    /// Directory tree under `root`
    pub fn build_tree(&self, root: u64) -> TreeNode {
        self.build_tree_with_depth(root, None)
    }

    /// Directory tree under `root`, expanding at most `max_depth` levels
    pub fn build_tree_with_depth(&self, root: u64, max_depth: Option<usize>) -> TreeNode {
        struct Frame<'s> {
            node: TreeNode,
            pending: std::vec::IntoIter<&'s NamespaceEdge>,
        }

        let mut root_node = TreeNode::new(root, self.name_of(root).unwrap_or_default().to_string());
        let pending = self.expandable_children(root, 0, max_depth, &mut root_node).into_iter();
        let mut ancestry = HashSet::from([root]);
        let mut stack = vec![Frame {
            node: root_node,
            pending,
        }];

        loop {
            let level = stack.len();
            let Some(frame) = stack.last_mut() else {
                break TreeNode::new(root, String::new());
            };

            if let Some(edge) = frame.pending.next() {
                let mut child = TreeNode::new(edge.child, edge.name.clone());
                if ancestry.contains(&edge.child) {
                    child.cycle = true;
                    frame.node.children.push(child);
                } else {
                    let pending = self.expandable_children(edge.child, level, max_depth, &mut child).into_iter();
                    ancestry.insert(edge.child);
                    stack.push(Frame { node: child, pending });
                }
                continue;
            }

            if let Some(done) = stack.pop() {
                ancestry.remove(&done.node.entry);
                match stack.last_mut() {
                    Some(parent) => parent.node.children.push(done.node),
                    None => break done.node,
                }
            }
        }
    }

    /// Children to expand for a node at `level`; marks the node truncated
    /// when the depth limit hides them
    fn expandable_children(&self, entry: u64, level: usize, max_depth: Option<usize>, node: &mut TreeNode) -> Vec<&NamespaceEdge> {
        let children = self.unique_children(entry);
        if max_depth.is_some_and(|max| level >= max) {
            node.truncated = !children.is_empty();
            return Vec::new();
        }
        children
    }

    /// Every entry under `root` with its full path, depth first. Entries
    /// reachable through several names (hard links) appear once per name;
    /// a directory is expanded only once.
    pub fn descendants(&self, root: u64) -> Vec<(u64, ResolvedPath)> {
        let base = self.path_of(root);
        let mut expanded = HashSet::from([root]);
        let mut out = Vec::new();
        let mut stack: Vec<(u64, Vec<String>)> = self
            .unique_children(root)
            .into_iter()
            .rev()
            .map(|e| (e.child, vec![e.name.clone()]))
            .collect();

        while let Some((entry, relative)) = stack.pop() {
            let mut components = base.components.clone();
            components.extend(relative.iter().cloned());
            out.push((
                entry,
                ResolvedPath {
                    entry,
                    components,
                    reached_root: base.reached_root,
                },
            ));

            if !expanded.insert(entry) {
                continue;
            }
            for edge in self.unique_children(entry).into_iter().rev() {
                let mut next = relative.clone();
                next.push(edge.name.clone());
                stack.push((edge.child, next));
            }
        }

        out
    }

    /// Every path under the root whose last component is `name`
    pub fn find_paths(&self, name: &str) -> Vec<ResolvedPath> {
        self.descendants(self.root)
            .into_iter()
            .filter(|(_, path)| path.components.last().is_some_and(|leaf| leaf == name))
            .map(|(_, path)| path)
            .collect()
    }

    pub fn stats(&self) -> NamespaceStats {
        let orphans = self
            .by_child
            .keys()
            .filter(|&&child| {
                self.primary_edge(child)
                    .map(|e| e.parent != self.root && !self.by_child.contains_key(&e.parent))
                    .unwrap_or(false)
            })
            .count();

        NamespaceStats {
            edges: self.edges.len(),
            named_entries: self.by_child.len(),
            parents: self.by_parent.len(),
            orphans,
            unreadable_names: self.unreadable_names,
        }
    }
}
