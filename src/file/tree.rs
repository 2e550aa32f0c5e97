//! In-memory trees built from flat node records.
//!
//! Records are loaded into an arena indexed by ID with explicit child index
//! lists; the nested [`TreeNode`] forest handed to callers is materialised
//! from the arena without recursion.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tracing::{error, warn};

use crate::ids::NodeId;

use super::naming::compare_names;
use super::node::{FileNode, NodeType};

/// A node together with its ordered children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    /// The node record.
    #[serde(flatten)]
    pub node: FileNode,
    /// Children, folders first, then by name.
    pub children: Vec<TreeNode>,
}

/// Total number of nodes in a forest.
pub fn count_nodes(forest: &[TreeNode]) -> usize {
    let mut count = 0;
    let mut stack: Vec<&TreeNode> = forest.iter().collect();
    while let Some(tree) = stack.pop() {
        count += 1;
        stack.extend(tree.children.iter());
    }
    count
}

/// Sibling order: folders before files, then case-insensitive name, then ID.
fn compare_nodes(a: &FileNode, b: &FileNode) -> Ordering {
    let rank = |node: &FileNode| match node.node_type {
        NodeType::Folder => 0,
        NodeType::File => 1,
    };

    rank(a)
        .cmp(&rank(b))
        .then_with(|| compare_names(&a.name, &b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Flat arena of one project's nodes.
#[derive(Debug)]
pub struct NodeArena {
    nodes: Vec<FileNode>,
    index: HashMap<NodeId, usize>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

impl NodeArena {
    /// Index the given nodes and link them to their parents.
    ///
    /// A node whose parent is not in the set is a root. Nodes caught in a
    /// parent cycle are promoted to roots so every node appears exactly once.
    pub fn new(nodes: Vec<FileNode>) -> Self {
        let mut index = HashMap::with_capacity(nodes.len());
        let mut unique = Vec::with_capacity(nodes.len());
        for node in nodes {
            if index.contains_key(&node.id) {
                warn!(node_id = %node.id, "Duplicate node record ignored");
                continue;
            }
            index.insert(node.id, unique.len());
            unique.push(node);
        }
        let nodes = unique;

        let mut parents: Vec<Option<usize>> = nodes
            .iter()
            .map(|node| {
                node.parent_id
                    .and_then(|parent_id| index.get(&parent_id).copied())
                    .filter(|&parent| nodes[parent].id != node.id)
            })
            .collect();

        let mut children = vec![Vec::new(); nodes.len()];
        let mut roots = Vec::new();
        for (i, parent) in parents.iter().enumerate() {
            match parent {
                Some(p) => children[*p].push(i),
                None => roots.push(i),
            }
        }

        // Anything not reachable from a root sits on a parent cycle.
        let mut reached = vec![false; nodes.len()];
        let mut queue: VecDeque<usize> = roots.iter().copied().collect();
        mark_reachable(&children, &mut reached, &mut queue);

        for i in 0..nodes.len() {
            if reached[i] {
                continue;
            }
            error!(
                node_id = %nodes[i].id,
                project_id = %nodes[i].project_id,
                "Parent cycle detected, treating node as root"
            );
            if let Some(p) = parents[i].take() {
                children[p].retain(|&c| c != i);
            }
            roots.push(i);
            queue.push_back(i);
            mark_reachable(&children, &mut reached, &mut queue);
        }

        let mut arena = Self {
            nodes,
            index,
            children,
            roots,
        };
        arena.sort();
        arena
    }

    fn sort(&mut self) {
        let nodes = &self.nodes;
        self.roots
            .sort_by(|&a, &b| compare_nodes(&nodes[a], &nodes[b]));
        for list in &mut self.children {
            list.sort_by(|&a, &b| compare_nodes(&nodes[a], &nodes[b]));
        }
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by ID.
    pub fn get(&self, id: NodeId) -> Option<&FileNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Root nodes in sibling order.
    pub fn roots(&self) -> impl Iterator<Item = &FileNode> {
        self.roots.iter().map(|&i| &self.nodes[i])
    }

    /// Children of a node in sibling order (empty for unknown IDs).
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &FileNode> {
        self.index
            .get(&id)
            .map(|&i| self.children[i].as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&c| &self.nodes[c])
    }

    /// Materialise the nested forest.
    pub fn into_forest(self) -> Vec<TreeNode> {
        // Breadth-first order puts every parent before its children, so
        // walking it backwards builds children first.
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue: VecDeque<usize> = self.roots.iter().copied().collect();
        while let Some(i) = queue.pop_front() {
            order.push(i);
            queue.extend(self.children[i].iter().copied());
        }

        let mut records: Vec<Option<FileNode>> = self.nodes.into_iter().map(Some).collect();
        let mut built: Vec<Option<TreeNode>> = vec![None; records.len()];

        for &i in order.iter().rev() {
            let children = self.children[i]
                .iter()
                .filter_map(|&c| built[c].take())
                .collect();
            if let Some(node) = records[i].take() {
                built[i] = Some(TreeNode { node, children });
            }
        }

        self.roots
            .iter()
            .filter_map(|&r| built[r].take())
            .collect()
    }
}

fn mark_reachable(children: &[Vec<usize>], reached: &mut [bool], queue: &mut VecDeque<usize>) {
    while let Some(i) = queue.pop_front() {
        if reached[i] {
            continue;
        }
        reached[i] = true;
        queue.extend(children[i].iter().copied().filter(|&c| !reached[c]));
    }
}

/// Build the ordered forest for one project's complete node set.
///
/// Pure and deterministic: the same input always yields the same forest.
pub fn build_tree(nodes: Vec<FileNode>) -> Vec<TreeNode> {
    NodeArena::new(nodes).into_forest()
}
