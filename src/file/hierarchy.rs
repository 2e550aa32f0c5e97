//! Structural checks and derived properties over the stored node hierarchy.
//!
//! Every store access goes through the [`RetryExecutor`]. Walks are
//! iterative: ancestor walks are bounded by the project's node count and
//! descendant walks fetch one level at a time with a batched
//! `parent_id IN (...)` query.

use std::collections::{HashMap, HashSet};

use tracing::{debug, error};

use crate::db::Database;
use crate::ids::{NodeId, ProjectId};
use crate::reliability::RetryExecutor;
use crate::{Result, WorkbenchError};

use super::naming::numbered_name;
use super::node::{FileNode, NodeFilter};
use super::repository::FileNodeRepository;

/// Upper bound on parent IDs bound into one `IN (...)` query.
const MAX_BATCH: usize = 500;

/// Hierarchy checks for one record store.
pub struct HierarchyEngine<'a> {
    db: &'a Database,
    retry: &'a RetryExecutor,
}

impl<'a> HierarchyEngine<'a> {
    /// Create a new HierarchyEngine.
    pub fn new(db: &'a Database, retry: &'a RetryExecutor) -> Self {
        Self { db, retry }
    }

    fn nodes(&self) -> FileNodeRepository<'a> {
        FileNodeRepository::new(self.db.pool())
    }

    /// Load one node through the retry layer.
    pub(crate) async fn fetch(&self, id: NodeId) -> Result<Option<FileNode>> {
        let repo = self.nodes();
        self.retry
            .with_retry("file_nodes.find_by_id", &format!("node={id}"), || {
                repo.find_by_id(id)
            })
            .await
    }

    async fn require(&self, id: NodeId) -> Result<FileNode> {
        self.fetch(id)
            .await?
            .ok_or_else(|| WorkbenchError::NotFound(format!("node {id}")))
    }

    async fn project_node_count(&self, project_id: ProjectId) -> Result<u64> {
        let repo = self.nodes();
        let filter = NodeFilter::new().project(project_id);
        self.retry
            .with_retry("file_nodes.count", &format!("project={project_id}"), || {
                repo.count(&filter)
            })
            .await
    }

    /// Check that `node_id` may be moved under `new_parent_id` (None for the
    /// project root) and return the node.
    ///
    /// Name uniqueness at the destination is not checked here.
    pub async fn validate_move(
        &self,
        node_id: NodeId,
        new_parent_id: Option<NodeId>,
        project_id: ProjectId,
    ) -> Result<FileNode> {
        let node = match self.fetch(node_id).await? {
            Some(node) if node.project_id == project_id => node,
            _ => return Err(WorkbenchError::NotFound(format!("node {node_id}"))),
        };

        let Some(target_id) = new_parent_id else {
            return Ok(node);
        };

        let target = self
            .fetch(target_id)
            .await?
            .ok_or_else(|| WorkbenchError::NotFound(format!("target folder {target_id}")))?;

        if target.project_id != project_id {
            return Err(WorkbenchError::InvalidTarget(format!(
                "{target_id} belongs to another project"
            )));
        }
        if !target.is_folder() {
            return Err(WorkbenchError::InvalidTarget(format!(
                "{target_id} is not a folder"
            )));
        }

        if node.is_folder() && (target_id == node_id || self.is_descendant(target_id, node_id).await?) {
            return Err(WorkbenchError::CyclicMove {
                node: node_id.to_string(),
                target: target_id.to_string(),
            });
        }

        Ok(node)
    }

    /// Whether `ancestor_id` appears on the parent chain above `candidate_id`.
    ///
    /// A node is not its own descendant. If the chain is longer than the
    /// project or loops, the data is corrupt: an error is logged and `true`
    /// is returned so callers refuse the change.
    pub async fn is_descendant(&self, candidate_id: NodeId, ancestor_id: NodeId) -> Result<bool> {
        let Some(candidate) = self.fetch(candidate_id).await? else {
            return Ok(false);
        };

        let bound = self.project_node_count(candidate.project_id).await?;
        let mut visited = HashSet::from([candidate_id]);
        let mut steps = 0u64;
        let mut current = candidate.parent_id;

        while let Some(parent_id) = current {
            if parent_id == ancestor_id {
                return Ok(true);
            }
            if !visited.insert(parent_id) || steps >= bound {
                error!(
                    node_id = %candidate_id,
                    project_id = %candidate.project_id,
                    steps = steps,
                    "Parent chain loops or exceeds project size"
                );
                return Ok(true);
            }
            steps += 1;

            current = match self.fetch(parent_id).await? {
                Some(parent) => parent.parent_id,
                None => None,
            };
        }

        Ok(false)
    }

    /// Every node below `folder_id`, parents before their descendants.
    ///
    /// Within a level, nodes are grouped by the position of their parent in
    /// the previous level and ordered by name, then ID.
    pub async fn get_all_descendants(&self, folder_id: NodeId) -> Result<Vec<FileNode>> {
        let root = self.require(folder_id).await?;
        let repo = self.nodes();

        let mut result = Vec::new();
        let mut seen = HashSet::from([root.id]);
        let mut frontier = vec![root.id];

        while !frontier.is_empty() {
            let position: HashMap<NodeId, usize> =
                frontier.iter().enumerate().map(|(i, id)| (*id, i)).collect();

            let mut level = Vec::new();
            for batch in frontier.chunks(MAX_BATCH) {
                let filter = NodeFilter::new()
                    .project(root.project_id)
                    .parent_in(batch.to_vec());
                let children = self
                    .retry
                    .with_retry(
                        "file_nodes.find",
                        &format!("descendants of {folder_id}"),
                        || repo.find(&filter),
                    )
                    .await?;
                level.extend(children);
            }

            // Store order is name then ID; a stable sort keeps it per parent.
            level.sort_by_key(|node| {
                node.parent_id
                    .and_then(|p| position.get(&p).copied())
                    .unwrap_or(usize::MAX)
            });

            let mut next = Vec::new();
            for node in level {
                if !seen.insert(node.id) {
                    error!(
                        node_id = %node.id,
                        folder_id = %folder_id,
                        "Node reached twice while collecting descendants"
                    );
                    continue;
                }
                if node.is_folder() {
                    next.push(node.id);
                }
                result.push(node);
            }
            frontier = next;
        }

        debug!(folder_id = %folder_id, count = result.len(), "Collected descendants");
        Ok(result)
    }

    /// Total size in bytes of every file below a folder.
    pub async fn calculate_folder_size(&self, folder_id: NodeId) -> Result<u64> {
        let folder = self.require(folder_id).await?;
        if !folder.is_folder() {
            return Err(WorkbenchError::InvalidTarget(format!(
                "{folder_id} is not a folder"
            )));
        }

        let size = self
            .get_all_descendants(folder_id)
            .await?
            .iter()
            .filter(|node| node.is_file())
            .fold(0u64, |total, node| total.saturating_add(node.size));

        Ok(size)
    }

    /// Slash-separated names from the root down to the node.
    ///
    /// A dangling parent reference ends the walk as if the node above were
    /// the root.
    pub async fn get_file_path(&self, node_id: NodeId) -> Result<String> {
        let node = self.require(node_id).await?;
        let bound = self.project_node_count(node.project_id).await?;

        let mut names = vec![node.name];
        let mut visited = HashSet::from([node.id]);
        let mut current = node.parent_id;

        while let Some(parent_id) = current {
            if !visited.insert(parent_id) || visited.len() as u64 > bound {
                error!(
                    node_id = %node_id,
                    project_id = %node.project_id,
                    "Parent chain loops or exceeds project size, path truncated"
                );
                break;
            }
            match self.fetch(parent_id).await? {
                Some(parent) => {
                    current = parent.parent_id;
                    names.push(parent.name);
                }
                None => break,
            }
        }

        names.reverse();
        Ok(names.join("/"))
    }

    /// Whether a sibling named `name` exists under `parent_id`, ignoring
    /// `exclude_id`.
    pub async fn check_naming_conflict(
        &self,
        project_id: ProjectId,
        name: &str,
        parent_id: Option<NodeId>,
        exclude_id: Option<NodeId>,
    ) -> Result<bool> {
        let repo = self.nodes();
        let filter = NodeFilter::new()
            .project(project_id)
            .parent(parent_id)
            .name(name)
            .exclude(exclude_id);

        let count = self
            .retry
            .with_retry(
                "file_nodes.count",
                &format!("name={name:?} project={project_id}"),
                || repo.count(&filter),
            )
            .await?;

        Ok(count > 0)
    }

    /// `base_name` if it is free under `parent_id`, otherwise the first free
    /// `"{stem} ({n}){ext}"`.
    ///
    /// At most one more candidate than there are siblings is tried; running
    /// out means siblings were added concurrently and yields `NameConflict`.
    pub async fn generate_unique_name(
        &self,
        project_id: ProjectId,
        base_name: &str,
        parent_id: Option<NodeId>,
        exclude_id: Option<NodeId>,
    ) -> Result<String> {
        let repo = self.nodes();
        let filter = NodeFilter::new()
            .project(project_id)
            .parent(parent_id)
            .exclude(exclude_id);

        let siblings = self
            .retry
            .with_retry(
                "file_nodes.find",
                &format!("siblings of {base_name:?} project={project_id}"),
                || repo.find(&filter),
            )
            .await?;
        let taken: HashSet<&str> = siblings.iter().map(|node| node.name.as_str()).collect();

        if !taken.contains(base_name) {
            return Ok(base_name.to_string());
        }

        for n in 1..=siblings.len() + 1 {
            let candidate = numbered_name(base_name, n);
            if !taken.contains(candidate.as_str()) {
                debug!(base = %base_name, name = %candidate, "Generated unique name");
                return Ok(candidate);
            }
        }

        Err(WorkbenchError::NameConflict(format!(
            "no free name for {base_name:?}"
        )))
    }
}
