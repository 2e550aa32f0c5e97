//! File service for Workbench.
//!
//! This module provides the operations a controller calls on a project's
//! file tree:
//! - Create files and folders with name conflict handling
//! - Read and replace file content
//! - Rename, move and delete (cascading) nodes
//! - Load the whole tree of a project

use tracing::{info, warn};

use crate::db::Database;
use crate::ids::{NodeId, ProjectId};
use crate::project::ProjectRepository;
use crate::reliability::RetryExecutor;
use crate::{Result, WorkbenchError};

use super::hierarchy::HierarchyEngine;
use super::naming::{guess_mime_type, validate_name};
use super::node::{FileNode, FileNodeUpdate, NewFileNode, NodeFilter};
use super::repository::FileNodeRepository;
use super::storage::{BlobDeleteSummary, BlobStore};
use super::tree::{build_tree, TreeNode};
use super::DEFAULT_MAX_FILE_SIZE;

/// What to do when the requested name is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Fail with `NameConflict`.
    #[default]
    Reject,
    /// Pick the next free `"{stem} ({n}){ext}"` name.
    Rename,
}

/// Request data for creating a file.
#[derive(Debug, Clone)]
pub struct CreateFileRequest {
    /// Project to create the file in.
    pub project_id: ProjectId,
    /// Containing folder (None for the project root).
    pub parent_id: Option<NodeId>,
    /// File name.
    pub name: String,
    /// File content.
    pub content: Vec<u8>,
    /// MIME type (guessed from the name when unset).
    pub mime_type: Option<String>,
    /// Conflict handling.
    pub on_conflict: ConflictPolicy,
}

impl CreateFileRequest {
    /// Create a new request for a root-level file.
    pub fn new(project_id: ProjectId, name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            project_id,
            parent_id: None,
            name: name.into(),
            content,
            mime_type: None,
            on_conflict: ConflictPolicy::Reject,
        }
    }

    /// Set the parent folder.
    pub fn with_parent(mut self, parent_id: Option<NodeId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Set the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Set the conflict policy.
    pub fn on_conflict(mut self, policy: ConflictPolicy) -> Self {
        self.on_conflict = policy;
        self
    }
}

/// A file record together with its content.
#[derive(Debug)]
pub struct FileContent {
    /// File record.
    pub node: FileNode,
    /// File content.
    pub content: Vec<u8>,
}

/// Outcome of a cascading delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Records removed, including the deleted node itself.
    pub removed_nodes: u64,
    /// Blobs removed.
    pub removed_blobs: usize,
    /// Blob keys that could not be removed and are now orphaned.
    pub failed_blobs: Vec<String>,
}

/// Translate a duplicate-key store error into a name conflict.
fn name_conflict(err: WorkbenchError, name: &str) -> WorkbenchError {
    if err.is_duplicate() {
        WorkbenchError::NameConflict(format!("{name:?} already exists in the target folder"))
    } else {
        err
    }
}

/// Delete blobs in one batch, then retry the failures one by one.
pub(crate) async fn purge_blobs(
    blobs: &dyn BlobStore,
    retry: &RetryExecutor,
    keys: &[String],
) -> BlobDeleteSummary {
    if keys.is_empty() {
        return BlobDeleteSummary::default();
    }

    let mut summary = match retry
        .with_retry("blobs.delete_many", &format!("{} keys", keys.len()), || {
            blobs.delete_many(keys)
        })
        .await
    {
        Ok(summary) => summary,
        Err(e) => {
            warn!(keys = keys.len(), error = %e, "Batch blob delete failed");
            BlobDeleteSummary {
                failed: keys.to_vec(),
                ..BlobDeleteSummary::default()
            }
        }
    };
    let pending = std::mem::take(&mut summary.failed);

    for key in pending {
        match retry
            .with_retry("blobs.delete", &key, || blobs.delete(&key))
            .await
        {
            Ok(true) => summary.deleted += 1,
            Ok(false) => summary.missing += 1,
            Err(e) => {
                warn!(key = %key, error = %e, "Blob left behind after delete");
                summary.failed.push(key);
            }
        }
    }

    summary
}

/// File service for a project's files and folders.
pub struct FileService<'a> {
    db: &'a Database,
    blobs: &'a dyn BlobStore,
    retry: &'a RetryExecutor,
    max_file_size: u64,
}

impl<'a> FileService<'a> {
    /// Create a new FileService.
    pub fn new(db: &'a Database, blobs: &'a dyn BlobStore, retry: &'a RetryExecutor) -> Self {
        Self {
            db,
            blobs,
            retry,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Create a new FileService with a custom max file size.
    pub fn with_max_file_size(mut self, max_size: u64) -> Self {
        self.max_file_size = max_size;
        self
    }

    /// Largest accepted file content, in bytes.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// The hierarchy engine over the same store.
    pub fn hierarchy(&self) -> HierarchyEngine<'a> {
        HierarchyEngine::new(self.db, self.retry)
    }

    fn nodes(&self) -> FileNodeRepository<'a> {
        FileNodeRepository::new(self.db.pool())
    }

    async fn require_project(&self, project_id: ProjectId) -> Result<()> {
        let repo = ProjectRepository::new(self.db.pool());
        let project = self
            .retry
            .with_retry("projects.find_by_id", &format!("project={project_id}"), || {
                repo.get_by_id(project_id)
            })
            .await?;

        match project {
            Some(_) => Ok(()),
            None => Err(WorkbenchError::NotFound(format!("project {project_id}"))),
        }
    }

    /// Check that a creation target is a folder of the project.
    async fn require_parent(&self, project_id: ProjectId, parent_id: Option<NodeId>) -> Result<()> {
        let Some(parent_id) = parent_id else {
            return Ok(());
        };

        let parent = self
            .hierarchy()
            .fetch(parent_id)
            .await?
            .ok_or_else(|| WorkbenchError::NotFound(format!("parent folder {parent_id}")))?;

        if parent.project_id != project_id {
            return Err(WorkbenchError::InvalidTarget(format!(
                "{parent_id} belongs to another project"
            )));
        }
        if !parent.is_folder() {
            return Err(WorkbenchError::InvalidTarget(format!(
                "{parent_id} is not a folder"
            )));
        }
        Ok(())
    }

    async fn resolve_name(
        &self,
        project_id: ProjectId,
        name: &str,
        parent_id: Option<NodeId>,
        policy: ConflictPolicy,
    ) -> Result<String> {
        let engine = self.hierarchy();
        match policy {
            ConflictPolicy::Rename => {
                engine
                    .generate_unique_name(project_id, name, parent_id, None)
                    .await
            }
            ConflictPolicy::Reject => {
                if engine
                    .check_naming_conflict(project_id, name, parent_id, None)
                    .await?
                {
                    return Err(WorkbenchError::NameConflict(format!(
                        "{name:?} already exists in the target folder"
                    )));
                }
                Ok(name.to_string())
            }
        }
    }

    async fn insert(&self, node: &NewFileNode) -> Result<FileNode> {
        let repo = self.nodes();
        self.retry
            .with_retry(
                "file_nodes.insert",
                &format!("name={:?} project={}", node.name, node.project_id),
                || repo.insert(node),
            )
            .await
            .map_err(|e| name_conflict(e, &node.name))
    }

    async fn update(&self, id: NodeId, update: &FileNodeUpdate, name: &str) -> Result<FileNode> {
        let repo = self.nodes();
        self.retry
            .with_retry("file_nodes.update", &format!("node={id}"), || {
                repo.update_by_id(id, update)
            })
            .await
            .map_err(|e| name_conflict(e, name))?
            .ok_or_else(|| WorkbenchError::NotFound(format!("node {id}")))
    }

    /// Load every node of a project as an ordered forest.
    ///
    /// This is a plain read and does not go through the retry layer.
    pub async fn get_tree(&self, project_id: ProjectId) -> Result<Vec<TreeNode>> {
        if ProjectRepository::new(self.db.pool())
            .get_by_id(project_id)
            .await?
            .is_none()
        {
            return Err(WorkbenchError::NotFound(format!("project {project_id}")));
        }

        let nodes = self
            .nodes()
            .find(&NodeFilter::new().project(project_id))
            .await?;
        Ok(build_tree(nodes))
    }

    /// Get one node of a project.
    pub async fn get_node(&self, project_id: ProjectId, node_id: NodeId) -> Result<FileNode> {
        match self.hierarchy().fetch(node_id).await? {
            Some(node) if node.project_id == project_id => Ok(node),
            _ => Err(WorkbenchError::NotFound(format!("node {node_id}"))),
        }
    }

    /// Create a folder.
    pub async fn create_folder(
        &self,
        project_id: ProjectId,
        name: &str,
        parent_id: Option<NodeId>,
        policy: ConflictPolicy,
    ) -> Result<FileNode> {
        validate_name(name)?;
        self.require_project(project_id).await?;
        self.require_parent(project_id, parent_id).await?;

        let name = self.resolve_name(project_id, name, parent_id, policy).await?;
        let folder = self
            .insert(&NewFileNode::folder(project_id, name).with_parent(parent_id))
            .await?;

        info!(
            node_id = %folder.id,
            project_id = %project_id,
            name = %folder.name,
            "Folder created"
        );
        Ok(folder)
    }

    /// Create a file: store the content, then the record.
    ///
    /// If the record cannot be written the blob is removed again.
    pub async fn create_file(&self, request: &CreateFileRequest) -> Result<FileNode> {
        validate_name(&request.name)?;
        let size = request.content.len() as u64;
        if size > self.max_file_size {
            return Err(WorkbenchError::Validation(format!(
                "file is too large ({size} bytes, limit {} bytes)",
                self.max_file_size
            )));
        }

        self.require_project(request.project_id).await?;
        self.require_parent(request.project_id, request.parent_id)
            .await?;

        let name = self
            .resolve_name(
                request.project_id,
                &request.name,
                request.parent_id,
                request.on_conflict,
            )
            .await?;

        let mut new_file =
            NewFileNode::file(request.project_id, name, size).with_parent(request.parent_id);
        if let Some(ref mime_type) = request.mime_type {
            new_file = new_file.with_mime_type(mime_type.clone());
        }
        let Some(key) = new_file.content_ref.clone() else {
            return Err(WorkbenchError::Validation(
                "file has no content reference".to_string(),
            ));
        };

        self.retry
            .with_retry("blobs.put", &key, || {
                self.blobs
                    .put(&key, &request.content, Some(new_file.mime_type.as_str()))
            })
            .await?;

        let file = match self.insert(&new_file).await {
            Ok(file) => file,
            Err(e) => {
                if let Err(cleanup) = self
                    .retry
                    .with_retry("blobs.delete", &key, || self.blobs.delete(&key))
                    .await
                {
                    warn!(key = %key, error = %cleanup, "Blob left behind after failed create");
                }
                return Err(e);
            }
        };

        info!(
            node_id = %file.id,
            project_id = %file.project_id,
            name = %file.name,
            size = file.size,
            "File created"
        );
        Ok(file)
    }

    /// Read a file's record and content.
    pub async fn read_content(&self, project_id: ProjectId, node_id: NodeId) -> Result<FileContent> {
        let node = self.get_node(project_id, node_id).await?;
        let Some(key) = node.content_ref.clone() else {
            return Err(WorkbenchError::InvalidTarget(format!("{node_id} is a folder")));
        };

        let content = self
            .retry
            .with_retry("blobs.get", &key, || self.blobs.get(&key))
            .await?;

        Ok(FileContent { node, content })
    }

    /// Replace a file's content.
    pub async fn update_content(
        &self,
        project_id: ProjectId,
        node_id: NodeId,
        content: &[u8],
    ) -> Result<FileNode> {
        let node = self.get_node(project_id, node_id).await?;
        let Some(key) = node.content_ref.clone() else {
            return Err(WorkbenchError::InvalidTarget(format!("{node_id} is a folder")));
        };

        let size = content.len() as u64;
        if size > self.max_file_size {
            return Err(WorkbenchError::Validation(format!(
                "file is too large ({size} bytes, limit {} bytes)",
                self.max_file_size
            )));
        }

        self.retry
            .with_retry("blobs.put", &key, || {
                self.blobs.put(&key, content, Some(node.mime_type.as_str()))
            })
            .await?;

        self.update(node_id, &FileNodeUpdate::new().size(size), &node.name)
            .await
    }

    /// Rename a node within its folder.
    ///
    /// A file's MIME type is re-derived from the new name.
    pub async fn rename(
        &self,
        project_id: ProjectId,
        node_id: NodeId,
        new_name: &str,
    ) -> Result<FileNode> {
        validate_name(new_name)?;
        let node = self.get_node(project_id, node_id).await?;
        if node.name == new_name {
            return Ok(node);
        }

        if self
            .hierarchy()
            .check_naming_conflict(project_id, new_name, node.parent_id, Some(node_id))
            .await?
        {
            return Err(WorkbenchError::NameConflict(format!(
                "{new_name:?} already exists in the target folder"
            )));
        }

        let mut update = FileNodeUpdate::new().name(new_name);
        if node.is_file() {
            update = update.mime_type(guess_mime_type(new_name));
        }

        let renamed = self.update(node_id, &update, new_name).await?;
        info!(node_id = %node_id, from = %node.name, to = %renamed.name, "Node renamed");
        Ok(renamed)
    }

    /// Move a node under another folder, or to the project root.
    pub async fn move_node(
        &self,
        project_id: ProjectId,
        node_id: NodeId,
        new_parent_id: Option<NodeId>,
    ) -> Result<FileNode> {
        let engine = self.hierarchy();
        let node = engine
            .validate_move(node_id, new_parent_id, project_id)
            .await?;
        if node.parent_id == new_parent_id {
            return Ok(node);
        }

        if engine
            .check_naming_conflict(project_id, &node.name, new_parent_id, Some(node_id))
            .await?
        {
            return Err(WorkbenchError::NameConflict(format!(
                "{:?} already exists in the target folder",
                node.name
            )));
        }

        let moved = self
            .update(
                node_id,
                &FileNodeUpdate::new().parent_id(new_parent_id),
                &node.name,
            )
            .await?;

        info!(
            node_id = %node_id,
            parent_id = ?new_parent_id,
            "Node moved"
        );
        Ok(moved)
    }

    /// Delete a node and, for folders, everything below it.
    ///
    /// Runs in steps: collect descendants, delete blobs, delete descendant
    /// records, delete the node record. Blob failures are logged and
    /// reported; record cleanup continues regardless.
    pub async fn delete_node(&self, project_id: ProjectId, node_id: NodeId) -> Result<DeleteReport> {
        let node = self.get_node(project_id, node_id).await?;
        let descendants = if node.is_folder() {
            self.hierarchy().get_all_descendants(node_id).await?
        } else {
            Vec::new()
        };

        let keys: Vec<String> = std::iter::once(&node)
            .chain(descendants.iter())
            .filter_map(|n| n.content_ref.clone())
            .collect();
        let blobs = purge_blobs(self.blobs, self.retry, &keys).await;
        if !blobs.failed.is_empty() {
            warn!(
                node_id = %node_id,
                failed = blobs.failed.len(),
                "Some blobs could not be deleted"
            );
        }

        let repo = self.nodes();
        let mut removed_nodes = 0;

        let ids: Vec<NodeId> = descendants.iter().map(|n| n.id).collect();
        for batch in ids.chunks(500) {
            let filter = NodeFilter::new().project(project_id).ids(batch.to_vec());
            removed_nodes += self
                .retry
                .with_retry(
                    "file_nodes.delete_many",
                    &format!("descendants of {node_id}"),
                    || repo.delete_many(&filter),
                )
                .await?;
        }

        if self
            .retry
            .with_retry("file_nodes.delete_by_id", &format!("node={node_id}"), || {
                repo.delete_by_id(node_id)
            })
            .await?
        {
            removed_nodes += 1;
        }

        info!(
            node_id = %node_id,
            project_id = %project_id,
            removed_nodes = removed_nodes,
            removed_blobs = blobs.deleted,
            "Node deleted"
        );

        Ok(DeleteReport {
            removed_nodes,
            removed_blobs: blobs.deleted,
            failed_blobs: blobs.failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::db::DbPool;
    use crate::file::storage::MemoryBlobStore;
    use crate::file::MAX_NAME_LENGTH;
    use crate::file::tree::count_nodes;
    use crate::project::NewProject;
    use crate::reliability::RetryConfig;

    struct Fixture {
        db: Database,
        blobs: MemoryBlobStore,
        retry: RetryExecutor,
        project: ProjectId,
    }

    impl Fixture {
        async fn new() -> Self {
            let db = Database::open_in_memory().await.unwrap();
            let project = ProjectRepository::new(db.pool())
                .create(&NewProject::new("user-1", "demo"))
                .await
                .unwrap();
            Self {
                db,
                blobs: MemoryBlobStore::new(),
                retry: RetryExecutor::new(RetryConfig::disabled()),
                project: project.id,
            }
        }

        fn service(&self) -> FileService<'_> {
            FileService::new(&self.db, &self.blobs, &self.retry)
        }
    }

    /// Blob store whose deletes always fail.
    struct StuckBlobStore {
        inner: MemoryBlobStore,
        delete_calls: AtomicU32,
    }

    #[async_trait]
    impl BlobStore for StuckBlobStore {
        async fn put(&self, key: &str, data: &[u8], content_type: Option<&str>) -> Result<()> {
            self.inner.put(key, data, content_type).await
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.inner.get(key).await
        }

        async fn delete(&self, _key: &str) -> Result<bool> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            Err(WorkbenchError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only bucket",
            )))
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }
    }

    /// Blob store that plants a same-named record on every put, the way a
    /// concurrent writer would, and whose first delete times out.
    struct RacingBlobStore {
        inner: MemoryBlobStore,
        pool: DbPool,
        delete_calls: AtomicU32,
    }

    #[async_trait]
    impl BlobStore for RacingBlobStore {
        async fn put(&self, key: &str, data: &[u8], content_type: Option<&str>) -> Result<()> {
            let project = ProjectRepository::new(&self.pool)
                .list_by_user("user-1")
                .await?
                .remove(0);
            FileNodeRepository::new(&self.pool)
                .insert(&NewFileNode::folder(project.id, "App.js"))
                .await?;
            self.inner.put(key, data, content_type).await
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<bool> {
            if self.delete_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(WorkbenchError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "bucket timed out",
                )));
            }
            self.inner.delete(key).await
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }
    }

    #[tokio::test]
    async fn test_failed_create_removes_blob_with_retry() {
        let fx = Fixture::new().await;
        let blobs = RacingBlobStore {
            inner: MemoryBlobStore::new(),
            pool: fx.db.pool().clone(),
            delete_calls: AtomicU32::new(0),
        };
        let retry = RetryExecutor::new(
            RetryConfig::default()
                .with_base_delay(std::time::Duration::from_millis(1))
                .with_max_jitter(std::time::Duration::ZERO),
        );
        let service = FileService::new(&fx.db, &blobs, &retry);

        let err = service
            .create_file(&CreateFileRequest::new(fx.project, "App.js", b"x".to_vec()))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkbenchError::NameConflict(_)));
        // The timed-out cleanup was retried and the blob is gone
        assert_eq!(blobs.delete_calls.load(Ordering::SeqCst), 2);
        assert!(blobs.inner.is_empty());
    }

    #[tokio::test]
    async fn test_create_file_stores_blob() {
        let fx = Fixture::new().await;
        let service = fx.service();

        let src = service
            .create_folder(fx.project, "src", None, ConflictPolicy::Reject)
            .await
            .unwrap();
        let file = service
            .create_file(
                &CreateFileRequest::new(fx.project, "App.js", b"export default 1;".to_vec())
                    .with_parent(Some(src.id)),
            )
            .await
            .unwrap();

        assert_eq!(file.size, 17);
        assert_eq!(file.parent_id, Some(src.id));
        let key = file.content_ref.clone().unwrap();
        assert_eq!(fx.blobs.get(&key).await.unwrap(), b"export default 1;");
        assert_eq!(fx.blobs.content_type(&key), Some(file.mime_type.clone()));

        let read = service.read_content(fx.project, file.id).await.unwrap();
        assert_eq!(read.content, b"export default 1;");
        assert_eq!(read.node.id, file.id);
    }

    #[tokio::test]
    async fn test_create_conflict_policies() {
        let fx = Fixture::new().await;
        let service = fx.service();
        let request = CreateFileRequest::new(fx.project, "App.js", b"1".to_vec());

        service.create_file(&request).await.unwrap();

        let err = service.create_file(&request).await.unwrap_err();
        assert!(matches!(err, WorkbenchError::NameConflict(_)));
        // Rejected creates leave no blob behind
        assert_eq!(fx.blobs.len(), 1);

        let renamed = request.clone().on_conflict(ConflictPolicy::Rename);
        assert_eq!(service.create_file(&renamed).await.unwrap().name, "App (1).js");
        assert_eq!(service.create_file(&renamed).await.unwrap().name, "App (2).js");

        let folder = service
            .create_folder(fx.project, "App.js", None, ConflictPolicy::Rename)
            .await
            .unwrap();
        assert_eq!(folder.name, "App (3).js");
    }

    #[tokio::test]
    async fn test_renamed_names_stay_within_limit() {
        let fx = Fixture::new().await;
        let service = fx.service();

        let long = "b".repeat(MAX_NAME_LENGTH);
        let first = service
            .create_folder(fx.project, &long, None, ConflictPolicy::Rename)
            .await
            .unwrap();
        let second = service
            .create_folder(fx.project, &long, None, ConflictPolicy::Rename)
            .await
            .unwrap();
        assert_eq!(first.name, long);
        assert_ne!(second.name, long);
        assert_eq!(second.name.encode_utf16().count(), MAX_NAME_LENGTH);
        assert!(second.name.ends_with(" (1)"));

        let long_file = format!("{}.js", "a".repeat(MAX_NAME_LENGTH - 3));
        let request = CreateFileRequest::new(fx.project, long_file.as_str(), b"x".to_vec())
            .on_conflict(ConflictPolicy::Rename);
        service.create_file(&request).await.unwrap();
        let renamed = service.create_file(&request).await.unwrap();
        assert_eq!(renamed.name.encode_utf16().count(), MAX_NAME_LENGTH);
        assert!(renamed.name.ends_with(" (1).js"));
        assert!(validate_name(&renamed.name).is_ok());
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let fx = Fixture::new().await;
        let service = fx.service().with_max_file_size(4);
        let file = service
            .create_file(&CreateFileRequest::new(fx.project, "a.txt", b"1234".to_vec()))
            .await
            .unwrap();

        let too_big = CreateFileRequest::new(fx.project, "big.bin", b"12345".to_vec());
        assert!(matches!(
            service.create_file(&too_big).await,
            Err(WorkbenchError::Validation(_))
        ));
        assert!(matches!(
            service
                .create_folder(fx.project, "a/b", None, ConflictPolicy::Reject)
                .await,
            Err(WorkbenchError::Validation(_))
        ));
        assert!(matches!(
            service
                .create_folder(ProjectId::new(), "src", None, ConflictPolicy::Reject)
                .await,
            Err(WorkbenchError::NotFound(_))
        ));
        // A file cannot contain other nodes
        assert!(matches!(
            service
                .create_folder(fx.project, "src", Some(file.id), ConflictPolicy::Reject)
                .await,
            Err(WorkbenchError::InvalidTarget(_))
        ));
        assert!(matches!(
            service
                .create_folder(fx.project, "src", Some(NodeId::new()), ConflictPolicy::Reject)
                .await,
            Err(WorkbenchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_racing_insert_becomes_name_conflict() {
        let fx = Fixture::new().await;
        let service = fx.service();
        service
            .create_folder(fx.project, "src", None, ConflictPolicy::Reject)
            .await
            .unwrap();

        // Bypass the pre-check, as a concurrent writer would
        let err = service
            .insert(&NewFileNode::folder(fx.project, "src"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkbenchError::NameConflict(_)));
    }

    #[tokio::test]
    async fn test_update_content() {
        let fx = Fixture::new().await;
        let service = fx.service();
        let file = service
            .create_file(&CreateFileRequest::new(fx.project, "notes.md", b"draft".to_vec()))
            .await
            .unwrap();

        let updated = service
            .update_content(fx.project, file.id, b"final version")
            .await
            .unwrap();
        assert_eq!(updated.size, 13);
        assert_eq!(updated.content_ref, file.content_ref);

        let read = service.read_content(fx.project, file.id).await.unwrap();
        assert_eq!(read.content, b"final version");

        let folder = service
            .create_folder(fx.project, "docs", None, ConflictPolicy::Reject)
            .await
            .unwrap();
        assert!(matches!(
            service.update_content(fx.project, folder.id, b"x").await,
            Err(WorkbenchError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn test_rename() {
        let fx = Fixture::new().await;
        let service = fx.service();
        let a = service
            .create_file(&CreateFileRequest::new(fx.project, "a.txt", b"a".to_vec()))
            .await
            .unwrap();
        service
            .create_file(&CreateFileRequest::new(fx.project, "b.txt", b"b".to_vec()))
            .await
            .unwrap();

        let renamed = service.rename(fx.project, a.id, "page.html").await.unwrap();
        assert_eq!(renamed.name, "page.html");
        assert_eq!(renamed.mime_type, "text/html");

        // Renaming to its own name is a no-op
        assert_eq!(
            service.rename(fx.project, a.id, "page.html").await.unwrap().name,
            "page.html"
        );

        assert!(matches!(
            service.rename(fx.project, a.id, "b.txt").await,
            Err(WorkbenchError::NameConflict(_))
        ));
        assert!(matches!(
            service.rename(fx.project, a.id, "..").await,
            Err(WorkbenchError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_move_node() {
        let fx = Fixture::new().await;
        let service = fx.service();
        let src = service
            .create_folder(fx.project, "src", None, ConflictPolicy::Reject)
            .await
            .unwrap();
        let lib = service
            .create_folder(fx.project, "lib", None, ConflictPolicy::Reject)
            .await
            .unwrap();
        let nested = service
            .create_folder(fx.project, "nested", Some(src.id), ConflictPolicy::Reject)
            .await
            .unwrap();
        let main = service
            .create_file(&CreateFileRequest::new(fx.project, "main.rs", b"fn main() {}".to_vec()))
            .await
            .unwrap();
        service
            .create_file(
                &CreateFileRequest::new(fx.project, "main.rs", b"".to_vec()).with_parent(Some(lib.id)),
            )
            .await
            .unwrap();

        let moved = service.move_node(fx.project, main.id, Some(src.id)).await.unwrap();
        assert_eq!(moved.parent_id, Some(src.id));

        let moved = service.move_node(fx.project, src.id, Some(lib.id)).await.unwrap();
        assert_eq!(moved.parent_id, Some(lib.id));
        assert_eq!(
            service.hierarchy().get_file_path(main.id).await.unwrap(),
            "lib/src/main.rs"
        );

        assert!(matches!(
            service.move_node(fx.project, src.id, Some(nested.id)).await,
            Err(WorkbenchError::CyclicMove { .. })
        ));
        assert!(matches!(
            service.move_node(fx.project, main.id, Some(lib.id)).await,
            Err(WorkbenchError::NameConflict(_))
        ));

        let back = service.move_node(fx.project, src.id, None).await.unwrap();
        assert!(back.parent_id.is_none());
    }

    #[tokio::test]
    async fn test_delete_folder_cascades() {
        let fx = Fixture::new().await;
        let service = fx.service();
        let src = service
            .create_folder(fx.project, "src", None, ConflictPolicy::Reject)
            .await
            .unwrap();
        let nested = service
            .create_folder(fx.project, "nested", Some(src.id), ConflictPolicy::Reject)
            .await
            .unwrap();
        service
            .create_file(&CreateFileRequest::new(fx.project, "a.js", b"a".to_vec()).with_parent(Some(src.id)))
            .await
            .unwrap();
        service
            .create_file(&CreateFileRequest::new(fx.project, "b.js", b"b".to_vec()).with_parent(Some(nested.id)))
            .await
            .unwrap();
        let keep = service
            .create_file(&CreateFileRequest::new(fx.project, "keep.txt", b"k".to_vec()))
            .await
            .unwrap();

        let report = service.delete_node(fx.project, src.id).await.unwrap();

        assert_eq!(report.removed_nodes, 4);
        assert_eq!(report.removed_blobs, 2);
        assert!(report.failed_blobs.is_empty());
        assert_eq!(fx.blobs.len(), 1);

        let tree = service.get_tree(fx.project).await.unwrap();
        assert_eq!(count_nodes(&tree), 1);
        assert_eq!(tree[0].node.id, keep.id);

        assert!(matches!(
            service.delete_node(fx.project, src.id).await,
            Err(WorkbenchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_continues_when_blobs_fail() {
        let fx = Fixture::new().await;
        let blobs = StuckBlobStore {
            inner: MemoryBlobStore::new(),
            delete_calls: AtomicU32::new(0),
        };
        let service = FileService::new(&fx.db, &blobs, &fx.retry);
        let file = service
            .create_file(&CreateFileRequest::new(fx.project, "a.txt", b"a".to_vec()))
            .await
            .unwrap();

        let report = service.delete_node(fx.project, file.id).await.unwrap();

        assert_eq!(report.removed_nodes, 1);
        assert_eq!(report.removed_blobs, 0);
        assert_eq!(report.failed_blobs, vec![file.content_ref.unwrap()]);
        // One batch attempt plus one retried attempt
        assert_eq!(blobs.delete_calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            service.get_node(fx.project, file.id).await,
            Err(WorkbenchError::NotFound(_))
        ));
    }

    /// Blob store whose batch delete is unavailable.
    struct NoBatchBlobStore {
        inner: MemoryBlobStore,
    }

    #[async_trait]
    impl BlobStore for NoBatchBlobStore {
        async fn put(&self, key: &str, data: &[u8], content_type: Option<&str>) -> Result<()> {
            self.inner.put(key, data, content_type).await
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<bool> {
            self.inner.delete(key).await
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }

        async fn delete_many(&self, _keys: &[String]) -> Result<BlobDeleteSummary> {
            Err(WorkbenchError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "batch delete not supported",
            )))
        }
    }

    #[tokio::test]
    async fn test_purge_falls_back_to_single_deletes() {
        let blobs = NoBatchBlobStore {
            inner: MemoryBlobStore::new(),
        };
        let retry = RetryExecutor::new(RetryConfig::disabled());
        blobs.put("a/1", b"1", None).await.unwrap();
        blobs.put("a/2", b"2", None).await.unwrap();

        let summary = purge_blobs(
            &blobs,
            &retry,
            &["a/1".to_string(), "a/2".to_string(), "a/3".to_string()],
        )
        .await;

        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.missing, 1);
        assert!(summary.failed.is_empty());
        assert!(blobs.inner.is_empty());
    }

    #[tokio::test]
    async fn test_get_tree() {
        let fx = Fixture::new().await;
        let service = fx.service();
        let src = service
            .create_folder(fx.project, "src", None, ConflictPolicy::Reject)
            .await
            .unwrap();
        service
            .create_file(&CreateFileRequest::new(fx.project, "README.md", b"#".to_vec()))
            .await
            .unwrap();
        service
            .create_file(&CreateFileRequest::new(fx.project, "main.rs", b"".to_vec()).with_parent(Some(src.id)))
            .await
            .unwrap();

        let tree = service.get_tree(fx.project).await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].node.name, "src");
        assert_eq!(tree[0].children[0].node.name, "main.rs");
        assert_eq!(tree[1].node.name, "README.md");

        assert!(matches!(
            service.get_tree(ProjectId::new()).await,
            Err(WorkbenchError::NotFound(_))
        ));
    }
}
