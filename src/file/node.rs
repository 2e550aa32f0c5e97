//! File node types for Workbench.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::{NodeId, ProjectId};
use crate::{Result, WorkbenchError};

/// MIME type recorded for folders.
pub const FOLDER_MIME_TYPE: &str = "inode/directory";

/// Kind of a file node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// A file with blob content.
    File,
    /// A folder that may contain other nodes.
    Folder,
}

impl NodeType {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::Folder => "folder",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(NodeType::File),
            "folder" => Ok(NodeType::Folder),
            other => Err(WorkbenchError::Database(format!(
                "unknown node type: {other}"
            ))),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file or folder inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    /// Unique node ID.
    pub id: NodeId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Name, unique among siblings.
    pub name: String,
    /// File or folder.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Containing folder (None for root level).
    pub parent_id: Option<NodeId>,
    /// Blob store key of the content (files only).
    pub content_ref: Option<String>,
    /// Size in bytes (0 for folders).
    pub size: u64,
    /// MIME type.
    pub mime_type: String,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// When the node was last modified.
    pub updated_at: DateTime<Utc>,
}

impl FileNode {
    /// Whether this node is a folder.
    pub fn is_folder(&self) -> bool {
        self.node_type == NodeType::Folder
    }

    /// Whether this node is a file.
    pub fn is_file(&self) -> bool {
        self.node_type == NodeType::File
    }
}

/// Blob store key for a file's content.
pub fn blob_key(project_id: ProjectId, file_id: NodeId, file_name: &str) -> String {
    format!("projects/{project_id}/files/{file_id}/{file_name}")
}

/// Data for creating a new node.
///
/// The ID is allocated up front so a file's blob key can be derived before
/// the record is written.
#[derive(Debug, Clone)]
pub struct NewFileNode {
    /// ID the node will be stored under.
    pub id: NodeId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Node name.
    pub name: String,
    /// File or folder.
    pub node_type: NodeType,
    /// Containing folder.
    pub parent_id: Option<NodeId>,
    /// Blob key (files only).
    pub content_ref: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// MIME type.
    pub mime_type: String,
}

impl NewFileNode {
    /// A new folder.
    pub fn folder(project_id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            project_id,
            name: name.into(),
            node_type: NodeType::Folder,
            parent_id: None,
            content_ref: None,
            size: 0,
            mime_type: FOLDER_MIME_TYPE.to_string(),
        }
    }

    /// A new file. The content reference is derived from the project, ID and name.
    pub fn file(project_id: ProjectId, name: impl Into<String>, size: u64) -> Self {
        let id = NodeId::new();
        let name = name.into();
        Self {
            id,
            project_id,
            content_ref: Some(blob_key(project_id, id, &name)),
            mime_type: super::naming::guess_mime_type(&name),
            name,
            node_type: NodeType::File,
            parent_id: None,
            size,
        }
    }

    /// Set the parent folder.
    pub fn with_parent(mut self, parent_id: Option<NodeId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Override the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

/// Builder for updating a node.
#[derive(Debug, Clone, Default)]
pub struct FileNodeUpdate {
    /// New name.
    pub name: Option<String>,
    /// New parent.
    pub parent_id: Option<Option<NodeId>>,
    /// New size.
    pub size: Option<u64>,
    /// New MIME type.
    pub mime_type: Option<String>,
}

impl FileNodeUpdate {
    /// Create a new FileNodeUpdate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the parent folder.
    pub fn parent_id(mut self, parent_id: Option<NodeId>) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set the size.
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the MIME type.
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Check if any fields are set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.parent_id.is_none()
            && self.size.is_none()
            && self.mime_type.is_none()
    }
}

/// Parent constraint of a [`NodeFilter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentFilter {
    /// Root-level nodes only.
    Root,
    /// Children of one folder.
    Id(NodeId),
    /// Children of any folder in the set.
    AnyOf(Vec<NodeId>),
}

impl From<Option<NodeId>> for ParentFilter {
    fn from(parent_id: Option<NodeId>) -> Self {
        match parent_id {
            Some(id) => ParentFilter::Id(id),
            None => ParentFilter::Root,
        }
    }
}

/// Equality filter over file nodes. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    /// Owning project.
    pub project_id: Option<ProjectId>,
    /// Parent constraint.
    pub parent: Option<ParentFilter>,
    /// Exact name.
    pub name: Option<String>,
    /// Node kind.
    pub node_type: Option<NodeType>,
    /// ID inclusion set.
    pub ids: Option<Vec<NodeId>>,
    /// One ID to leave out.
    pub exclude_id: Option<NodeId>,
}

impl NodeFilter {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one project.
    pub fn project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Restrict by parent.
    pub fn parent(mut self, parent: impl Into<ParentFilter>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Restrict to children of any of the given folders.
    pub fn parent_in(mut self, parents: Vec<NodeId>) -> Self {
        self.parent = Some(ParentFilter::AnyOf(parents));
        self
    }

    /// Restrict to an exact name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restrict to one node kind.
    pub fn node_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    /// Restrict to the given IDs.
    pub fn ids(mut self, ids: Vec<NodeId>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Leave one node out.
    pub fn exclude(mut self, id: Option<NodeId>) -> Self {
        self.exclude_id = id;
        self
    }

    /// Whether the filter constrains nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Whether the filter can match nothing (an empty inclusion set).
    pub fn matches_nothing(&self) -> bool {
        matches!(self.ids, Some(ref ids) if ids.is_empty())
            || matches!(self.parent, Some(ParentFilter::AnyOf(ref parents)) if parents.is_empty())
    }
}
