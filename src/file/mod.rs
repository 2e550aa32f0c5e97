//! File tree module for Workbench.
//!
//! This module provides the files and folders of a project:
//! - Node records and their repository
//! - Pure tree building from flat records
//! - Hierarchy checks (moves, descendants, sizes, paths, naming conflicts)
//! - Blob storage for file content
//! - The file service that ties them together

mod hierarchy;
mod naming;
mod node;
mod repository;
mod service;
mod storage;
mod tree;

pub use hierarchy::HierarchyEngine;
pub use naming::{guess_mime_type, numbered_name, split_name, validate_name};
pub use node::{
    blob_key, FileNode, FileNodeUpdate, NewFileNode, NodeFilter, NodeType, ParentFilter,
    FOLDER_MIME_TYPE,
};
pub use repository::FileNodeRepository;
pub(crate) use service::purge_blobs;
pub use service::{ConflictPolicy, CreateFileRequest, DeleteReport, FileContent, FileService};
pub use storage::{validate_key, BlobDeleteSummary, BlobStore, FsBlobStore, MemoryBlobStore};
pub use tree::{build_tree, count_nodes, NodeArena, TreeNode};

/// Maximum length for a node name (in UTF-16 code units).
pub const MAX_NAME_LENGTH: usize = 255;

/// Default maximum file size (10MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
