//! Workbench - project file trees for a browser IDE
//!
//! Hierarchical files and folders kept as flat records in a record store,
//! with file content in a blob store and every store write behind a retry
//! layer.

pub mod config;
pub mod db;
pub mod error;
pub mod file;
pub mod ids;
pub mod logging;
pub mod project;
pub mod reliability;

pub use config::Config;
pub use db::Database;
pub use error::{Result, StoreFailure, WorkbenchError};
pub use file::{
    build_tree, BlobStore, ConflictPolicy, CreateFileRequest, DeleteReport, FileNode,
    FileService, FsBlobStore, HierarchyEngine, MemoryBlobStore, NodeType, TreeNode,
};
pub use ids::{NodeId, ProjectId};
pub use project::{NewProject, Project, ProjectService, ProjectUpdate};
pub use reliability::{HealthCheck, RetryConfig, RetryExecutor};
