//! Blob storage for file content.
//!
//! File records only carry a key into the blob store; the bytes live here.
//! Keys are relative, slash-separated paths such as
//! `projects/{project}/files/{file}/{name}`.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Result, WorkbenchError};

/// Content store addressed by key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing any previous content.
    async fn put(&self, key: &str, data: &[u8], content_type: Option<&str>) -> Result<()>;

    /// Load the content stored under `key`.
    ///
    /// A missing key is reported as `NotFound`.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove the content stored under `key`. Returns false if it was absent.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Whether content exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remove several blobs. Per-key failures are collected rather than
    /// aborting the batch; an error means the batch as a whole failed.
    async fn delete_many(&self, keys: &[String]) -> Result<BlobDeleteSummary> {
        let mut summary = BlobDeleteSummary::default();
        for key in keys {
            match self.delete(key).await {
                Ok(true) => summary.deleted += 1,
                Ok(false) => summary.missing += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "Blob delete failed");
                    summary.failed.push(key.clone());
                }
            }
        }
        Ok(summary)
    }
}

/// Result of a batch blob delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobDeleteSummary {
    /// Blobs removed.
    pub deleted: usize,
    /// Keys that had no content.
    pub missing: usize,
    /// Keys whose delete failed.
    pub failed: Vec<String>,
}

/// Validate a blob key and normalise it to a relative path.
///
/// Rejects empty keys, absolute paths and any `..` component.
pub fn validate_key(key: &str) -> Result<PathBuf> {
    if key.is_empty() {
        return Err(WorkbenchError::Validation("blob key must not be empty".to_string()));
    }

    let path = Path::new(key);
    if path.is_absolute() {
        return Err(WorkbenchError::Validation(format!(
            "blob key must be relative: {key}"
        )));
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(WorkbenchError::Validation(format!(
                    "blob key must not leave the store: {key}"
                )));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(WorkbenchError::Validation(format!("blob key is empty: {key}")));
    }

    Ok(normalized)
}

fn normalized_key(key: &str) -> Result<String> {
    Ok(validate_key(key)?.to_string_lossy().replace('\\', "/"))
}

/// Longest path component most filesystems accept, in bytes.
const MAX_COMPONENT_BYTES: usize = 255;

/// On-disk name for one key segment.
///
/// Segments too long for the filesystem are replaced by `~` and the hex
/// SHA-256 of the segment.
fn fs_component(part: &OsStr) -> OsString {
    if part.len() <= MAX_COMPONENT_BYTES {
        return part.to_os_string();
    }
    let digest = Sha256::digest(part.as_encoded_bytes());
    OsString::from(format!("~{digest:x}"))
}

/// Blob store on the local filesystem.
///
/// Each key maps to a file below the base directory:
/// ```text
/// {base_path}/
/// └── projects/
///     └── {project_id}/
///         └── files/
///             └── {file_id}/
///                 └── App.js
/// ```
///
/// Key segments longer than the filesystem allows are stored under a
/// hashed name; the key itself is unchanged.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    base_path: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `base_path`, creating the directory if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    /// Get the base path of this store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = validate_key(key)?;
        let mut path = self.base_path.clone();
        for part in relative.iter() {
            path.push(fs_component(part));
        }
        Ok(path)
    }

    /// Remove empty directories between `path` and the base directory.
    async fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.base_path || !dir.starts_with(&self.base_path) {
                break;
            }
            // Fails on non-empty directories, which ends the walk.
            if tokio::fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: Option<&str>) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write beside the target and rename so readers never see a partial blob.
        let tmp = path.with_file_name(format!(".tmp-{}", Uuid::new_v4()));
        tokio::fs::write(&tmp, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(key = %key, size = data.len(), "Blob stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(WorkbenchError::NotFound(format!("blob {key}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.prune_empty_parents(&path).await;
                debug!(key = %key, "Blob deleted");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[derive(Debug, Clone)]
struct MemoryBlob {
    data: Vec<u8>,
    content_type: Option<String>,
}

/// Non-persistent blob store backed by a concurrent map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, MemoryBlob>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Content type recorded for a key, if any.
    pub fn content_type(&self, key: &str) -> Option<String> {
        let key = normalized_key(key).ok()?;
        self.blobs
            .get(&key)
            .and_then(|blob| blob.content_type.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: &[u8], content_type: Option<&str>) -> Result<()> {
        let key = normalized_key(key)?;
        self.blobs.insert(
            key,
            MemoryBlob {
                data: data.to_vec(),
                content_type: content_type.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let normalized = normalized_key(key)?;
        self.blobs
            .get(&normalized)
            .map(|blob| blob.data.clone())
            .ok_or_else(|| WorkbenchError::NotFound(format!("blob {key}")))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let key = normalized_key(key)?;
        Ok(self.blobs.remove(&key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = normalized_key(key)?;
        Ok(self.blobs.contains_key(&key))
    }
}
