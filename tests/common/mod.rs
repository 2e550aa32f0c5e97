//! Test helpers for integration tests.
//!
//! Provides a file-backed test environment with a project already created.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use workbench::{
    Database, FileService, FsBlobStore, NewProject, ProjectId, ProjectService, RetryConfig,
    RetryExecutor,
};

/// Retry policy for tests: a few quick attempts without jitter.
pub fn fast_retry() -> RetryConfig {
    RetryConfig::default()
        .with_max_retries(3)
        .with_base_delay(Duration::from_millis(1))
        .with_max_jitter(Duration::ZERO)
}

/// A database and blob store in a temporary directory.
pub struct TestEnv {
    pub db: Database,
    pub blobs: FsBlobStore,
    pub retry: RetryExecutor,
    pub project: ProjectId,
    _temp: TempDir,
}

impl TestEnv {
    /// Create the stores and one project owned by `user-1`.
    pub async fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let db = Database::open(temp.path().join("workbench.db"), 4)
            .await
            .unwrap();
        let blobs = FsBlobStore::new(temp.path().join("blobs")).unwrap();
        let retry = RetryExecutor::new(fast_retry()).with_health_check(Arc::new(db.clone()));

        let project = ProjectService::new(&db, &blobs, &retry)
            .create(&NewProject::new("user-1", "demo"))
            .await
            .unwrap();

        Self {
            db,
            blobs,
            retry,
            project: project.id,
            _temp: temp,
        }
    }

    pub fn files(&self) -> FileService<'_> {
        FileService::new(&self.db, &self.blobs, &self.retry)
    }

    pub fn projects(&self) -> ProjectService<'_> {
        ProjectService::new(&self.db, &self.blobs, &self.retry)
    }
}
