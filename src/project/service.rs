//! Project service for Workbench.

use tracing::{info, warn};

use super::repository::ProjectRepository;
use super::types::{NewProject, Project, ProjectUpdate, MAX_DESCRIPTION_LENGTH, MAX_PROJECT_NAME_LENGTH};
use crate::db::Database;
use crate::file::{purge_blobs, BlobStore, DeleteReport, FileNodeRepository, NodeFilter};
use crate::ids::ProjectId;
use crate::reliability::RetryExecutor;
use crate::{Result, WorkbenchError};

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(WorkbenchError::Validation(
            "project name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_PROJECT_NAME_LENGTH {
        return Err(WorkbenchError::Validation(format!(
            "project name must be at most {MAX_PROJECT_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<()> {
    if description.is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LENGTH) {
        return Err(WorkbenchError::Validation(format!(
            "description must be at most {MAX_DESCRIPTION_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Project lifecycle operations.
pub struct ProjectService<'a> {
    db: &'a Database,
    blobs: &'a dyn BlobStore,
    retry: &'a RetryExecutor,
}

impl<'a> ProjectService<'a> {
    /// Create a new ProjectService.
    pub fn new(db: &'a Database, blobs: &'a dyn BlobStore, retry: &'a RetryExecutor) -> Self {
        Self { db, blobs, retry }
    }

    fn projects(&self) -> ProjectRepository<'a> {
        ProjectRepository::new(self.db.pool())
    }

    /// Create a project.
    pub async fn create(&self, project: &NewProject) -> Result<Project> {
        validate_name(&project.name)?;
        validate_description(project.description.as_deref())?;

        let repo = self.projects();
        let created = self
            .retry
            .with_retry("projects.insert", &format!("user={}", project.user_id), || {
                repo.create(project)
            })
            .await?;

        info!(project_id = %created.id, user_id = %created.user_id, "Project created");
        Ok(created)
    }

    /// Open a project, recording the access time.
    pub async fn open(&self, id: ProjectId) -> Result<Project> {
        let repo = self.projects();
        let context = format!("project={id}");

        let touched = self
            .retry
            .with_retry("projects.touch", &context, || repo.touch(id))
            .await?;
        if !touched {
            return Err(WorkbenchError::NotFound(format!("project {id}")));
        }

        self.retry
            .with_retry("projects.find_by_id", &context, || repo.get_by_id(id))
            .await?
            .ok_or_else(|| WorkbenchError::NotFound(format!("project {id}")))
    }

    /// List a user's projects, most recently opened first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Project>> {
        self.projects().list_by_user(user_id).await
    }

    /// Update a project's name or description.
    pub async fn update(&self, id: ProjectId, update: &ProjectUpdate) -> Result<Project> {
        if let Some(ref name) = update.name {
            validate_name(name)?;
        }
        if let Some(ref description) = update.description {
            validate_description(description.as_deref())?;
        }

        let repo = self.projects();
        self.retry
            .with_retry("projects.update", &format!("project={id}"), || {
                repo.update(id, update)
            })
            .await?
            .ok_or_else(|| WorkbenchError::NotFound(format!("project {id}")))
    }

    /// Delete a project with all of its nodes and blobs.
    ///
    /// Blob failures are logged and reported; the records are removed
    /// regardless.
    pub async fn delete_project(&self, id: ProjectId) -> Result<DeleteReport> {
        let repo = self.projects();
        let context = format!("project={id}");

        if self
            .retry
            .with_retry("projects.find_by_id", &context, || repo.get_by_id(id))
            .await?
            .is_none()
        {
            return Err(WorkbenchError::NotFound(format!("project {id}")));
        }

        let nodes = FileNodeRepository::new(self.db.pool());
        let filter = NodeFilter::new().project(id);

        let all = self
            .retry
            .with_retry("file_nodes.find", &context, || nodes.find(&filter))
            .await?;
        let keys: Vec<String> = all.iter().filter_map(|n| n.content_ref.clone()).collect();

        let blobs = purge_blobs(self.blobs, self.retry, &keys).await;
        if !blobs.failed.is_empty() {
            warn!(
                project_id = %id,
                failed = blobs.failed.len(),
                "Some blobs could not be deleted"
            );
        }

        let removed_nodes = self
            .retry
            .with_retry("file_nodes.delete_many", &context, || nodes.delete_many(&filter))
            .await?;

        self.retry
            .with_retry("projects.delete", &context, || repo.delete(id))
            .await?;

        info!(
            project_id = %id,
            removed_nodes = removed_nodes,
            removed_blobs = blobs.deleted,
            "Project deleted"
        );

        Ok(DeleteReport {
            removed_nodes,
            removed_blobs: blobs.deleted,
            failed_blobs: blobs.failed,
        })
    }
}
