//! Project repository for Workbench.

use sqlx::{QueryBuilder, Sqlite};

use super::types::{NewProject, Project, ProjectUpdate};
use crate::db::{self, DbPool};
use crate::ids::ProjectId;
use crate::{Result, WorkbenchError};

/// Row type for projects from database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ProjectRow {
    id: String,
    user_id: String,
    name: String,
    description: Option<String>,
    last_accessed_at: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ProjectRow> for Project {
    type Error = WorkbenchError;

    fn try_from(row: ProjectRow) -> Result<Self> {
        Ok(Project {
            id: ProjectId::parse(&row.id)
                .map_err(|e| WorkbenchError::Database(format!("corrupt record: {e}")))?,
            user_id: row.user_id,
            name: row.name,
            description: row.description,
            last_accessed_at: db::parse_timestamp(&row.last_accessed_at)?,
            created_at: db::parse_timestamp(&row.created_at)?,
            updated_at: db::parse_timestamp(&row.updated_at)?,
        })
    }
}

/// Repository for project records.
pub struct ProjectRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ProjectRepository<'a> {
    /// Create a new ProjectRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new project.
    pub async fn create(&self, project: &NewProject) -> Result<Project> {
        let id = ProjectId::new();
        let now = db::format_timestamp(db::now());

        sqlx::query(
            "INSERT INTO projects (id, user_id, name, description, last_accessed_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(&project.user_id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| WorkbenchError::NotFound(format!("project {id}")))
    }

    /// Get a project by ID.
    pub async fn get_by_id(&self, id: ProjectId) -> Result<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, user_id, name, description, last_accessed_at, created_at, updated_at
             FROM projects WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await?;

        row.map(Project::try_from).transpose()
    }

    /// List a user's projects, most recently opened first.
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Project>> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, user_id, name, description, last_accessed_at, created_at, updated_at
             FROM projects WHERE user_id = ?
             ORDER BY last_accessed_at DESC, name, id",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Project::try_from).collect()
    }

    /// Update a project. Returns None if it does not exist.
    pub async fn update(&self, id: ProjectId, update: &ProjectUpdate) -> Result<Option<Project>> {
        if update.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE projects SET ");
        let mut separated = query.separated(", ");

        if let Some(ref name) = update.name {
            separated.push("name = ");
            separated.push_bind_unseparated(name.clone());
        }

        if let Some(ref description) = update.description {
            separated.push("description = ");
            separated.push_bind_unseparated(description.clone());
        }

        separated.push("updated_at = ");
        separated.push_bind_unseparated(db::format_timestamp(db::now()));

        query.push(" WHERE id = ");
        query.push_bind(id.to_string());

        let result = query.build().execute(self.pool).await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// Record that the project was opened now.
    pub async fn touch(&self, id: ProjectId) -> Result<bool> {
        let result = sqlx::query("UPDATE projects SET last_accessed_at = ? WHERE id = ?")
            .bind(db::format_timestamp(db::now()))
            .bind(id.to_string())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a project record.
    ///
    /// Fails while file nodes still reference the project.
    pub async fn delete(&self, id: ProjectId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
