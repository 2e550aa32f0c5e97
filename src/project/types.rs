//! Project types for Workbench.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::ProjectId;

/// Maximum length for a project name (in characters).
pub const MAX_PROJECT_NAME_LENGTH: usize = 100;

/// Maximum length for a project description (in characters).
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// A project owning one file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project ID.
    pub id: ProjectId,
    /// Owning user.
    pub user_id: String,
    /// Project name.
    pub name: String,
    /// Project description.
    pub description: Option<String>,
    /// Last time the project was opened.
    pub last_accessed_at: DateTime<Utc>,
    /// When the project was created.
    pub created_at: DateTime<Utc>,
    /// When the project was last modified.
    pub updated_at: DateTime<Utc>,
}

/// Data for creating a new project.
#[derive(Debug, Clone)]
pub struct NewProject {
    /// Owning user.
    pub user_id: String,
    /// Project name.
    pub name: String,
    /// Project description.
    pub description: Option<String>,
}

impl NewProject {
    /// Create a new NewProject.
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            description: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Builder for updating a project.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<Option<String>>,
}

impl ProjectUpdate {
    /// Create a new ProjectUpdate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set or clear the description.
    pub fn description(mut self, description: Option<impl Into<String>>) -> Self {
        self.description = Some(description.map(|s| s.into()));
        self
    }

    /// Check if any fields are set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}
