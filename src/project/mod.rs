//! Projects for Workbench.
//!
//! A project is the top-level container of a file tree. This module provides:
//! - Project records and their repository
//! - Project lifecycle operations (create, open, list, update, delete)

mod repository;
mod service;
mod types;

pub use repository::ProjectRepository;
pub use service::ProjectService;
pub use types::{NewProject, Project, ProjectUpdate, MAX_DESCRIPTION_LENGTH, MAX_PROJECT_NAME_LENGTH};
