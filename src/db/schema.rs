//! Database schema and migrations for Workbench.
//!
//! Migrations are applied in order when the database is opened; the
//! `schema_version` table records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: projects
    r#"
CREATE TABLE projects (
    id                TEXT PRIMARY KEY,
    user_id           TEXT NOT NULL,
    name              TEXT NOT NULL,
    description       TEXT,
    last_accessed_at  TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL
);

CREATE INDEX idx_projects_user_id ON projects(user_id);
"#,
    // v2: file nodes (files and folders)
    r#"
-- parent_id is a plain column: parent references are non-owning and a
-- dangling reference is tolerated by readers.
CREATE TABLE file_nodes (
    id           TEXT PRIMARY KEY,
    project_id   TEXT NOT NULL REFERENCES projects(id),
    name         TEXT NOT NULL,
    node_type    TEXT NOT NULL CHECK (node_type IN ('file', 'folder')),
    parent_id    TEXT,
    content_ref  TEXT,
    size         INTEGER NOT NULL DEFAULT 0 CHECK (size >= 0),
    mime_type    TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    CHECK ((node_type = 'file') = (content_ref IS NOT NULL))
);

CREATE INDEX idx_file_nodes_project_id ON file_nodes(project_id);
CREATE INDEX idx_file_nodes_parent_id ON file_nodes(parent_id);
CREATE UNIQUE INDEX idx_file_nodes_sibling_name
    ON file_nodes(project_id, COALESCE(parent_id, ''), name);
"#,
];
