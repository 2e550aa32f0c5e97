//! Record store access for file nodes.

use sqlx::{QueryBuilder, Sqlite};

use crate::db::{self, DbPool};
use crate::ids::{NodeId, ProjectId};
use crate::{Result, WorkbenchError};

use super::node::{FileNode, FileNodeUpdate, NewFileNode, NodeFilter, NodeType, ParentFilter};

const SELECT_COLUMNS: &str = "SELECT id, project_id, name, node_type, parent_id, content_ref, size, \
     mime_type, created_at, updated_at FROM file_nodes";

/// Row type for file nodes from database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FileNodeRow {
    id: String,
    project_id: String,
    name: String,
    node_type: String,
    parent_id: Option<String>,
    content_ref: Option<String>,
    size: i64,
    mime_type: String,
    created_at: String,
    updated_at: String,
}

fn stored_id<T>(parse: fn(&str) -> Result<T>, value: &str) -> Result<T> {
    parse(value).map_err(|e| WorkbenchError::Database(format!("corrupt record: {e}")))
}

impl TryFrom<FileNodeRow> for FileNode {
    type Error = WorkbenchError;

    fn try_from(row: FileNodeRow) -> Result<Self> {
        Ok(FileNode {
            id: stored_id(NodeId::parse, &row.id)?,
            project_id: stored_id(ProjectId::parse, &row.project_id)?,
            name: row.name,
            node_type: NodeType::parse(&row.node_type)?,
            parent_id: row
                .parent_id
                .as_deref()
                .map(|p| stored_id(NodeId::parse, p))
                .transpose()?,
            content_ref: row.content_ref,
            size: u64::try_from(row.size)
                .map_err(|_| WorkbenchError::Database(format!("negative size {}", row.size)))?,
            mime_type: row.mime_type,
            created_at: db::parse_timestamp(&row.created_at)?,
            updated_at: db::parse_timestamp(&row.updated_at)?,
        })
    }
}

fn to_db_size(size: u64) -> Result<i64> {
    i64::try_from(size).map_err(|_| WorkbenchError::Validation(format!("size {size} is too large")))
}

/// Append the WHERE clause for a filter.
fn push_filter(query: &mut QueryBuilder<'_, Sqlite>, filter: &NodeFilter) {
    query.push(" WHERE 1 = 1");

    if let Some(project_id) = filter.project_id {
        query.push(" AND project_id = ");
        query.push_bind(project_id.to_string());
    }

    match &filter.parent {
        None => {}
        Some(ParentFilter::Root) => {
            query.push(" AND parent_id IS NULL");
        }
        Some(ParentFilter::Id(parent_id)) => {
            query.push(" AND parent_id = ");
            query.push_bind(parent_id.to_string());
        }
        Some(ParentFilter::AnyOf(parents)) => {
            query.push(" AND parent_id IN (");
            let mut separated = query.separated(", ");
            for parent_id in parents {
                separated.push_bind(parent_id.to_string());
            }
            separated.push_unseparated(")");
        }
    }

    if let Some(ref name) = filter.name {
        query.push(" AND name = ");
        query.push_bind(name.clone());
    }

    if let Some(node_type) = filter.node_type {
        query.push(" AND node_type = ");
        query.push_bind(node_type.as_str());
    }

    if let Some(ref ids) = filter.ids {
        query.push(" AND id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");
    }

    if let Some(exclude_id) = filter.exclude_id {
        query.push(" AND id != ");
        query.push_bind(exclude_id.to_string());
    }
}

/// Repository for file node records.
pub struct FileNodeRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FileNodeRepository<'a> {
    /// Create a new FileNodeRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new node and return the stored record.
    pub async fn insert(&self, node: &NewFileNode) -> Result<FileNode> {
        let now = db::format_timestamp(db::now());

        sqlx::query(
            "INSERT INTO file_nodes (id, project_id, name, node_type, parent_id, content_ref, size, mime_type, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(node.id.to_string())
        .bind(node.project_id.to_string())
        .bind(&node.name)
        .bind(node.node_type.as_str())
        .bind(node.parent_id.map(|p| p.to_string()))
        .bind(&node.content_ref)
        .bind(to_db_size(node.size)?)
        .bind(&node.mime_type)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        self.find_by_id(node.id)
            .await?
            .ok_or_else(|| WorkbenchError::NotFound(format!("node {}", node.id)))
    }

    /// Get a node by ID.
    pub async fn find_by_id(&self, id: NodeId) -> Result<Option<FileNode>> {
        let row = sqlx::query_as::<_, FileNodeRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(self.pool)
            .await?;

        row.map(FileNode::try_from).transpose()
    }

    /// Get the first node matching a filter.
    pub async fn find_one(&self, filter: &NodeFilter) -> Result<Option<FileNode>> {
        if filter.matches_nothing() {
            return Ok(None);
        }

        let mut query = QueryBuilder::new(SELECT_COLUMNS);
        push_filter(&mut query, filter);
        query.push(" ORDER BY name, id LIMIT 1");

        let row = query
            .build_query_as::<FileNodeRow>()
            .fetch_optional(self.pool)
            .await?;

        row.map(FileNode::try_from).transpose()
    }

    /// List nodes matching a filter, ordered by name then ID.
    pub async fn find(&self, filter: &NodeFilter) -> Result<Vec<FileNode>> {
        if filter.matches_nothing() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::new(SELECT_COLUMNS);
        push_filter(&mut query, filter);
        query.push(" ORDER BY name, id");

        let rows = query
            .build_query_as::<FileNodeRow>()
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(FileNode::try_from).collect()
    }

    /// Count nodes matching a filter.
    pub async fn count(&self, filter: &NodeFilter) -> Result<u64> {
        if filter.matches_nothing() {
            return Ok(0);
        }

        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM file_nodes");
        push_filter(&mut query, filter);

        let count: i64 = query
            .build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    /// Update a node. Returns the updated record, or None if it does not exist.
    pub async fn update_by_id(&self, id: NodeId, update: &FileNodeUpdate) -> Result<Option<FileNode>> {
        if update.is_empty() {
            return self.find_by_id(id).await;
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE file_nodes SET ");
        let mut separated = query.separated(", ");

        if let Some(ref name) = update.name {
            separated.push("name = ");
            separated.push_bind_unseparated(name.clone());
        }

        if let Some(parent_id) = update.parent_id {
            separated.push("parent_id = ");
            separated.push_bind_unseparated(parent_id.map(|p| p.to_string()));
        }

        if let Some(size) = update.size {
            separated.push("size = ");
            separated.push_bind_unseparated(to_db_size(size)?);
        }

        if let Some(ref mime_type) = update.mime_type {
            separated.push("mime_type = ");
            separated.push_bind_unseparated(mime_type.clone());
        }

        separated.push("updated_at = ");
        separated.push_bind_unseparated(db::format_timestamp(db::now()));

        query.push(" WHERE id = ");
        query.push_bind(id.to_string());

        let result = query.build().execute(self.pool).await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_by_id(id).await
    }

    /// Delete a node by ID.
    pub async fn delete_by_id(&self, id: NodeId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM file_nodes WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every node matching a filter and return how many were removed.
    ///
    /// An empty filter is rejected rather than wiping the table.
    pub async fn delete_many(&self, filter: &NodeFilter) -> Result<u64> {
        if filter.is_empty() {
            return Err(WorkbenchError::Validation(
                "refusing to delete with an empty filter".to_string(),
            ));
        }
        if filter.matches_nothing() {
            return Ok(0);
        }

        let mut query = QueryBuilder::new("DELETE FROM file_nodes");
        push_filter(&mut query, filter);

        let result = query.build().execute(self.pool).await?;
        Ok(result.rows_affected())
    }
}
