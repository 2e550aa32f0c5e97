//! Error types for Workbench.

use std::fmt;

use thiserror::Error;

/// SQLite result codes that indicate a temporary condition
/// (`SQLITE_BUSY`, `SQLITE_LOCKED` and their extended variants).
const TRANSIENT_SQLITE_CODES: &[&str] = &["5", "6", "261", "262", "517", "773"];

/// Failure of a store operation after the retry layer gave up.
///
/// Carries everything a caller needs to decide whether to report or degrade.
#[derive(Debug)]
pub struct StoreFailure {
    /// Name of the operation that was attempted (e.g. `file_nodes.insert`).
    pub operation: String,
    /// Number of attempts that were made.
    pub attempts: u32,
    /// Whether the last error was classified as retryable.
    pub retryable: bool,
    /// Caller-supplied context (which entity was being touched).
    pub context: Option<String>,
    /// The error returned by the last attempt.
    pub source: Box<WorkbenchError>,
}

impl fmt::Display for StoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s)",
            self.operation, self.attempts
        )?;
        if let Some(ref context) = self.context {
            write!(f, " ({context})")?;
        }
        write!(f, ": {}", self.source)
    }
}

/// Common error type for Workbench.
#[derive(Error, Debug)]
pub enum WorkbenchError {
    /// Referenced node or project does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Move target is not a folder or belongs to another project.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Move would make a folder its own ancestor.
    #[error("cannot move {node} into {target}: target is the folder itself or one of its descendants")]
    CyclicMove {
        /// The folder being moved.
        node: String,
        /// The requested new parent.
        target: String,
    },

    /// A sibling with the same name already exists.
    #[error("name conflict: {0}")]
    NameConflict(String),

    /// Validation error for caller input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Record store unreachable, retries exhausted.
    #[error("store unavailable: {0}")]
    StoreUnavailable(Box<StoreFailure>),

    /// Retryable store error, retries exhausted.
    #[error("transient store error: {0}")]
    StoreTransient(Box<StoreFailure>),

    /// Non-retryable store error.
    #[error("store error: {0}")]
    StoreFatal(Box<StoreFailure>),

    /// Generic database error.
    #[error("database error: {0}")]
    Database(String),

    /// Database connection error (connection refused, pool timeout, closed pool).
    #[error("database connection error: {0}")]
    DatabaseConnection(String),

    /// Database temporarily busy or locked.
    #[error("database busy: {0}")]
    DatabaseBusy(String),

    /// Unique constraint violated by a write.
    #[error("duplicate entry: {0}")]
    Duplicate(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl WorkbenchError {
    /// Whether this error is a caller-facing validation outcome rather than
    /// a storage failure.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            WorkbenchError::NotFound(_)
                | WorkbenchError::InvalidTarget(_)
                | WorkbenchError::CyclicMove { .. }
                | WorkbenchError::NameConflict(_)
                | WorkbenchError::Validation(_)
        )
    }

    /// Whether this error signals lost connectivity to a store.
    pub fn is_connectivity(&self) -> bool {
        match self {
            WorkbenchError::DatabaseConnection(_) => true,
            WorkbenchError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// Whether the operation that produced this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        if self.is_connectivity() {
            return true;
        }
        match self {
            WorkbenchError::DatabaseBusy(_) => true,
            WorkbenchError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Whether this error (or the error wrapped by a store failure) is a
    /// duplicate-key violation.
    pub fn is_duplicate(&self) -> bool {
        match self {
            WorkbenchError::Duplicate(_) => true,
            WorkbenchError::StoreFatal(failure)
            | WorkbenchError::StoreTransient(failure)
            | WorkbenchError::StoreUnavailable(failure) => failure.source.is_duplicate(),
            _ => false,
        }
    }

    /// Number of attempts recorded by the retry layer, if any.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            WorkbenchError::StoreFatal(failure)
            | WorkbenchError::StoreTransient(failure)
            | WorkbenchError::StoreUnavailable(failure) => Some(failure.attempts),
            _ => None,
        }
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for WorkbenchError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(io) => WorkbenchError::DatabaseConnection(io.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                WorkbenchError::DatabaseConnection(e.to_string())
            }
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                WorkbenchError::Duplicate(db.message().to_string())
            }
            sqlx::Error::Database(ref db)
                if db
                    .code()
                    .is_some_and(|code| TRANSIENT_SQLITE_CODES.contains(&&*code)) =>
            {
                WorkbenchError::DatabaseBusy(db.message().to_string())
            }
            other => WorkbenchError::Database(other.to_string()),
        }
    }
}

/// Result type alias for Workbench operations.
pub type Result<T> = std::result::Result<T, WorkbenchError>;
