//! Error types for lvlup
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (validation, bad args, unknown task)
//! - 3: Blocked (reminder registration refused)
//! - 4: Operation failed (database, I/O, serialization)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the lvlup CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for lvlup operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Title cannot be empty")]
    EmptyTitle,

    #[error("Due date {0} is in the past")]
    DueDateInPast(String),

    #[error("Parent task not found: {0}")]
    ParentNotFound(i64),

    #[error("Task {task_id} would become its own ancestor")]
    CyclicHierarchy { task_id: i64 },

    #[error("Task {task_id} is nested deeper than {max_depth} levels")]
    HierarchyTooDeep { task_id: i64, max_depth: usize },

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Blocked (exit code 3)
    #[error("Reminder for task {task_id} was refused: {reason}")]
    SchedulingDenied { task_id: i64, reason: String },

    // Operation failures (exit code 4)
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Database path unavailable: {0}")]
    DatabasePath(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::EmptyTitle
            | Error::DueDateInPast(_)
            | Error::ParentNotFound(_)
            | Error::CyclicHierarchy { .. }
            | Error::HierarchyTooDeep { .. }
            | Error::TaskNotFound(_)
            | Error::InvalidArgument(_)
            | Error::InvalidConfig(_) => exit_codes::USER_ERROR,

            // Blocked
            Error::SchedulingDenied { .. } => exit_codes::BLOCKED,

            // Operation failures
            Error::Sqlite(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::DatabasePath(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Validation failures are reported before any write is attempted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::EmptyTitle
                | Error::DueDateInPast(_)
                | Error::ParentNotFound(_)
                | Error::CyclicHierarchy { .. }
                | Error::HierarchyTooDeep { .. }
        )
    }

    /// Structured details for the JSON error envelope.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::ParentNotFound(id) | Error::TaskNotFound(id) => {
                Some(serde_json::json!({ "task_id": id }))
            }
            Error::CyclicHierarchy { task_id } => Some(serde_json::json!({ "task_id": task_id })),
            Error::HierarchyTooDeep {
                task_id,
                max_depth,
            } => Some(serde_json::json!({
                "task_id": task_id,
                "max_depth": max_depth,
            })),
            Error::SchedulingDenied { task_id, reason } => Some(serde_json::json!({
                "task_id": task_id,
                "reason": reason,
            })),
            _ => None,
        }
    }
}

/// Result type alias for lvlup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
