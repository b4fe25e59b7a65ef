//! Error types and handling for `issue_mover`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Rejections (`MoveRejected`) are raised before any write happens
//! - Failures after validation are wrapped in `MoveAborted`, naming the last
//!   stage the move reached; the transaction has been rolled back
//! - Provides recovery hints and retryability for user-facing errors
//! - Provides structured JSON output (see [`StructuredError`])

mod structured;

pub use structured::{ErrorCode, StructuredError};

use crate::model::ScopeId;
use crate::policy::Capability;
use crate::service::{MoveStage, RejectReason};
use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `issue_mover` operations.
#[derive(Error, Debug)]
pub enum MoverError {
    // === Storage Errors ===
    /// Database file not found at the specified path.
    #[error("Database not found at '{path}'")]
    DatabaseNotFound { path: PathBuf },

    /// The write lock could not be acquired before the busy timeout expired.
    #[error("Database is locked: {operation} could not acquire the write lock")]
    DatabaseLocked { operation: String },

    /// `SQLite` database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    // === Lookup Errors ===
    /// Issue with the specified reference was not found.
    #[error("Issue not found: {reference}")]
    IssueNotFound { reference: String },

    /// Scope with the specified handle or id was not found.
    #[error("Scope not found: {scope}")]
    ScopeNotFound { scope: String },

    /// User with the specified username or id was not found.
    #[error("User not found: {user}")]
    UserNotFound { user: String },

    /// Text that was expected to be a qualified issue reference is not one.
    #[error("Invalid issue reference: {reference}")]
    InvalidReference { reference: String },

    // === Validation Errors ===
    /// Field validation failed.
    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Multiple validation errors occurred.
    #[error("Validation errors: {errors:?}")]
    ValidationErrors { errors: Vec<ValidationError> },

    // === Move Errors ===
    /// A move precondition failed. Nothing was written.
    #[error("Cannot move issue: {reason}")]
    MoveRejected { reason: RejectReason },

    /// The actor lacks a capability outside of a move (e.g. creating an issue).
    #[error("Permission denied: {capability} in scope {scope}")]
    PermissionDenied { capability: Capability, scope: String },

    /// The identifier allocator kept colliding with existing rows.
    #[error("Could not allocate an issue id in scope {scope_id} after {attempts} attempts")]
    AllocationConflict { scope_id: ScopeId, attempts: u32 },

    /// The move failed after validation and was rolled back.
    #[error("Move did not complete (rolled back after reaching {stage}): {source}")]
    MoveAborted {
        stage: MoveStage,
        #[source]
        source: Box<MoverError>,
    },

    // === Configuration Errors ===
    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workspace not initialized.
    #[error("Workspace not initialized: run 'imv init' first")]
    NotInitialized,

    /// Already initialized.
    #[error("Already initialized at '{path}'")]
    AlreadyInitialized { path: PathBuf },

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// A single field validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// The reason for the validation failure.
    pub message: String,
}

impl ValidationError {
    /// Create a new validation error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl MoverError {
    /// Can the user fix this without code changes?
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseNotFound { .. }
                | Self::NotInitialized
                | Self::IssueNotFound { .. }
                | Self::ScopeNotFound { .. }
                | Self::UserNotFound { .. }
                | Self::InvalidReference { .. }
                | Self::Validation { .. }
                | Self::ValidationErrors { .. }
                | Self::MoveRejected { .. }
                | Self::PermissionDenied { .. }
        )
    }

    /// Might the same call succeed if simply repeated?
    ///
    /// Rejections are never retryable. An aborted move is retryable when its
    /// cause is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DatabaseLocked { .. } | Self::AllocationConflict { .. } => true,
            Self::Database(err) => is_busy(err),
            Self::MoveAborted { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// The innermost error, looking through `MoveAborted` wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::MoveAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run: imv init"),
            Self::DatabaseNotFound { .. } => Some("Check path or run: imv init"),
            Self::DatabaseLocked { .. } => {
                Some("Another writer holds the lock; retry or raise --lock-timeout")
            }
            Self::AllocationConflict { .. } => Some("Retry the operation"),
            Self::InvalidReference { .. } => Some("Use the form <scope>#<iid>, e.g. P1#12"),
            Self::MoveRejected { reason } => reason.suggestion(),
            Self::PermissionDenied { .. } => {
                Some("Ask a maintainer to grant access: imv scope grant <scope> <user> <level>")
            }
            Self::MoveAborted { source, .. } => source.suggestion(),
            Self::AlreadyInitialized { .. } => Some("Remove .imv/imv.db to start over"),
            _ => None,
        }
    }

    /// Create a validation error for a specific field.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create from multiple validation errors.
    #[must_use]
    pub fn from_validation_errors(errors: Vec<ValidationError>) -> Self {
        if errors.len() == 1 {
            let err = &errors[0];
            Self::Validation {
                field: err.field.clone(),
                reason: err.message.clone(),
            }
        } else {
            Self::ValidationErrors { errors }
        }
    }

    /// Map a `SQLITE_BUSY` failure to `DatabaseLocked`, leaving others as-is.
    #[must_use]
    pub fn from_sqlite(err: rusqlite::Error, operation: &str) -> Self {
        if is_busy(&err) {
            Self::DatabaseLocked {
                operation: operation.to_string(),
            }
        } else {
            Self::Database(err)
        }
    }
}

/// Whether a `SQLite` error is a lock timeout.
#[must_use]
pub fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

/// Whether a `SQLite` error is a UNIQUE constraint violation.
#[must_use]
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(inner, _) => {
            inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}

/// Result type using `MoverError`.
pub type Result<T> = std::result::Result<T, MoverError>;
