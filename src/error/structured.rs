//! Structured error output for scripts and agents.
//!
//! Provides machine-parseable error information with:
//! - Error codes for categorization
//! - Hints for self-correction
//! - Retryability flags
//! - Context for debugging

use crate::error::MoverError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Machine-readable error codes.
///
/// These codes are stable and can be used for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // === Database Errors (exit code 2) ===
    DatabaseNotFound,
    DatabaseLocked,
    DatabaseError,
    NotInitialized,
    AlreadyInitialized,

    // === Lookup Errors (exit code 3) ===
    IssueNotFound,
    ScopeNotFound,
    UserNotFound,
    InvalidReference,

    // === Validation Errors (exit code 4) ===
    ValidationFailed,

    // === Move Errors (exit code 5) ===
    /// A move precondition failed
    MoveRejected,
    /// The actor lacks the capability in one of the scopes
    PermissionDenied,
    /// Identifier allocation kept colliding
    AllocationConflict,
    /// The move was rolled back after validation
    MoveAborted,

    // === Config Errors (exit code 7) ===
    ConfigError,

    // === I/O Errors (exit code 8) ===
    IoError,
    JsonError,
    YamlError,
}

impl ErrorCode {
    /// Get the string representation for JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DatabaseNotFound => "DATABASE_NOT_FOUND",
            Self::DatabaseLocked => "DATABASE_LOCKED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::IssueNotFound => "ISSUE_NOT_FOUND",
            Self::ScopeNotFound => "SCOPE_NOT_FOUND",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::InvalidReference => "INVALID_REFERENCE",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::MoveRejected => "MOVE_REJECTED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::AllocationConflict => "ALLOCATION_CONFLICT",
            Self::MoveAborted => "MOVE_ABORTED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::YamlError => "YAML_ERROR",
        }
    }

    /// Get the exit code for this error category.
    ///
    /// - 2: Database errors
    /// - 3: Lookup errors
    /// - 4: Validation errors
    /// - 5: Move errors
    /// - 7: Config errors
    /// - 8: I/O errors
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::DatabaseNotFound
            | Self::DatabaseLocked
            | Self::DatabaseError
            | Self::NotInitialized
            | Self::AlreadyInitialized => 2,
            Self::IssueNotFound
            | Self::ScopeNotFound
            | Self::UserNotFound
            | Self::InvalidReference => 3,
            Self::ValidationFailed => 4,
            Self::MoveRejected
            | Self::PermissionDenied
            | Self::AllocationConflict
            | Self::MoveAborted => 5,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError | Self::YamlError => 8,
        }
    }
}

/// Structured error for machine-parseable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional hint for fixing the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether the operation can be retried as-is
    pub retryable: bool,
    /// Additional context data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl StructuredError {
    /// Create a new structured error from a `MoverError`.
    #[must_use]
    pub fn from_error(err: &MoverError) -> Self {
        let (code, context) = Self::extract_code_and_context(err);

        Self {
            code,
            message: err.to_string(),
            hint: err.suggestion().map(str::to_string),
            retryable: err.is_retryable(),
            context,
        }
    }

    /// Serialize to JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "hint": self.hint,
                "retryable": self.retryable,
                "context": self.context,
            }
        })
    }

    /// Format for human-readable output.
    #[must_use]
    pub fn to_human(&self, color: bool) -> String {
        let mut output = String::new();

        if color {
            output.push_str("\x1b[31mError:\x1b[0m ");
        } else {
            output.push_str("Error: ");
        }

        output.push_str(&self.message);

        if let Some(hint) = &self.hint {
            output.push('\n');
            if color {
                output.push_str("\x1b[33mHint:\x1b[0m ");
            } else {
                output.push_str("Hint: ");
            }
            output.push_str(hint);
        }

        output
    }

    fn extract_code_and_context(err: &MoverError) -> (ErrorCode, Option<Value>) {
        match err {
            MoverError::DatabaseNotFound { path } => (
                ErrorCode::DatabaseNotFound,
                Some(json!({"path": path.display().to_string()})),
            ),
            MoverError::DatabaseLocked { operation } => (
                ErrorCode::DatabaseLocked,
                Some(json!({"operation": operation})),
            ),
            MoverError::Database(_) => (ErrorCode::DatabaseError, None),
            MoverError::NotInitialized => (ErrorCode::NotInitialized, None),
            MoverError::AlreadyInitialized { path } => (
                ErrorCode::AlreadyInitialized,
                Some(json!({"path": path.display().to_string()})),
            ),
            MoverError::IssueNotFound { reference } => {
                (ErrorCode::IssueNotFound, Some(json!({"reference": reference})))
            }
            MoverError::ScopeNotFound { scope } => {
                (ErrorCode::ScopeNotFound, Some(json!({"scope": scope})))
            }
            MoverError::UserNotFound { user } => {
                (ErrorCode::UserNotFound, Some(json!({"user": user})))
            }
            MoverError::InvalidReference { reference } => (
                ErrorCode::InvalidReference,
                Some(json!({"reference": reference})),
            ),
            MoverError::Validation { field, reason } => (
                ErrorCode::ValidationFailed,
                Some(json!({"field": field, "reason": reason})),
            ),
            MoverError::ValidationErrors { errors } => (
                ErrorCode::ValidationFailed,
                Some(json!({
                    "errors": errors.iter()
                        .map(|e| json!({"field": e.field, "message": e.message}))
                        .collect::<Vec<_>>()
                })),
            ),
            MoverError::MoveRejected { reason } => {
                let code = if reason.is_permission() {
                    ErrorCode::PermissionDenied
                } else {
                    ErrorCode::MoveRejected
                };
                (code, Some(json!({"reason": reason.code()})))
            }
            MoverError::PermissionDenied { capability, scope } => (
                ErrorCode::PermissionDenied,
                Some(json!({"capability": capability.as_str(), "scope": scope})),
            ),
            MoverError::AllocationConflict { scope_id, attempts } => (
                ErrorCode::AllocationConflict,
                Some(json!({"scope_id": scope_id, "attempts": attempts})),
            ),
            MoverError::MoveAborted { stage, source } => {
                let (cause, _) = Self::extract_code_and_context(source);
                (
                    ErrorCode::MoveAborted,
                    Some(json!({"stage": stage.as_str(), "cause": cause.as_str()})),
                )
            }
            MoverError::Config(_) => (ErrorCode::ConfigError, None),
            MoverError::Io(_) => (ErrorCode::IoError, None),
            MoverError::Json(_) => (ErrorCode::JsonError, None),
            MoverError::Yaml(_) => (ErrorCode::YamlError, None),
        }
    }
}
