//! Validation helpers for `issue_mover`.
//!
//! These routines enforce data constraints and return structured
//! validation errors without mutating storage.

use crate::error::ValidationError;
use crate::model::{NewIssue, NewNote};

/// Maximum title length (characters), enforced by the schema as well.
pub const MAX_TITLE_LEN: usize = 255;
/// Maximum description / note body size in bytes.
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// Validates issue fields before insert.
pub struct IssueValidator;

impl IssueValidator {
    /// Validate a new issue and return all validation errors found.
    ///
    /// # Errors
    ///
    /// Returns a `Vec<ValidationError>` if any validation rules are violated.
    pub fn validate(issue: &NewIssue) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if issue.title.trim().is_empty() {
            errors.push(ValidationError::new("title", "cannot be empty"));
        }
        if issue.title.chars().count() > MAX_TITLE_LEN {
            errors.push(ValidationError::new("title", "exceeds 255 characters"));
        }

        if issue
            .description
            .as_ref()
            .is_some_and(|d| d.len() > MAX_BODY_BYTES)
        {
            errors.push(ValidationError::new("description", "exceeds 1MB"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validates note fields before insert.
pub struct NoteValidator;

impl NoteValidator {
    /// Validate a note body.
    ///
    /// # Errors
    ///
    /// Returns a `Vec<ValidationError>` if any validation rules are violated.
    pub fn validate(note: &NewNote) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if note.body.trim().is_empty() {
            errors.push(ValidationError::new("body", "cannot be empty"));
        }
        if note.body.len() > MAX_BODY_BYTES {
            errors.push(ValidationError::new("body", "exceeds 1MB"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validate a scope handle: `/`-separated segments of `[A-Za-z0-9_.-]`.
///
/// # Errors
///
/// Returns a `ValidationError` describing the first problem found.
pub fn validate_handle(handle: &str) -> Result<(), ValidationError> {
    if handle.is_empty() {
        return Err(ValidationError::new("handle", "cannot be empty"));
    }
    if handle.len() > 255 {
        return Err(ValidationError::new("handle", "exceeds 255 characters"));
    }
    for segment in handle.split('/') {
        if segment.is_empty() {
            return Err(ValidationError::new("handle", "contains an empty segment"));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(ValidationError::new(
                "handle",
                format!("segment '{segment}' may only contain letters, digits, '_', '.' and '-'"),
            ));
        }
    }
    Ok(())
}

/// Validate a username: 1-64 chars of `[A-Za-z0-9_.-]`.
///
/// # Errors
///
/// Returns a `ValidationError` describing the problem.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::new("username", "cannot be empty"));
    }
    if username.len() > 64 {
        return Err(ValidationError::new("username", "exceeds 64 characters"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(ValidationError::new(
            "username",
            "may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(())
}
