//! Capability checks.
//!
//! Authorization is an explicit function of (membership level, admin flag,
//! capability) over a fixed set of capability kinds. Storage is only read to
//! find the actor's current membership; nothing is cached between calls.

use rusqlite::Connection;
use serde::Serialize;
use std::fmt;

use crate::error::{MoverError, Result};
use crate::model::{AccessLevel, Scope, ScopeId, User};
use crate::storage::sqlite::member_access_level;

/// Operations a member may be allowed to perform in a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// See an issue and its notes.
    ReadIssue,
    /// Create, edit, close and move issues.
    ManageIssue,
}

impl Capability {
    /// Lowest membership level holding this capability.
    #[must_use]
    pub const fn minimum_level(&self) -> AccessLevel {
        match self {
            Self::ReadIssue => AccessLevel::Guest,
            Self::ManageIssue => AccessLevel::Reporter,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReadIssue => "read_issue",
            Self::ManageIssue => "manage_issue",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Does a member at `level` hold `capability`?
///
/// Admins hold every capability, member or not.
#[must_use]
pub fn allows(level: Option<AccessLevel>, admin: bool, capability: Capability) -> bool {
    admin || level.is_some_and(|level| level >= capability.minimum_level())
}

/// Check `capability` for `actor` in one scope, reading membership now.
///
/// # Errors
///
/// Returns an error if the membership lookup fails.
pub fn can(conn: &Connection, actor: &User, scope_id: ScopeId, capability: Capability) -> Result<bool> {
    if actor.admin {
        return Ok(true);
    }
    let level = member_access_level(conn, scope_id, actor.id)?;
    Ok(allows(level, false, capability))
}

/// Like [`can`], but fails with `PermissionDenied` naming the scope.
///
/// # Errors
///
/// Returns `PermissionDenied` when the capability is missing, or an error if
/// the membership lookup fails.
pub fn require(conn: &Connection, actor: &User, scope: &Scope, capability: Capability) -> Result<()> {
    if can(conn, actor, scope.id, capability)? {
        Ok(())
    } else {
        Err(MoverError::PermissionDenied {
            capability,
            scope: scope.handle.clone(),
        })
    }
}

/// Can `actor` move issues from `source` to `destination`?
///
/// True only when the actor may manage issues in both scopes.
///
/// # Errors
///
/// Returns an error if a membership lookup fails.
pub fn can_move(
    conn: &Connection,
    actor: &User,
    source: ScopeId,
    destination: ScopeId,
) -> Result<bool> {
    Ok(can(conn, actor, source, Capability::ManageIssue)?
        && can(conn, actor, destination, Capability::ManageIssue)?)
}

/// The first of `scopes` in which `actor` lacks `capability`.
///
/// # Errors
///
/// Returns an error if a membership lookup fails.
pub fn first_denied(
    conn: &Connection,
    actor: &User,
    scopes: &[ScopeId],
    capability: Capability,
) -> Result<Option<ScopeId>> {
    for &scope_id in scopes {
        if !can(conn, actor, scope_id, capability)? {
            return Ok(Some(scope_id));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    #[test]
    fn test_allows_table() {
        use AccessLevel::{Developer, Guest, Owner, Reporter};

        assert!(!allows(None, false, Capability::ReadIssue));
        assert!(allows(Some(Guest), false, Capability::ReadIssue));
        assert!(!allows(Some(Guest), false, Capability::ManageIssue));
        assert!(allows(Some(Reporter), false, Capability::ManageIssue));
        assert!(allows(Some(Developer), false, Capability::ManageIssue));
        assert!(allows(Some(Owner), false, Capability::ManageIssue));
        assert!(allows(None, true, Capability::ManageIssue));
    }

    fn setup() -> (SqliteStorage, User, ScopeId, ScopeId) {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let user = storage.create_user("alice", "", false).unwrap();
        let p1 = storage.create_scope("P1", "").unwrap().id;
        let p2 = storage.create_scope("P2", "").unwrap().id;
        (storage, user, p1, p2)
    }

    #[test]
    fn test_can_move_requires_both_scopes() {
        let (mut storage, user, p1, p2) = setup();
        storage
            .set_membership(p1, user.id, AccessLevel::Reporter)
            .unwrap();
        assert!(!can_move(storage.connection(), &user, p1, p2).unwrap());

        storage.set_membership(p2, user.id, AccessLevel::Guest).unwrap();
        assert!(!can_move(storage.connection(), &user, p1, p2).unwrap());
        assert_eq!(
            first_denied(storage.connection(), &user, &[p1, p2], Capability::ManageIssue).unwrap(),
            Some(p2)
        );

        storage
            .set_membership(p2, user.id, AccessLevel::Reporter)
            .unwrap();
        assert!(can_move(storage.connection(), &user, p1, p2).unwrap());
    }

    #[test]
    fn test_can_move_reflects_membership_changes() {
        let (mut storage, user, p1, p2) = setup();
        storage
            .set_membership(p1, user.id, AccessLevel::Owner)
            .unwrap();
        storage
            .set_membership(p2, user.id, AccessLevel::Owner)
            .unwrap();
        assert!(can_move(storage.connection(), &user, p1, p2).unwrap());

        storage.set_membership(p2, user.id, AccessLevel::Guest).unwrap();
        assert!(!can_move(storage.connection(), &user, p1, p2).unwrap());
    }

    #[test]
    fn test_admin_needs_no_membership() {
        let (mut storage, _, p1, p2) = setup();
        let admin = storage.create_user("root", "", true).unwrap();
        assert!(can_move(storage.connection(), &admin, p1, p2).unwrap());
    }

    #[test]
    fn test_require_names_the_scope() {
        let (mut storage, user, p1, _) = setup();
        let scope = storage.get_scope(p1).unwrap().unwrap();
        let err = require(storage.connection(), &user, &scope, Capability::ReadIssue).unwrap_err();
        assert!(matches!(
            err,
            MoverError::PermissionDenied { capability: Capability::ReadIssue, ref scope } if scope == "P1"
        ));

        storage.set_membership(p1, user.id, AccessLevel::Guest).unwrap();
        assert!(require(storage.connection(), &user, &scope, Capability::ReadIssue).is_ok());
    }
}
