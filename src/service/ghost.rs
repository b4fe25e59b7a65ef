//! Purging a user by handing their records to the ghost account.
//!
//! A purge is an explicit, ordered list of reassignment steps. Each step
//! moves one ownership column from the purged user to the ghost and reports
//! how many rows it touched. The steps and the final delete share one
//! transaction.

use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{MoverError, Result};
use crate::model::{User, UserId, UserKind};
use crate::storage::SqliteStorage;
use crate::storage::sqlite::{find_ghost_user, find_user_by_username, insert_user_row};

/// Default username of the ghost account.
pub const DEFAULT_GHOST_USERNAME: &str = "ghost";

/// One reassignment: `(conn, old_owner, new_owner) -> affected rows`.
pub type ReassignFn = fn(&Connection, UserId, UserId) -> Result<usize>;

/// A named reassignment step.
#[derive(Clone, Copy)]
pub struct ReassignStep {
    pub name: &'static str,
    pub run: ReassignFn,
}

impl std::fmt::Debug for ReassignStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReassignStep").field("name", &self.name).finish()
    }
}

impl ReassignStep {
    #[must_use]
    pub const fn new(name: &'static str, run: ReassignFn) -> Self {
        Self { name, run }
    }
}

/// Rows affected by one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepCount {
    pub step: &'static str,
    pub affected: usize,
}

/// Summary of a purge.
#[derive(Debug, Clone, Serialize)]
pub struct GhostReport {
    pub user: String,
    pub ghost: String,
    pub steps: Vec<StepCount>,
}

impl GhostReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.steps.iter().map(|s| s.affected).sum()
    }

    #[must_use]
    pub fn affected(&self, step: &str) -> Option<usize> {
        self.steps.iter().find(|s| s.step == step).map(|s| s.affected)
    }
}

// `table` and `column` are compile-time constants from the steps below.
fn reassign_column(
    conn: &Connection,
    table: &str,
    column: &str,
    old: UserId,
    new: UserId,
) -> Result<usize> {
    let sql = format!("UPDATE {table} SET {column} = ?1 WHERE {column} = ?2");
    Ok(conn.execute(&sql, params![new, old])?)
}

fn issue_authors(conn: &Connection, old: UserId, new: UserId) -> Result<usize> {
    reassign_column(conn, "issues", "author_id", old, new)
}

fn issue_editors(conn: &Connection, old: UserId, new: UserId) -> Result<usize> {
    reassign_column(conn, "issues", "last_edited_by_id", old, new)
}

fn note_authors(conn: &Connection, old: UserId, new: UserId) -> Result<usize> {
    reassign_column(conn, "notes", "author_id", old, new)
}

fn epic_authors(conn: &Connection, old: UserId, new: UserId) -> Result<usize> {
    reassign_column(conn, "epics", "author_id", old, new)
}

fn epic_editors(conn: &Connection, old: UserId, new: UserId) -> Result<usize> {
    reassign_column(conn, "epics", "last_edited_by_id", old, new)
}

/// Find the ghost account, creating it with `username` if absent.
///
/// # Errors
///
/// Returns a config error if `username` belongs to a regular user, or a
/// database error if the insert fails.
pub fn ensure_ghost_user(conn: &Connection, username: &str) -> Result<User> {
    if let Some(ghost) = find_ghost_user(conn)? {
        return Ok(ghost);
    }
    if find_user_by_username(conn, username)?.is_some() {
        return Err(MoverError::Config(format!(
            "ghost username '{username}' is taken by a regular user"
        )));
    }
    debug!(username, "Creating ghost user");
    insert_user_row(conn, username, "Ghost User", false, UserKind::Ghost)
}

/// Ordered reassignment steps run before a user is deleted.
#[derive(Debug, Clone)]
pub struct GhostMigration {
    steps: Vec<ReassignStep>,
}

impl Default for GhostMigration {
    fn default() -> Self {
        Self::new(vec![
            ReassignStep::new("issue_author", issue_authors),
            ReassignStep::new("issue_last_editor", issue_editors),
            ReassignStep::new("note_author", note_authors),
            ReassignStep::new("epic_author", epic_authors),
            ReassignStep::new("epic_last_editor", epic_editors),
        ])
    }
}

impl GhostMigration {
    #[must_use]
    pub const fn new(steps: Vec<ReassignStep>) -> Self {
        Self { steps }
    }

    /// Append a step after the existing ones.
    #[must_use]
    pub fn with_step(mut self, step: ReassignStep) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn steps(&self) -> &[ReassignStep] {
        &self.steps
    }

    /// Reassign everything `user` owns to the ghost, then delete `user`.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `user` is the ghost itself, or the
    /// first failing step's error (nothing is changed in that case).
    pub fn run(
        &self,
        storage: &mut SqliteStorage,
        user: &User,
        ghost_username: &str,
        actor: &str,
    ) -> Result<GhostReport> {
        if user.is_ghost() {
            return Err(MoverError::validation(
                "user",
                "the ghost user cannot be purged",
            ));
        }

        let report = storage.mutate("purge_user", actor, |tx, _ctx| {
            let ghost = ensure_ghost_user(tx, ghost_username)?;

            let mut steps = Vec::with_capacity(self.steps.len());
            for step in &self.steps {
                let affected = (step.run)(tx, user.id, ghost.id)?;
                debug!(step = step.name, affected, "Reassigned");
                steps.push(StepCount {
                    step: step.name,
                    affected,
                });
            }

            let deleted = tx.execute("DELETE FROM users WHERE id = ?", [user.id])?;
            if deleted == 0 {
                return Err(MoverError::UserNotFound {
                    user: user.username.clone(),
                });
            }

            Ok(GhostReport {
                user: user.username.clone(),
                ghost: ghost.username,
                steps,
            })
        })?;

        info!(
            user = %report.user,
            ghost = %report.ghost,
            records = report.total(),
            "User purged"
        );
        Ok(report)
    }
}
