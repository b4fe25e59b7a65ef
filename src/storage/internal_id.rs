//! Per-scope identifier allocation.
//!
//! Each scope owns a counter row in `internal_ids`. Allocation is one
//! upsert-with-`RETURNING` statement, so it must run inside a write
//! transaction: `SQLite` allows a single writer, which serialises concurrent
//! allocators for the same scope. The first allocation for a scope seeds the
//! counter from the highest `iid` already stored there.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, warn};

use crate::error::{MoverError, Result, is_unique_violation};
use crate::model::{Issue, NewIssue, ScopeId};
use crate::storage::sqlite::{fetch_issue, insert_issue_row};

/// Counter usage for issue numbers.
pub const ISSUES_USAGE: &str = "issues";

/// Allocate the next local id for `scope_id`.
///
/// The returned value is strictly greater than every id previously handed
/// out for the scope. Ids consumed by a rolled-back transaction are reissued;
/// ids from committed allocations are never reused.
///
/// # Errors
///
/// Returns `DatabaseLocked` if the write lock cannot be taken, or a database
/// error if the statement fails.
pub fn next_local_id(conn: &Connection, scope_id: ScopeId) -> Result<i64> {
    let value: i64 = conn
        .query_row(
            r"
            INSERT INTO internal_ids (scope_id, usage, last_value)
            VALUES (?1, ?2, (SELECT COALESCE(MAX(iid), 0) FROM issues WHERE scope_id = ?1) + 1)
            ON CONFLICT (scope_id, usage) DO UPDATE SET last_value = last_value + 1
            RETURNING last_value
            ",
            params![scope_id, ISSUES_USAGE],
            |row| row.get(0),
        )
        .map_err(|e| MoverError::from_sqlite(e, "allocate_iid"))?;

    debug!(scope_id, iid = value, "Allocated local id");
    Ok(value)
}

/// The last id handed out for `scope_id`, if any.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn current_local_id(conn: &Connection, scope_id: ScopeId) -> Result<Option<i64>> {
    use rusqlite::OptionalExtension;

    let value = conn
        .query_row(
            "SELECT last_value FROM internal_ids WHERE scope_id = ?1 AND usage = ?2",
            params![scope_id, ISSUES_USAGE],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Insert an issue under a freshly allocated `iid`.
///
/// A UNIQUE violation on `(scope_id, iid)` means some row already holds the
/// allocated number; the allocator is advanced and the insert retried, up to
/// `max_attempts` tries in total. A failed statement does not abort the
/// surrounding transaction, so retries happen in place.
///
/// # Errors
///
/// Returns `AllocationConflict` once every attempt collided, or any other
/// database error unchanged.
pub fn insert_issue_allocating(
    conn: &Connection,
    issue: &NewIssue,
    now: DateTime<Utc>,
    max_attempts: u32,
) -> Result<Issue> {
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let iid = next_local_id(conn, issue.scope_id)?;
        match insert_issue_row(conn, issue, iid, now) {
            Ok(id) => {
                return fetch_issue(conn, id)?.ok_or_else(|| MoverError::IssueNotFound {
                    reference: id.to_string(),
                });
            }
            Err(err) if is_unique_violation(&err) => {
                warn!(
                    scope_id = issue.scope_id,
                    iid, attempt, max_attempts, "Local id already taken, re-allocating"
                );
            }
            Err(err) => return Err(MoverError::from_sqlite(err, "insert_issue")),
        }
    }

    Err(MoverError::AllocationConflict {
        scope_id: issue.scope_id,
        attempts: max_attempts,
    })
}
