//! Event storage operations for `issue_mover`.
//!
//! This module implements the audit event system with:
//! - Event insertion (atomic with mutations)
//! - Event retrieval (newest first, DESC ordering)
//!
//! Events are written inside the same transaction as the mutation that
//! produced them, so a rolled-back move leaves no audit trail behind.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, params};

use crate::error::Result;
use crate::model::{Event, EventType, IssueId};

/// Insert an event within a transaction.
///
/// This function should be called within the same transaction as the
/// mutation that triggered the event. The caller is responsible for
/// managing the transaction.
///
/// # Errors
///
/// Returns an error if the database insert fails.
pub fn insert_event(tx: &Transaction<'_>, event: &Event) -> Result<i64> {
    tx.execute(
        r"
        INSERT INTO events (issue_id, event_type, actor, old_value, new_value, comment, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ",
        params![
            event.issue_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.comment,
            event.created_at.to_rfc3339(),
        ],
    )?;

    Ok(tx.last_insert_rowid())
}

/// Get events for an issue, newest first.
///
/// # Arguments
///
/// * `conn` - Database connection
/// * `issue_id` - ID of the issue to get events for
/// * `limit` - Maximum number of events to return (0 = no limit)
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_events(conn: &Connection, issue_id: IssueId, limit: usize) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        r"
        SELECT id, issue_id, event_type, actor, old_value, new_value, comment, created_at
        FROM events
        WHERE issue_id = ?1
        ORDER BY created_at DESC, id DESC
        LIMIT ?2
        ",
    )?;
    // SQLite treats a negative LIMIT as unbounded.
    let limit = if limit == 0 {
        -1
    } else {
        i64::try_from(limit).unwrap_or(i64::MAX)
    };
    let events = stmt
        .query_map(params![issue_id, limit], event_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Count events for an issue.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_events(conn: &Connection, issue_id: IssueId) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE issue_id = ?1",
        [issue_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn event_from_row(row: &rusqlite::Row) -> rusqlite::Result<Event> {
    let event_type: String = row.get(2)?;
    let created_at: String = row.get(7)?;

    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));

    Ok(Event {
        id: row.get(0)?,
        issue_id: row.get(1)?,
        event_type: EventType::parse(&event_type),
        actor: row.get(3)?,
        old_value: row.get(4)?,
        new_value: row.get(5)?,
        comment: row.get(6)?,
        created_at,
    })
}
