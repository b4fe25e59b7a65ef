//! `SQLite` storage implementation.

use crate::error::{MoverError, Result};
use crate::model::{
    AccessLevel, Epic, Event, EventType, Issue, IssueId, IssueState, Label, Milestone, NewIssue,
    NewNote, Note, Scope, ScopeId, User, UserId, UserKind,
};
use crate::storage::events::{get_events, insert_event};
use crate::storage::internal_id::insert_issue_allocating;
use crate::storage::schema::apply_schema;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
pub struct MutationContext {
    pub op_name: String,
    pub actor: String,
    pub events: Vec<Event>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    pub fn record_event(&mut self, event_type: EventType, issue_id: IssueId, details: Option<String>) {
        self.events.push(Event {
            id: 0, // Placeholder, DB assigns auto-inc ID
            issue_id,
            event_type,
            actor: self.actor.clone(),
            old_value: None,
            new_value: None,
            comment: details,
            created_at: Utc::now(),
        });
    }

    /// Record a field change event with old and new values.
    pub fn record_field_change(
        &mut self,
        event_type: EventType,
        issue_id: IssueId,
        old_value: Option<String>,
        new_value: Option<String>,
        comment: Option<String>,
    ) {
        self.events.push(Event {
            id: 0,
            issue_id,
            event_type,
            actor: self.actor.clone(),
            old_value,
            new_value,
            comment,
            created_at: Utc::now(),
        });
    }
}

impl SqliteStorage {
    /// Open a new connection to the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a new connection with an optional busy timeout (ms).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open_with_timeout(path: &Path, lock_timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        if let Some(timeout) = lock_timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        }
        apply_schema(&conn).map_err(|e| MoverError::from_sqlite(e, "open"))?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Read-only access to the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation inside one `IMMEDIATE` transaction.
    ///
    /// The closure runs with the write lock held; events it records are
    /// written before commit. Any error rolls the whole transaction back.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseLocked` if the write lock cannot be acquired, or the
    /// closure's error. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
            .map_err(|e| MoverError::from_sqlite(e, op))?;
        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit().map_err(|e| MoverError::from_sqlite(e, op))?;
        debug!(op, actor, events = ctx.events.len(), "Mutation committed");

        Ok(result)
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Create a human user.
    ///
    /// # Errors
    ///
    /// Returns an error if the username is taken or the insert fails.
    pub fn create_user(&mut self, username: &str, name: &str, admin: bool) -> Result<User> {
        insert_user_row(&self.conn, username, name, admin, UserKind::Human)
    }

    /// Get a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        fetch_user(&self.conn, id)
    }

    /// Get a user by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn find_user(&self, username: &str) -> Result<Option<User>> {
        find_user_by_username(&self.conn, username)
    }

    // ========================================================================
    // Scopes and memberships
    // ========================================================================

    /// Create a scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is taken or the insert fails.
    pub fn create_scope(&mut self, handle: &str, name: &str) -> Result<Scope> {
        self.conn.execute(
            "INSERT INTO scopes (handle, name, created_at) VALUES (?, ?, ?)",
            params![handle, name, Utc::now().to_rfc3339()],
        )?;
        let id = self.conn.last_insert_rowid();
        fetch_scope(&self.conn, id)?.ok_or_else(|| MoverError::ScopeNotFound {
            scope: handle.to_string(),
        })
    }

    /// Get a scope by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_scope(&self, id: ScopeId) -> Result<Option<Scope>> {
        fetch_scope(&self.conn, id)
    }

    /// Get a scope by handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn find_scope(&self, handle: &str) -> Result<Option<Scope>> {
        find_scope_by_handle(&self.conn, handle)
    }

    /// Grant (or change) a user's access level in a scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn set_membership(
        &mut self,
        scope_id: ScopeId,
        user_id: UserId,
        level: AccessLevel,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO members (scope_id, user_id, access_level) VALUES (?, ?, ?)
             ON CONFLICT(scope_id, user_id) DO UPDATE SET access_level = excluded.access_level",
            params![scope_id, user_id, level.as_i32()],
        )?;
        Ok(())
    }

    /// Create a scope-local label.
    ///
    /// # Errors
    ///
    /// Returns an error if the title is taken in the scope or the insert fails.
    pub fn create_label(&mut self, scope_id: ScopeId, title: &str) -> Result<Label> {
        self.conn.execute(
            "INSERT INTO labels (scope_id, title) VALUES (?, ?)",
            params![scope_id, title],
        )?;
        Ok(Label {
            id: self.conn.last_insert_rowid(),
            scope_id,
            title: title.to_string(),
        })
    }

    /// Create a scope-local milestone.
    ///
    /// # Errors
    ///
    /// Returns an error if the title is taken in the scope or the insert fails.
    pub fn create_milestone(&mut self, scope_id: ScopeId, title: &str) -> Result<Milestone> {
        self.conn.execute(
            "INSERT INTO milestones (scope_id, title) VALUES (?, ?)",
            params![scope_id, title],
        )?;
        Ok(Milestone {
            id: self.conn.last_insert_rowid(),
            scope_id,
            title: title.to_string(),
        })
    }

    /// Get a label by title, creating it in the scope if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn ensure_label(&mut self, scope_id: ScopeId, title: &str) -> Result<Label> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO labels (scope_id, title) VALUES (?, ?)
             ON CONFLICT(scope_id, title) DO UPDATE SET title = excluded.title
             RETURNING id",
            params![scope_id, title],
            |row| row.get(0),
        )?;
        Ok(Label {
            id,
            scope_id,
            title: title.to_string(),
        })
    }

    /// Get a milestone by title, creating it in the scope if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn ensure_milestone(&mut self, scope_id: ScopeId, title: &str) -> Result<Milestone> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO milestones (scope_id, title) VALUES (?, ?)
             ON CONFLICT(scope_id, title) DO UPDATE SET title = excluded.title
             RETURNING id",
            params![scope_id, title],
            |row| row.get(0),
        )?;
        Ok(Milestone {
            id,
            scope_id,
            title: title.to_string(),
        })
    }

    /// Register a commit as reachable in a scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn add_commit(&mut self, scope_id: ScopeId, sha: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO commits (scope_id, sha) VALUES (?, ?)",
            params![scope_id, sha.to_lowercase()],
        )?;
        Ok(())
    }

    // ========================================================================
    // Issues
    // ========================================================================

    /// Create a new issue, allocating its `iid` in the owning scope.
    ///
    /// # Errors
    ///
    /// Returns `AllocationConflict` if no free `iid` was found within
    /// `max_attempts`, or an error if the insert fails.
    pub fn create_issue(&mut self, issue: &NewIssue, actor: &str, max_attempts: u32) -> Result<Issue> {
        self.mutate("create_issue", actor, |tx, ctx| {
            let created = insert_issue_allocating(tx, issue, Utc::now(), max_attempts)?;
            ctx.record_event(
                EventType::Created,
                created.id,
                Some(format!("Created issue: {}", created.title)),
            );
            Ok(created)
        })
    }

    /// Get an issue by its global id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_issue(&self, id: IssueId) -> Result<Option<Issue>> {
        fetch_issue(&self.conn, id)
    }

    /// Get an issue by its scope-local number.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn find_issue(&self, scope_id: ScopeId, iid: i64) -> Result<Option<Issue>> {
        find_issue_by_iid(&self.conn, scope_id, iid)
    }

    /// List the issues of a scope in `iid` order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_issues(&self, scope_id: ScopeId) -> Result<Vec<Issue>> {
        let ids: Vec<IssueId> = self
            .conn
            .prepare("SELECT id FROM issues WHERE scope_id = ? ORDER BY iid ASC")?
            .query_map([scope_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut issues = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(issue) = fetch_issue(&self.conn, id)? {
                issues.push(issue);
            }
        }
        Ok(issues)
    }

    /// Replace an issue's description, recording the editor.
    ///
    /// # Errors
    ///
    /// Returns an error if the issue doesn't exist or the update fails.
    pub fn update_description(
        &mut self,
        issue_id: IssueId,
        description: &str,
        editor: &User,
    ) -> Result<Issue> {
        self.mutate("update_description", &editor.username, |tx, ctx| {
            let old = fetch_issue(tx, issue_id)?.ok_or_else(|| MoverError::IssueNotFound {
                reference: issue_id.to_string(),
            })?;
            tx.execute(
                "UPDATE issues SET description = ?, last_edited_by_id = ?, updated_at = ? WHERE id = ?",
                params![description, editor.id, Utc::now().to_rfc3339(), issue_id],
            )?;
            ctx.record_field_change(
                EventType::Custom("updated".to_string()),
                issue_id,
                old.description,
                Some(description.to_string()),
                Some("Description changed".to_string()),
            );
            fetch_issue(tx, issue_id)?.ok_or_else(|| MoverError::IssueNotFound {
                reference: issue_id.to_string(),
            })
        })
    }

    // ========================================================================
    // Notes
    // ========================================================================

    /// Append a note to an issue.
    ///
    /// # Errors
    ///
    /// Returns an error if the issue doesn't exist or the insert fails.
    pub fn add_note(
        &mut self,
        issue_id: IssueId,
        author: &User,
        body: &str,
        system: bool,
    ) -> Result<Note> {
        self.mutate("add_note", &author.username, |tx, ctx| {
            let issue = fetch_issue(tx, issue_id)?.ok_or_else(|| MoverError::IssueNotFound {
                reference: issue_id.to_string(),
            })?;
            let note = insert_note_row(
                tx,
                &NewNote {
                    issue_id,
                    scope_id: issue.scope_id,
                    author_id: author.id,
                    body: body.to_string(),
                    system,
                    created_at: None,
                },
            )?;

            tx.execute(
                "UPDATE issues SET updated_at = ? WHERE id = ?",
                params![Utc::now().to_rfc3339(), issue_id],
            )?;

            ctx.record_event(EventType::Commented, issue_id, Some(body.to_string()));
            Ok(note)
        })
    }

    /// Get the notes of an issue in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_notes(&self, issue_id: IssueId) -> Result<Vec<Note>> {
        fetch_notes(&self.conn, issue_id)
    }

    // ========================================================================
    // Epics
    // ========================================================================

    /// Create an epic.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn create_epic(&mut self, title: &str, author_id: UserId) -> Result<Epic> {
        self.conn.execute(
            "INSERT INTO epics (title, author_id, created_at) VALUES (?, ?, ?)",
            params![title, author_id, Utc::now().to_rfc3339()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_epic(id)?
            .ok_or(MoverError::Database(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Retitle an epic, recording the editor.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_epic_title(&mut self, epic_id: i64, title: &str, editor_id: UserId) -> Result<()> {
        self.conn.execute(
            "UPDATE epics SET title = ?, last_edited_by_id = ? WHERE id = ?",
            params![title, editor_id, epic_id],
        )?;
        Ok(())
    }

    /// Get an epic by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_epic(&self, id: i64) -> Result<Option<Epic>> {
        let epic = self
            .conn
            .query_row(
                "SELECT id, title, author_id, last_edited_by_id, created_at FROM epics WHERE id = ?",
                [id],
                |row| {
                    Ok(Epic {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        author_id: row.get(2)?,
                        last_edited_by_id: row.get(3)?,
                        created_at: parse_datetime(&row.get::<_, String>(4)?),
                    })
                },
            )
            .optional()?;
        Ok(epic)
    }

    // ========================================================================
    // Events and config
    // ========================================================================

    /// Get the audit events of an issue, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_events(&self, issue_id: IssueId) -> Result<Vec<Event>> {
        get_events(&self.conn, issue_id, 0)
    }

    /// Fetch a config value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM config WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Fetch all config values from the config table.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_all_config(&self) -> Result<HashMap<String, String>> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM config")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Set a config value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn set_config(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

// ============================================================================
// Row helpers
//
// Free functions over a `Connection` so they run equally against the plain
// connection and inside a `mutate` transaction.
// ============================================================================

const ISSUE_COLUMNS: &str = "id, scope_id, iid, title, description, author_id, last_edited_by_id,
     milestone_id, state, moved_to_id, created_at, updated_at, closed_at";

fn issue_from_row(row: &rusqlite::Row) -> rusqlite::Result<Issue> {
    let description: String = row.get(4)?;
    let state: String = row.get(8)?;
    Ok(Issue {
        id: row.get(0)?,
        scope_id: row.get(1)?,
        iid: row.get(2)?,
        title: row.get(3)?,
        description: Some(description).filter(|d| !d.is_empty()),
        author_id: row.get(5)?,
        last_edited_by_id: row.get(6)?,
        assignee_ids: vec![],
        label_ids: vec![],
        milestone_id: row.get(7)?,
        state: if state == "closed" {
            IssueState::Closed
        } else {
            IssueState::Opened
        },
        moved_to_id: row.get(9)?,
        created_at: parse_datetime(&row.get::<_, String>(10)?),
        updated_at: parse_datetime(&row.get::<_, String>(11)?),
        closed_at: row
            .get::<_, Option<String>>(12)?
            .as_deref()
            .map(parse_datetime),
    })
}

fn load_relations(conn: &Connection, issue: &mut Issue) -> Result<()> {
    issue.assignee_ids = conn
        .prepare("SELECT user_id FROM issue_assignees WHERE issue_id = ? ORDER BY user_id")?
        .query_map([issue.id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    issue.label_ids = conn
        .prepare("SELECT label_id FROM issue_labels WHERE issue_id = ? ORDER BY label_id")?
        .query_map([issue.id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(())
}

/// Fetch an issue (with assignees and labels) by global id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn fetch_issue(conn: &Connection, id: IssueId) -> Result<Option<Issue>> {
    let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?");
    let issue = conn.query_row(&sql, [id], issue_from_row).optional()?;
    match issue {
        Some(mut issue) => {
            load_relations(conn, &mut issue)?;
            Ok(Some(issue))
        }
        None => Ok(None),
    }
}

/// Fetch an issue by `(scope_id, iid)`.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn find_issue_by_iid(conn: &Connection, scope_id: ScopeId, iid: i64) -> Result<Option<Issue>> {
    let id: Option<IssueId> = conn
        .query_row(
            "SELECT id FROM issues WHERE scope_id = ? AND iid = ?",
            params![scope_id, iid],
            |row| row.get(0),
        )
        .optional()?;
    match id {
        Some(id) => fetch_issue(conn, id),
        None => Ok(None),
    }
}

/// Insert an issue row under a given `iid`, with its assignees and labels.
///
/// Returns the raw `SQLite` error so callers can tell a taken `iid` apart
/// from other failures.
pub(crate) fn insert_issue_row(
    conn: &Connection,
    issue: &NewIssue,
    iid: i64,
    now: DateTime<Utc>,
) -> rusqlite::Result<IssueId> {
    let now = now.to_rfc3339();
    conn.execute(
        "INSERT INTO issues (
            scope_id, iid, title, description, author_id, milestone_id, state,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            issue.scope_id,
            iid,
            issue.title,
            issue.description.as_deref().unwrap_or(""),
            issue.author_id,
            issue.milestone_id,
            IssueState::Opened.as_str(),
            now,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();

    for user_id in issue.assignee_ids.iter().collect::<BTreeSet<_>>() {
        conn.execute(
            "INSERT INTO issue_assignees (issue_id, user_id) VALUES (?, ?)",
            params![id, user_id],
        )?;
    }
    for label_id in issue.label_ids.iter().collect::<BTreeSet<_>>() {
        conn.execute(
            "INSERT INTO issue_labels (issue_id, label_id) VALUES (?, ?)",
            params![id, label_id],
        )?;
    }

    Ok(id)
}

/// Close a moved issue and point it at its replacement.
///
/// # Errors
///
/// Returns an error if the update fails or the issue is gone.
pub fn close_moved_issue(
    conn: &Connection,
    issue_id: IssueId,
    moved_to_id: IssueId,
    now: DateTime<Utc>,
) -> Result<()> {
    let now = now.to_rfc3339();
    let updated = conn.execute(
        "UPDATE issues SET state = ?, closed_at = ?, updated_at = ?, moved_to_id = ? WHERE id = ?",
        params![IssueState::Closed.as_str(), now, now, moved_to_id, issue_id],
    )?;
    if updated == 0 {
        return Err(MoverError::IssueNotFound {
            reference: issue_id.to_string(),
        });
    }
    Ok(())
}

fn note_from_row(row: &rusqlite::Row) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        issue_id: row.get(1)?,
        scope_id: row.get(2)?,
        author_id: row.get(3)?,
        body: row.get(4)?,
        system: row.get::<_, i64>(5)? != 0,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

/// Fetch the notes of an issue in creation order.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn fetch_notes(conn: &Connection, issue_id: IssueId) -> Result<Vec<Note>> {
    let notes = conn
        .prepare(
            "SELECT id, issue_id, scope_id, author_id, body, system, created_at
             FROM notes
             WHERE issue_id = ?
             ORDER BY id ASC",
        )?
        .query_map([issue_id], note_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(notes)
}

/// Append a note row. Its id sorts after every existing note.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_note_row(conn: &Connection, note: &NewNote) -> Result<Note> {
    let created_at = note.created_at.unwrap_or_else(Utc::now);
    conn.execute(
        "INSERT INTO notes (issue_id, scope_id, author_id, body, system, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            note.issue_id,
            note.scope_id,
            note.author_id,
            note.body,
            i32::from(note.system),
            created_at.to_rfc3339(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    conn.query_row(
        "SELECT id, issue_id, scope_id, author_id, body, system, created_at FROM notes WHERE id = ?",
        [id],
        note_from_row,
    )
    .map_err(MoverError::from)
}

fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        admin: row.get::<_, i64>(3)? != 0,
        kind: UserKind::parse(&row.get::<_, String>(4)?),
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

const USER_COLUMNS: &str = "id, username, name, admin, user_type, created_at";

/// Insert a user row.
///
/// # Errors
///
/// Returns an error if the username is taken or the insert fails.
pub fn insert_user_row(
    conn: &Connection,
    username: &str,
    name: &str,
    admin: bool,
    kind: UserKind,
) -> Result<User> {
    conn.execute(
        "INSERT INTO users (username, name, admin, user_type, created_at) VALUES (?, ?, ?, ?, ?)",
        params![username, name, i32::from(admin), kind.as_str(), Utc::now().to_rfc3339()],
    )?;
    let id = conn.last_insert_rowid();
    fetch_user(conn, id)?.ok_or_else(|| MoverError::UserNotFound {
        user: username.to_string(),
    })
}

/// Fetch a user by id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn fetch_user(conn: &Connection, id: UserId) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    Ok(conn.query_row(&sql, [id], user_from_row).optional()?)
}

/// Fetch a user by username.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn find_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?");
    Ok(conn.query_row(&sql, [username], user_from_row).optional()?)
}

/// Fetch the ghost user, if one has been created.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn find_ghost_user(conn: &Connection) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_type = 'ghost'");
    Ok(conn.query_row(&sql, [], user_from_row).optional()?)
}

fn scope_from_row(row: &rusqlite::Row) -> rusqlite::Result<Scope> {
    Ok(Scope {
        id: row.get(0)?,
        handle: row.get(1)?,
        name: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

/// Fetch a scope by id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn fetch_scope(conn: &Connection, id: ScopeId) -> Result<Option<Scope>> {
    Ok(conn
        .query_row(
            "SELECT id, handle, name, created_at FROM scopes WHERE id = ?",
            [id],
            scope_from_row,
        )
        .optional()?)
}

/// Fetch a scope by handle.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn find_scope_by_handle(conn: &Connection, handle: &str) -> Result<Option<Scope>> {
    Ok(conn
        .query_row(
            "SELECT id, handle, name, created_at FROM scopes WHERE handle = ?",
            [handle],
            scope_from_row,
        )
        .optional()?)
}

/// A user's membership level in a scope, if any.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn member_access_level(
    conn: &Connection,
    scope_id: ScopeId,
    user_id: UserId,
) -> Result<Option<AccessLevel>> {
    let level: Option<i32> = conn
        .query_row(
            "SELECT access_level FROM members WHERE scope_id = ? AND user_id = ?",
            params![scope_id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(level.and_then(AccessLevel::from_i32))
}

/// Whether `sha` is a commit recorded for `scope_id`.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn commit_exists(conn: &Connection, scope_id: ScopeId, sha: &str) -> Result<bool> {
    let exists = conn
        .prepare("SELECT 1 FROM commits WHERE scope_id = ? AND sha = ?")?
        .exists(params![scope_id, sha.to_lowercase()])?;
    Ok(exists)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Utc.from_utc_datetime(&naive);
    }

    Utc::now()
}

#[cfg(test)]
impl SqliteStorage {
    /// Execute raw SQL for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL execution fails.
    pub fn execute_test_sql(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}
