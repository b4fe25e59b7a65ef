//! Database schema definitions and migration logic.

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the mover database.
pub const SCHEMA_SQL: &str = r"
    -- Users
    -- At most one ghost account may exist; it receives reassigned records.
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL DEFAULT '',
        admin INTEGER NOT NULL DEFAULT 0,
        user_type TEXT NOT NULL DEFAULT 'human' CHECK (user_type IN ('human', 'ghost')),
        created_at TEXT NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_users_single_ghost
        ON users(user_type) WHERE user_type = 'ghost';

    -- Scopes (projects)
    CREATE TABLE IF NOT EXISTS scopes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        handle TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL
    );

    -- Scope memberships
    CREATE TABLE IF NOT EXISTS members (
        scope_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        access_level INTEGER NOT NULL,
        PRIMARY KEY (scope_id, user_id),
        FOREIGN KEY (scope_id) REFERENCES scopes(id) ON DELETE CASCADE,
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
    );

    -- Scope-local milestones and labels
    CREATE TABLE IF NOT EXISTS milestones (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scope_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        UNIQUE (scope_id, title),
        FOREIGN KEY (scope_id) REFERENCES scopes(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS labels (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scope_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        UNIQUE (scope_id, title),
        FOREIGN KEY (scope_id) REFERENCES scopes(id) ON DELETE CASCADE
    );

    -- Issues
    -- Author references are not cascaded: a user row can only be removed
    -- once every record it owns has been reassigned.
    CREATE TABLE IF NOT EXISTS issues (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        scope_id INTEGER NOT NULL,
        iid INTEGER NOT NULL,
        title TEXT NOT NULL CHECK (length(title) BETWEEN 1 AND 255),
        description TEXT NOT NULL DEFAULT '',
        author_id INTEGER NOT NULL,
        last_edited_by_id INTEGER,
        milestone_id INTEGER,
        state TEXT NOT NULL DEFAULT 'opened' CHECK (state IN ('opened', 'closed')),
        moved_to_id INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        closed_at TEXT,
        UNIQUE (scope_id, iid),
        FOREIGN KEY (scope_id) REFERENCES scopes(id),
        FOREIGN KEY (author_id) REFERENCES users(id),
        FOREIGN KEY (last_edited_by_id) REFERENCES users(id),
        FOREIGN KEY (milestone_id) REFERENCES milestones(id) ON DELETE SET NULL,
        FOREIGN KEY (moved_to_id) REFERENCES issues(id)
    );
    CREATE INDEX IF NOT EXISTS idx_issues_author ON issues(author_id);
    CREATE INDEX IF NOT EXISTS idx_issues_last_edited_by ON issues(last_edited_by_id);

    CREATE TABLE IF NOT EXISTS issue_assignees (
        issue_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        PRIMARY KEY (issue_id, user_id),
        FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE,
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS issue_labels (
        issue_id INTEGER NOT NULL,
        label_id INTEGER NOT NULL,
        PRIMARY KEY (issue_id, label_id),
        FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE,
        FOREIGN KEY (label_id) REFERENCES labels(id) ON DELETE CASCADE
    );

    -- Notes (discussion thread). The rowid defines creation order.
    CREATE TABLE IF NOT EXISTS notes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id INTEGER NOT NULL,
        scope_id INTEGER NOT NULL,
        author_id INTEGER NOT NULL,
        body TEXT NOT NULL,
        system INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE,
        FOREIGN KEY (author_id) REFERENCES users(id)
    );
    CREATE INDEX IF NOT EXISTS idx_notes_issue ON notes(issue_id, id);
    CREATE INDEX IF NOT EXISTS idx_notes_author ON notes(author_id);

    -- Per-scope identifier sequences
    CREATE TABLE IF NOT EXISTS internal_ids (
        scope_id INTEGER NOT NULL,
        usage TEXT NOT NULL,
        last_value INTEGER NOT NULL,
        PRIMARY KEY (scope_id, usage),
        FOREIGN KEY (scope_id) REFERENCES scopes(id) ON DELETE CASCADE
    );

    -- Commits known to each scope (for commit-range resolution)
    CREATE TABLE IF NOT EXISTS commits (
        scope_id INTEGER NOT NULL,
        sha TEXT NOT NULL,
        PRIMARY KEY (scope_id, sha),
        FOREIGN KEY (scope_id) REFERENCES scopes(id) ON DELETE CASCADE
    );

    -- Epics (authored, unscoped)
    CREATE TABLE IF NOT EXISTS epics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        author_id INTEGER NOT NULL,
        last_edited_by_id INTEGER,
        created_at TEXT NOT NULL,
        FOREIGN KEY (author_id) REFERENCES users(id),
        FOREIGN KEY (last_edited_by_id) REFERENCES users(id)
    );
    CREATE INDEX IF NOT EXISTS idx_epics_author ON epics(author_id);

    -- Events (audit log)
    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id INTEGER NOT NULL,
        event_type TEXT NOT NULL,
        actor TEXT NOT NULL DEFAULT '',
        old_value TEXT,
        new_value TEXT,
        comment TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_events_issue ON events(issue_id);

    -- Config (runtime)
    CREATE TABLE IF NOT EXISTS config (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    -- Metadata
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Apply the schema to the database.
///
/// This uses `execute_batch` to run the entire DDL script.
/// It is idempotent because all statements use `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    run_migrations(conn)?;

    // Set journal mode to WAL for concurrency
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // Enable foreign keys
    conn.pragma_update(None, "foreign_keys", "ON")?;

    Ok(())
}

/// Run schema migrations for existing databases.
fn run_migrations(conn: &Connection) -> Result<()> {
    let version: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .ok();

    if version.is_none() {
        conn.execute(
            "INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', ?)",
            [CURRENT_SCHEMA_VERSION.to_string()],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for table in ["issues", "notes", "internal_ids", "members", "epics", "config"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        // In-memory DBs use MEMORY journaling, regardless of what we set
        assert!(journal_mode.to_uppercase() == "WAL" || journal_mode.to_uppercase() == "MEMORY");

        let foreign_keys: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn test_apply_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();

        let version: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION.to_string());
    }

    #[test]
    fn test_only_one_ghost_user() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (username, user_type, created_at) VALUES ('ghost', 'ghost', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let second = conn.execute(
            "INSERT INTO users (username, user_type, created_at) VALUES ('ghost2', 'ghost', '2024-01-01T00:00:00Z')",
            [],
        );
        assert!(second.is_err());
    }
}
