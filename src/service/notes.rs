//! Copying a discussion thread between issues.

use rusqlite::Connection;
use tracing::trace;

use crate::error::Result;
use crate::model::{Issue, NewNote, Note, Scope, User};
use crate::reference::{CommitRange, ReferenceRewriter};
use crate::storage::sqlite::{fetch_notes, insert_note_row};

/// What [`carry_notes`] copied.
#[derive(Debug, Clone, Default)]
pub struct CarriedNotes {
    pub count: usize,
    /// Scope-implicit commit ranges found in the copied bodies.
    pub commit_ranges: Vec<CommitRange>,
}

/// Copy every note of `source` onto `destination`, in creation order.
///
/// Each copy keeps its author, system flag and timestamp; its body has
/// references qualified by `rewriter`. Copies are appended, so they sort on
/// the destination exactly as the originals sort on the source.
///
/// # Errors
///
/// Returns an error if reading or inserting a note fails.
pub fn carry_notes(
    conn: &Connection,
    source: &Issue,
    destination: &Issue,
    rewriter: &ReferenceRewriter<'_>,
) -> Result<CarriedNotes> {
    let mut carried = CarriedNotes::default();

    for note in fetch_notes(conn, source.id)? {
        let rewritten = rewriter.rewrite(&note.body);
        let copy = insert_note_row(
            conn,
            &NewNote {
                issue_id: destination.id,
                scope_id: destination.scope_id,
                author_id: note.author_id,
                body: rewritten.text,
                system: note.system,
                created_at: Some(note.created_at),
            },
        )?;
        trace!(from = note.id, to = copy.id, "Carried note");
        carried.commit_ranges.extend(rewritten.commit_ranges);
        carried.count += 1;
    }

    Ok(carried)
}

/// Append the cross-referencing system notes for a completed copy.
///
/// Returns `(moved_from, moved_to)`: the note added to `destination` and the
/// note added to `source`. Both are authored by `actor` and are the last
/// note on their issue.
///
/// # Errors
///
/// Returns an error if inserting a note fails.
pub fn annotate_move(
    conn: &Connection,
    actor: &User,
    source_scope: &Scope,
    source: &Issue,
    destination_scope: &Scope,
    destination: &Issue,
) -> Result<(Note, Note)> {
    let moved_from = insert_note_row(
        conn,
        &NewNote {
            issue_id: destination.id,
            scope_id: destination.scope_id,
            author_id: actor.id,
            body: format!(
                "Moved from {}",
                source.to_reference(source_scope, Some(destination_scope))
            ),
            system: true,
            created_at: None,
        },
    )?;

    let moved_to = insert_note_row(
        conn,
        &NewNote {
            issue_id: source.id,
            scope_id: source.scope_id,
            author_id: actor.id,
            body: format!(
                "Moved to {}",
                destination.to_reference(destination_scope, Some(source_scope))
            ),
            system: true,
            created_at: None,
        },
    )?;

    Ok((moved_from, moved_to))
}
