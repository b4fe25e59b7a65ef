//! Show command implementation.

use super::{CommandContext, print_json};
use crate::config::CliOverrides;
use crate::error::Result;
use crate::model::{Issue, Note, Scope, UserId};
use crate::policy::{self, Capability};
use serde::Serialize;
use std::fmt::Write as _;

/// Issue detail as printed by `imv show --json`.
#[derive(Debug, Serialize)]
pub struct IssueDetails {
    pub reference: String,
    pub issue: Issue,
    pub author: String,
    pub assignees: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_to: Option<String>,
    pub notes: Vec<NoteDetails>,
}

#[derive(Debug, Serialize)]
pub struct NoteDetails {
    pub author: String,
    #[serde(flatten)]
    pub note: Note,
}

/// Execute the show command.
///
/// # Errors
///
/// Returns an error if the issue cannot be found or the actor may not read it.
pub fn execute(reference: &str, json: bool, cli: &CliOverrides) -> Result<()> {
    let ctx = CommandContext::open(cli)?;
    let json = ctx.json(json);
    let details = load(&ctx, reference)?;
    if json {
        print_json(&details)?;
    } else {
        print!("{}", render(&details));
    }
    Ok(())
}

pub(crate) fn load(ctx: &CommandContext, reference: &str) -> Result<IssueDetails> {
    let actor = ctx.actor()?;
    let (scope, issue) = ctx.issue(reference)?;
    policy::require(ctx.storage.connection(), &actor, &scope, Capability::ReadIssue)?;

    let moved_to = match issue.moved_to_id {
        Some(id) => moved_reference(ctx, id, &scope)?,
        None => None,
    };
    let assignees = issue
        .assignee_ids
        .iter()
        .map(|id| username(ctx, *id))
        .collect::<Result<Vec<_>>>()?;
    let notes = ctx
        .storage
        .get_notes(issue.id)?
        .into_iter()
        .map(|note| {
            Ok(NoteDetails {
                author: username(ctx, note.author_id)?,
                note,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(IssueDetails {
        reference: issue.to_reference(&scope, None),
        author: username(ctx, issue.author_id)?,
        assignees,
        moved_to,
        notes,
        issue,
    })
}

fn moved_reference(ctx: &CommandContext, id: i64, from: &Scope) -> Result<Option<String>> {
    let Some(target) = ctx.storage.get_issue(id)? else {
        return Ok(None);
    };
    let Some(target_scope) = ctx.storage.get_scope(target.scope_id)? else {
        return Ok(None);
    };
    Ok(Some(target.to_reference(&target_scope, Some(from))))
}

fn username(ctx: &CommandContext, id: UserId) -> Result<String> {
    Ok(ctx
        .storage
        .get_user(id)?
        .map_or_else(|| format!("user-{id}"), |user| user.username))
}

fn render(details: &IssueDetails) -> String {
    let issue = &details.issue;
    let mut out = String::new();
    let _ = writeln!(out, "{} [{}] {}", details.reference, issue.state, issue.title);
    let _ = writeln!(out, "Author: {}", details.author);
    if !details.assignees.is_empty() {
        let _ = writeln!(out, "Assignees: {}", details.assignees.join(", "));
    }
    if let Some(moved_to) = &details.moved_to {
        let _ = writeln!(out, "Moved to: {moved_to}");
    }
    if let Some(description) = issue.description.as_deref().filter(|d| !d.is_empty()) {
        let _ = writeln!(out, "\n{description}");
    }
    if !details.notes.is_empty() {
        let _ = writeln!(out, "\nNotes:");
        for entry in &details.notes {
            let marker = if entry.note.system { " (system)" } else { "" };
            let _ = writeln!(
                out,
                "  [{} {}{}] {}",
                entry.author,
                entry.note.created_at.format("%Y-%m-%d %H:%M"),
                marker,
                entry.note.body
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::test_support::workspace;
    use crate::model::NewIssue;

    #[test]
    fn test_show_renders_notes_in_order() {
        let (_dir, mut ctx, _) = workspace();
        let alice = ctx.actor().unwrap();
        let scope = ctx.storage.create_scope("P1", "").unwrap();
        let issue = ctx
            .storage
            .create_issue(&NewIssue::new(scope.id, "Title", alice.id), "alice", 1)
            .unwrap();
        ctx.storage.add_note(issue.id, &alice, "first", false).unwrap();
        ctx.storage.add_note(issue.id, &alice, "second", true).unwrap();

        let details = load(&ctx, "P1#1").unwrap();
        assert_eq!(details.reference, "P1#1");
        assert_eq!(details.author, "alice");
        let text = render(&details);
        assert!(text.starts_with("P1#1 [opened] Title"));
        let first = text.find("first").unwrap();
        let second = text.find("second").unwrap();
        assert!(first < second);
        assert!(text.contains("(system)"));
    }
}
