//! Note command implementation.

use super::{CommandContext, print_json};
use crate::cli::NoteCommands;
use crate::config::CliOverrides;
use crate::error::{MoverError, Result};
use crate::model::{NewNote, Note};
use crate::policy::{self, Capability};
use crate::validation::NoteValidator;

/// Execute the note command.
///
/// # Errors
///
/// Returns an error if the issue cannot be found, the actor lacks access, or
/// the body is invalid.
pub fn execute(command: &NoteCommands, json: bool, cli: &CliOverrides) -> Result<()> {
    let mut ctx = CommandContext::open(cli)?;
    let json = ctx.json(json);
    match command {
        NoteCommands::Add {
            reference,
            body,
            system,
        } => {
            let note = add(&mut ctx, reference, body, *system)?;
            if json {
                print_json(&note)?;
            } else {
                println!("Note added to {reference}");
            }
        }
    }
    Ok(())
}

pub(crate) fn add(ctx: &mut CommandContext, reference: &str, body: &str, system: bool) -> Result<Note> {
    let actor = ctx.actor()?;
    let (scope, issue) = ctx.issue(reference)?;
    policy::require(ctx.storage.connection(), &actor, &scope, Capability::ReadIssue)?;

    NoteValidator::validate(&NewNote {
        issue_id: issue.id,
        scope_id: scope.id,
        author_id: actor.id,
        body: body.to_string(),
        system,
        created_at: None,
    })
    .map_err(MoverError::from_validation_errors)?;

    ctx.storage.add_note(issue.id, &actor, body, system)
}
