//! Issue command implementation.

use super::{CommandContext, print_json};
use crate::cli::{CreateArgs, IssueCommands};
use crate::config::{self, CliOverrides};
use crate::error::{MoverError, Result};
use crate::model::{Issue, NewIssue};
use crate::policy::{self, Capability};
use crate::validation::IssueValidator;
use tracing::info;

/// Execute the issue command.
///
/// # Errors
///
/// Returns an error if the actor lacks access, a lookup fails, or the issue
/// is invalid.
pub fn execute(command: &IssueCommands, json: bool, cli: &CliOverrides) -> Result<()> {
    let mut ctx = CommandContext::open(cli)?;
    let json = ctx.json(json);
    match command {
        IssueCommands::Create(args) => {
            let issue = create(&mut ctx, args)?;
            if json {
                print_json(&issue)?;
            } else {
                println!("Created {}#{}: {}", args.scope, issue.iid, issue.title);
            }
        }
    }
    Ok(())
}

pub(crate) fn create(ctx: &mut CommandContext, args: &CreateArgs) -> Result<Issue> {
    let actor = ctx.actor()?;
    let scope = ctx.scope(&args.scope)?;
    policy::require(ctx.storage.connection(), &actor, &scope, Capability::ManageIssue)?;

    let mut new_issue = NewIssue::new(scope.id, args.title.clone(), actor.id);
    new_issue.description = args.description.clone();
    for username in &args.assignees {
        new_issue.assignee_ids.push(ctx.user(username)?.id);
    }
    IssueValidator::validate(&new_issue).map_err(MoverError::from_validation_errors)?;

    for title in &args.labels {
        new_issue
            .label_ids
            .push(ctx.storage.ensure_label(scope.id, title)?.id);
    }
    if let Some(title) = &args.milestone {
        new_issue.milestone_id = Some(ctx.storage.ensure_milestone(scope.id, title)?.id);
    }

    let move_config = config::move_config_from_layer(&ctx.layer)?;
    let issue = ctx.storage.create_issue(
        &new_issue,
        &actor.username,
        move_config.allocation_retries.saturating_add(1),
    )?;
    info!(scope = %scope.handle, iid = issue.iid, "Created issue");
    Ok(issue)
}
