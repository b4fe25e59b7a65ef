//! Move command implementation.

use super::{CommandContext, print_json};
use crate::cli::MoveArgs;
use crate::config::{self, CliOverrides};
use crate::error::Result;
use crate::service::move_issue::validate;
use crate::service::{IssueMover, MoveOutcome, MoveRequest};
use serde_json::json;

/// Execute the move command.
///
/// With `--check` only reports whether the move would be accepted.
///
/// # Errors
///
/// Returns `MoveRejected` if a precondition fails, `MoveAborted` if the move
/// was rolled back, or a lookup error.
pub fn execute(args: &MoveArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let mut ctx = CommandContext::open(cli)?;
    let json = ctx.json(json);

    if args.check {
        let verdict = check(&ctx, args)?;
        if json {
            print_json(&match &verdict {
                Ok(()) => json!({"reference": args.reference, "movable": true}),
                Err(reason) => json!({
                    "reference": args.reference,
                    "movable": false,
                    "reason": reason.0,
                    "message": reason.1,
                }),
            })?;
        } else {
            match verdict {
                Ok(()) => println!("{} can be moved", args.reference),
                Err((_, message)) => println!("{} cannot be moved: {message}", args.reference),
            }
        }
        return Ok(());
    }

    let outcome = run(&mut ctx, args)?;
    if json {
        print_json(&outcome)?;
    } else {
        let destination = args.to.as_deref().unwrap_or_default();
        println!(
            "Moved {} to {}#{} ({} notes carried)",
            args.reference, destination, outcome.issue.iid, outcome.carried_notes
        );
        for range in &outcome.dangling_commit_ranges {
            eprintln!("Warning: commit range {range} does not resolve in the source scope");
        }
    }
    Ok(())
}

/// `Ok(())` when movable, otherwise the rejection code and message.
pub(crate) fn check(
    ctx: &CommandContext,
    args: &MoveArgs,
) -> Result<std::result::Result<(), (&'static str, String)>> {
    let actor = ctx.actor()?;
    let (source_scope, issue) = ctx.issue(&args.reference)?;
    let destination = args.to.as_deref().map(|h| ctx.scope(h)).transpose()?;
    let request = MoveRequest::new(&actor, &source_scope, &issue, destination.map(|s| s.id));
    Ok(validate(ctx.storage.connection(), &request)?
        .map(|_| ())
        .map_err(|reason| (reason.code(), reason.to_string())))
}

pub(crate) fn run(ctx: &mut CommandContext, args: &MoveArgs) -> Result<MoveOutcome> {
    let actor = ctx.actor()?;
    let (source_scope, issue) = ctx.issue(&args.reference)?;
    let destination = args.to.as_deref().map(|h| ctx.scope(h)).transpose()?;
    let move_config = config::move_config_from_layer(&ctx.layer)?;

    let request = MoveRequest::new(&actor, &source_scope, &issue, destination.map(|s| s.id));
    IssueMover::new(&mut ctx.storage, move_config).execute(&request)
}
