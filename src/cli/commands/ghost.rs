//! Ghost command implementation.

use super::{CommandContext, print_json};
use crate::config::{self, CliOverrides};
use crate::error::{MoverError, Result};
use crate::service::{GhostMigration, GhostReport};

/// Execute the ghost command: purge `username`, handing their records to the
/// ghost account.
///
/// # Errors
///
/// Returns an error if the actor is not an admin, the user does not exist,
/// or a reassignment step fails (nothing is changed in that case).
pub fn execute(username: &str, json: bool, cli: &CliOverrides) -> Result<()> {
    let mut ctx = CommandContext::open(cli)?;
    let json = ctx.json(json);
    let report = purge(&mut ctx, username)?;

    if json {
        print_json(&report)?;
    } else {
        println!(
            "Purged {}; {} records now belong to {}",
            report.user,
            report.total(),
            report.ghost
        );
        for step in &report.steps {
            println!("  {:<18} {}", step.step, step.affected);
        }
    }
    Ok(())
}

pub(crate) fn purge(ctx: &mut CommandContext, username: &str) -> Result<GhostReport> {
    let actor = ctx.actor()?;
    if !actor.admin {
        return Err(MoverError::validation(
            "actor",
            "only admins can purge users",
        ));
    }
    let user = ctx.user(username)?;
    let ghost_username = config::ghost_username_from_layer(&ctx.layer);
    GhostMigration::default().run(&mut ctx.storage, &user, &ghost_username, &actor.username)
}
