//! Scope command implementation.

use super::{CommandContext, print_json};
use crate::cli::ScopeCommands;
use crate::config::CliOverrides;
use crate::error::{MoverError, Result};
use crate::model::{AccessLevel, Scope};
use crate::validation::validate_handle;
use serde_json::json;
use tracing::info;

/// Execute the scope command.
///
/// # Errors
///
/// Returns an error if a lookup fails or the input is invalid.
pub fn execute(command: &ScopeCommands, json: bool, cli: &CliOverrides) -> Result<()> {
    let mut ctx = CommandContext::open(cli)?;
    let json = ctx.json(json);
    match command {
        ScopeCommands::Add { handle, name } => {
            let scope = add_scope(&mut ctx, handle, name.as_deref())?;
            if json {
                print_json(&scope)?;
            } else {
                println!("Added scope {}", scope.handle);
            }
        }
        ScopeCommands::Grant {
            handle,
            username,
            level,
        } => {
            let level = grant(&mut ctx, handle, username, level)?;
            if json {
                print_json(&json!({"scope": handle, "user": username, "level": level}))?;
            } else {
                println!("Granted {level} in {handle} to {username}");
            }
        }
        ScopeCommands::Commit { handle, sha } => {
            record_commit(&mut ctx, handle, sha)?;
            if json {
                print_json(&json!({"scope": handle, "sha": sha.to_lowercase()}))?;
            } else {
                println!("Recorded commit {sha} in {handle}");
            }
        }
    }
    Ok(())
}

pub(crate) fn add_scope(ctx: &mut CommandContext, handle: &str, name: Option<&str>) -> Result<Scope> {
    validate_handle(handle).map_err(|e| MoverError::from_validation_errors(vec![e]))?;
    if ctx.storage.find_scope(handle)?.is_some() {
        return Err(MoverError::validation(
            "handle",
            format!("'{handle}' is already taken"),
        ));
    }
    let scope = ctx.storage.create_scope(handle, name.unwrap_or(handle))?;
    info!(handle = %scope.handle, "Added scope");
    Ok(scope)
}

pub(crate) fn grant(
    ctx: &mut CommandContext,
    handle: &str,
    username: &str,
    level: &str,
) -> Result<AccessLevel> {
    let level: AccessLevel = level.parse()?;
    let scope = ctx.scope(handle)?;
    let user = ctx.user(username)?;
    ctx.storage.set_membership(scope.id, user.id, level)?;
    info!(scope = %scope.handle, user = %user.username, %level, "Granted access");
    Ok(level)
}

pub(crate) fn record_commit(ctx: &mut CommandContext, handle: &str, sha: &str) -> Result<()> {
    if !(7..=40).contains(&sha.len()) || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(MoverError::validation(
            "sha",
            "must be 7 to 40 hexadecimal characters",
        ));
    }
    let scope = ctx.scope(handle)?;
    ctx.storage.add_commit(scope.id, sha)
}
