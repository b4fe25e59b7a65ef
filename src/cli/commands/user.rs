//! User command implementation.

use super::{CommandContext, print_json};
use crate::cli::UserCommands;
use crate::config::CliOverrides;
use crate::error::{MoverError, Result};
use crate::model::User;
use crate::validation::validate_username;
use tracing::info;

/// Execute the user command.
///
/// # Errors
///
/// Returns an error if the username is invalid or already taken.
pub fn execute(command: &UserCommands, json: bool, cli: &CliOverrides) -> Result<()> {
    let mut ctx = CommandContext::open(cli)?;
    let json = ctx.json(json);
    match command {
        UserCommands::Add { username, name, admin } => {
            let user = add_user(&mut ctx, username, name.as_deref(), *admin)?;
            if json {
                print_json(&user)?;
            } else {
                println!("Added user {}", user.username);
            }
        }
    }
    Ok(())
}

pub(crate) fn add_user(
    ctx: &mut CommandContext,
    username: &str,
    name: Option<&str>,
    admin: bool,
) -> Result<User> {
    validate_username(username).map_err(|e| MoverError::from_validation_errors(vec![e]))?;
    if ctx.storage.find_user(username)?.is_some() {
        return Err(MoverError::validation(
            "username",
            format!("'{username}' is already taken"),
        ));
    }
    let user = ctx
        .storage
        .create_user(username, name.unwrap_or(username), admin)?;
    info!(username = %user.username, admin, "Added user");
    Ok(user)
}
