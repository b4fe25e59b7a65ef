//! Command implementations.
//!
//! Every command except `init` runs against an existing workspace: discover
//! `.imv/`, open the database and merge the config layers, then act as the
//! configured actor.

pub mod ghost;
pub mod init;
pub mod issue;
pub mod move_issue;
pub mod note;
pub mod scope;
pub mod show;
pub mod user;

use crate::config::{self, CliOverrides, ConfigLayer};
use crate::error::{MoverError, Result};
use crate::model::{Issue, Scope, User};
use crate::reference::parse_issue_reference;
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Open workspace state shared by commands.
#[derive(Debug)]
pub struct CommandContext {
    pub workspace: PathBuf,
    pub db_path: PathBuf,
    pub storage: SqliteStorage,
    pub layer: ConfigLayer,
}

impl CommandContext {
    /// Discover the workspace from the current directory and open it.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` outside a workspace, or an error if config or
    /// the database cannot be loaded.
    pub fn open(cli: &CliOverrides) -> Result<Self> {
        let workspace = config::discover_workspace(Some(Path::new(".")))?;
        Self::open_at(workspace, cli)
    }

    /// Open a known workspace directory.
    ///
    /// # Errors
    ///
    /// Returns an error if config or the database cannot be loaded.
    pub fn open_at(workspace: PathBuf, cli: &CliOverrides) -> Result<Self> {
        let (storage, db_path) = config::open_storage(&workspace, cli)?;
        let layer = config::load_config(&workspace, Some(&storage), cli)?;
        Ok(Self {
            workspace,
            db_path,
            storage,
            layer,
        })
    }

    /// Whether output should be JSON (flag or config).
    #[must_use]
    pub fn json(&self, flag: bool) -> bool {
        flag || config::json_from_layer(&self.layer)
    }

    /// The registered user matching the configured actor.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if the actor has no account.
    pub fn actor(&self) -> Result<User> {
        let username = config::resolve_actor(&self.layer);
        self.storage
            .find_user(&username)?
            .ok_or(MoverError::UserNotFound { user: username })
    }

    /// Look up a user by username.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound` if no such user exists.
    pub fn user(&self, username: &str) -> Result<User> {
        self.storage
            .find_user(username)?
            .ok_or_else(|| MoverError::UserNotFound {
                user: username.to_string(),
            })
    }

    /// Look up a scope by handle.
    ///
    /// # Errors
    ///
    /// Returns `ScopeNotFound` if no such scope exists.
    pub fn scope(&self, handle: &str) -> Result<Scope> {
        self.storage
            .find_scope(handle)?
            .ok_or_else(|| MoverError::ScopeNotFound {
                scope: handle.to_string(),
            })
    }

    /// Resolve `<handle>#<iid>` to its scope and issue.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReference`, `ScopeNotFound` or `IssueNotFound`.
    pub fn issue(&self, reference: &str) -> Result<(Scope, Issue)> {
        let parsed = parse_issue_reference(reference)?;
        let scope = self.scope(&parsed.scope)?;
        let issue = self
            .storage
            .find_issue(scope.id, parsed.iid)?
            .ok_or_else(|| MoverError::IssueNotFound {
                reference: parsed.to_string(),
            })?;
        Ok((scope, issue))
    }
}

/// Pretty-print a value as JSON on stdout.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value)?;
    println!("{output}");
    Ok(())
}
