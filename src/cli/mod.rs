//! CLI definitions and entry point.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Move issues between scopes without losing their history
#[derive(Parser, Debug)]
#[command(name = "imv", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (auto-discover .imv/imv.db if not set)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Username performing the operation
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// `SQLite` busy timeout in ms
    #[arg(long, global = true)]
    pub lock_timeout: Option<u64>,

    /// Also write logs as JSON lines to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize an imv workspace
    Init {
        /// Overwrite existing DB
        #[arg(long)]
        force: bool,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage scopes and memberships
    Scope {
        #[command(subcommand)]
        command: ScopeCommands,
    },

    /// Manage issues
    Issue {
        #[command(subcommand)]
        command: IssueCommands,
    },

    /// Manage notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },

    /// Show an issue and its notes
    Show {
        /// Qualified issue reference (e.g. "group/project#12")
        reference: String,
    },

    /// Move an issue to another scope
    Move(MoveArgs),

    /// Purge a user, handing their records to the ghost account
    Ghost {
        /// Username to purge
        username: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Register a user
    Add {
        username: String,

        /// Display name (defaults to the username)
        #[arg(long)]
        name: Option<String>,

        /// Grant instance-wide admin rights
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ScopeCommands {
    /// Create a scope
    Add {
        /// Handle used to qualify references (e.g. "group/project")
        handle: String,

        /// Display name (defaults to the handle)
        #[arg(long)]
        name: Option<String>,
    },

    /// Grant a user an access level in a scope
    Grant {
        handle: String,
        username: String,
        /// guest, reporter, developer, maintainer or owner
        level: String,
    },

    /// Record a commit as reachable in a scope
    Commit { handle: String, sha: String },
}

#[derive(Subcommand, Debug)]
pub enum IssueCommands {
    /// Create an issue
    Create(CreateArgs),
}

#[derive(Args, Debug, Default)]
pub struct CreateArgs {
    /// Scope handle
    pub scope: String,

    /// Issue title
    #[arg(long)]
    pub title: String,

    /// Issue description
    #[arg(long, short = 'd')]
    pub description: Option<String>,

    /// Assignee username (repeatable)
    #[arg(long = "assignee", short = 'a')]
    pub assignees: Vec<String>,

    /// Label title, created in the scope when missing (repeatable)
    #[arg(long = "label", short = 'l')]
    pub labels: Vec<String>,

    /// Milestone title, created in the scope when missing
    #[arg(long)]
    pub milestone: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum NoteCommands {
    /// Append a note to an issue
    Add {
        /// Qualified issue reference
        reference: String,

        /// Note body
        body: String,

        /// Mark as a system note
        #[arg(long)]
        system: bool,
    },
}

#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Qualified issue reference
    pub reference: String,

    /// Destination scope handle
    #[arg(long)]
    pub to: Option<String>,

    /// Only check whether the move is allowed
    #[arg(long)]
    pub check: bool,
}
