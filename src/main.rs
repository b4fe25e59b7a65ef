use clap::Parser;
use issue_mover::cli::commands;
use issue_mover::cli::{Cli, Commands};
use issue_mover::config;
use issue_mover::logging::init_logging;
use issue_mover::{MoverError, StructuredError};
use std::io::{self, IsTerminal};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let overrides = build_cli_overrides(&cli);

    let result = match &cli.command {
        Commands::Init { force } => commands::init::execute(*force, None),
        Commands::User { command } => commands::user::execute(command, cli.json, &overrides),
        Commands::Scope { command } => commands::scope::execute(command, cli.json, &overrides),
        Commands::Issue { command } => commands::issue::execute(command, cli.json, &overrides),
        Commands::Note { command } => commands::note::execute(command, cli.json, &overrides),
        Commands::Show { reference } => commands::show::execute(reference, cli.json, &overrides),
        Commands::Move(args) => commands::move_issue::execute(args, cli.json, &overrides),
        Commands::Ghost { username } => commands::ghost::execute(username, cli.json, &overrides),
    };

    if let Err(e) = result {
        handle_error(&e, cli.json);
    }
}

/// Handle errors with structured output support.
///
/// When --json is set or stdout is not a TTY, outputs structured JSON to stderr.
/// Otherwise, outputs human-readable error with optional color.
fn handle_error(err: &MoverError, json_mode: bool) -> ! {
    let structured = StructuredError::from_error(err);
    let exit_code = structured.code.exit_code();

    let use_json = json_mode || !io::stdout().is_terminal();

    if use_json {
        let json = structured.to_json();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        let use_color = io::stderr().is_terminal();
        eprintln!("{}", structured.to_human(use_color));
    }

    std::process::exit(exit_code);
}

fn build_cli_overrides(cli: &Cli) -> config::CliOverrides {
    config::CliOverrides {
        db: cli.db.clone(),
        actor: cli.actor.clone(),
        json: cli.json.then_some(true),
        lock_timeout: cli.lock_timeout,
    }
}
