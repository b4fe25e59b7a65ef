use crate::config::{CONFIG_TEMPLATE, DEFAULT_DB_FILENAME, WORKSPACE_DIR};
use crate::error::{MoverError, Result};
use crate::storage::SqliteStorage;
use std::fs;
use std::path::Path;
use tracing::info;

const GITIGNORE: &str = r"# Database
*.db
*.db-shm
*.db-wal
";

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the directory or database cannot be created.
pub fn execute(force: bool, root_dir: Option<&Path>) -> Result<()> {
    let base_dir = root_dir.unwrap_or_else(|| Path::new("."));
    let workspace = base_dir.join(WORKSPACE_DIR);
    let db_path = workspace.join(DEFAULT_DB_FILENAME);

    if workspace.exists() {
        if db_path.exists() {
            if !force {
                return Err(MoverError::AlreadyInitialized { path: db_path });
            }
            fs::remove_file(&db_path)?;
        }
    } else {
        fs::create_dir(&workspace)?;
    }

    // Opening applies the schema
    SqliteStorage::open(&db_path)?;

    let config_path = workspace.join("config.yaml");
    if !config_path.exists() {
        fs::write(config_path, CONFIG_TEMPLATE)?;
    }

    let gitignore_path = workspace.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(gitignore_path, GITIGNORE)?;
    }

    info!(path = %db_path.display(), "Initialized workspace");
    println!("Initialized imv workspace in {WORKSPACE_DIR}/");
    Ok(())
}
