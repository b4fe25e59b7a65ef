//! Configuration management for `issue_mover`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. CLI overrides
//! 2. Environment variables (`IMV_*`)
//! 3. Project config (.imv/config.yaml)
//! 4. User config (~/.config/imv/config.yaml)
//! 5. DB config table
//! 6. Defaults

use crate::error::{MoverError, Result};
use crate::service::MoveConfig;
use crate::service::ghost::DEFAULT_GHOST_USERNAME;
use crate::service::move_issue::DEFAULT_ALLOCATION_RETRIES;
use crate::storage::SqliteStorage;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Workspace directory name.
pub const WORKSPACE_DIR: &str = ".imv";
/// Database filename inside the workspace.
pub const DEFAULT_DB_FILENAME: &str = "imv.db";
/// Busy timeout applied when nothing else is configured.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 30_000;

const ENV_PREFIX: &str = "IMV_";

/// Written by `imv init`.
pub const CONFIG_TEMPLATE: &str = r"# imv configuration
#
# actor: alice              # who performs moves (defaults to $USER)
# lock-timeout: 30000       # ms to wait for the write lock
# allocation-retries: 3     # re-allocations after an iid collision
# ghost-username: ghost     # account that inherits purged users' records
";

/// Discover the active `.imv` directory.
///
/// Honors `IMV_DIR` when set, otherwise walks up from `start` (or CWD).
///
/// # Errors
///
/// Returns `NotInitialized` if no workspace is found, or an I/O error if the
/// CWD cannot be read.
pub fn discover_workspace(start: Option<&Path>) -> Result<PathBuf> {
    let env_override = env::var("IMV_DIR")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from);
    discover_workspace_with_env(start, env_override.as_deref())
}

fn discover_workspace_with_env(start: Option<&Path>, env_override: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = env_override {
        if path.is_dir() {
            return Ok(path.to_path_buf());
        }
    }

    let mut current = match start {
        Some(path) => path.to_path_buf(),
        None => env::current_dir()?,
    };

    loop {
        let candidate = current.join(WORKSPACE_DIR);
        if candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            break;
        }
    }

    Err(MoverError::NotInitialized)
}

/// Open storage for a workspace, honoring `db` and `lock-timeout` overrides.
///
/// Returns the storage and the database path used.
///
/// # Errors
///
/// Returns an error if config cannot be read or the database cannot be opened.
pub fn open_storage(
    workspace: &Path,
    cli: &CliOverrides,
) -> Result<(SqliteStorage, PathBuf)> {
    let startup = ConfigLayer::merge_layers(&[load_startup_config(workspace)?, cli.as_layer()]);
    let db_path = db_override_from_layer(&startup)
        .unwrap_or_else(|| workspace.join(DEFAULT_DB_FILENAME));
    if !db_path.exists() {
        return Err(MoverError::DatabaseNotFound { path: db_path });
    }
    let lock_timeout = lock_timeout_from_layer(&startup).unwrap_or(DEFAULT_LOCK_TIMEOUT_MS);
    let storage = SqliteStorage::open_with_timeout(&db_path, Some(lock_timeout))?;
    Ok((storage, db_path))
}

/// A configuration layer split into startup-only and runtime (DB) keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub startup: HashMap<String, String>,
    pub runtime: HashMap<String, String>,
}

impl ConfigLayer {
    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.startup {
            self.startup.insert(key.clone(), value.clone());
        }
        for (key, value) in &other.runtime {
            self.runtime.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        Ok(layer_from_yaml_value(&value))
    }

    /// Build a layer from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_vars(env::vars())
    }

    /// Build a layer from `IMV_*` variables in `vars`.
    #[must_use]
    pub fn from_env_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut layer = Self::default();
        for (key, value) in vars {
            let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            // IMV_DIR locates the workspace; it is not a config key.
            if stripped == "DIR" {
                continue;
            }
            insert_key_value(&mut layer, &normalize_key(stripped), value);
        }
        layer
    }

    /// Build a layer from DB config table values.
    ///
    /// # Errors
    ///
    /// Returns an error if config table lookup fails.
    pub fn from_db(storage: &SqliteStorage) -> Result<Self> {
        let mut layer = Self::default();
        let map = storage.get_all_config()?;
        for (key, value) in map {
            if is_startup_key(&key) {
                continue;
            }
            layer.runtime.insert(normalize_key(&key), value);
        }
        Ok(layer)
    }
}

/// CLI overrides for config loading (optional).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub db: Option<PathBuf>,
    pub actor: Option<String>,
    pub json: Option<bool>,
    pub lock_timeout: Option<u64>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();

        if let Some(path) = &self.db {
            insert_key_value(&mut layer, "db", path.to_string_lossy().to_string());
        }
        if let Some(actor) = &self.actor {
            insert_key_value(&mut layer, "actor", actor.clone());
        }
        if let Some(json) = self.json {
            insert_key_value(&mut layer, "json", json.to_string());
        }
        if let Some(lock_timeout) = self.lock_timeout {
            insert_key_value(&mut layer, "lock-timeout", lock_timeout.to_string());
        }

        layer
    }
}

/// Load project config (.imv/config.yaml).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(workspace: &Path) -> Result<ConfigLayer> {
    ConfigLayer::from_yaml(&workspace.join("config.yaml"))
}

/// Load user config (~/.config/imv/config.yaml).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<ConfigLayer> {
    let Ok(home) = env::var("HOME") else {
        return Ok(ConfigLayer::default());
    };
    let path = Path::new(&home)
        .join(".config")
        .join("imv")
        .join("config.yaml");
    ConfigLayer::from_yaml(&path)
}

/// Load startup-only configuration layers (YAML + env, no DB).
///
/// # Errors
///
/// Returns an error if any config file cannot be read or parsed.
pub fn load_startup_config(workspace: &Path) -> Result<ConfigLayer> {
    let user = load_user_config()?;
    let project = load_project_config(workspace)?;
    let env_layer = ConfigLayer::from_env();

    Ok(ConfigLayer::merge_layers(&[user, project, env_layer]))
}

/// Default config layer (lowest precedence).
#[must_use]
pub fn default_config_layer() -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    layer.runtime.insert(
        "allocation-retries".to_string(),
        DEFAULT_ALLOCATION_RETRIES.to_string(),
    );
    layer.runtime.insert(
        "ghost-username".to_string(),
        DEFAULT_GHOST_USERNAME.to_string(),
    );
    layer
}

/// Load configuration in precedence order.
///
/// # Errors
///
/// Returns an error if any config file cannot be read or parsed, or DB access fails.
pub fn load_config(
    workspace: &Path,
    storage: Option<&SqliteStorage>,
    cli: &CliOverrides,
) -> Result<ConfigLayer> {
    let defaults = default_config_layer();
    let db_layer = match storage {
        Some(storage) => ConfigLayer::from_db(storage)?,
        None => ConfigLayer::default(),
    };
    let user = load_user_config()?;
    let project = load_project_config(workspace)?;
    let env_layer = ConfigLayer::from_env();
    let cli_layer = cli.as_layer();

    Ok(ConfigLayer::merge_layers(&[
        defaults, db_layer, user, project, env_layer, cli_layer,
    ]))
}

/// Build move settings from a merged config layer.
///
/// # Errors
///
/// Returns a config error if `allocation-retries` is not a small integer.
pub fn move_config_from_layer(layer: &ConfigLayer) -> Result<MoveConfig> {
    let allocation_retries = match get_value(layer, &["allocation-retries"]) {
        Some(value) => value.trim().parse::<u32>().map_err(|_| {
            MoverError::Config(format!(
                "allocation-retries must be a non-negative integer, got '{value}'"
            ))
        })?,
        None => DEFAULT_ALLOCATION_RETRIES,
    };
    Ok(MoveConfig { allocation_retries })
}

/// Resolve the ghost account's username.
#[must_use]
pub fn ghost_username_from_layer(layer: &ConfigLayer) -> String {
    get_value(layer, &["ghost-username"])
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_GHOST_USERNAME.to_string())
}

/// Resolve actor from a merged config layer.
#[must_use]
pub fn actor_from_layer(layer: &ConfigLayer) -> Option<String> {
    get_startup_value(layer, &["actor"])
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Resolve actor with fallback to USER and a safe default.
#[must_use]
pub fn resolve_actor(layer: &ConfigLayer) -> String {
    actor_from_layer(layer)
        .or_else(|| {
            std::env::var("USER")
                .ok()
                .map(|value| value.trim().to_string())
        })
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Whether JSON output was requested through config.
#[must_use]
pub fn json_from_layer(layer: &ConfigLayer) -> bool {
    get_startup_value(layer, &["json"])
        .and_then(|value| parse_bool(value))
        .unwrap_or(false)
}

/// Determine if a key is startup-only.
///
/// Startup-only keys can only be set in YAML, env or CLI, never in the database.
#[must_use]
pub fn is_startup_key(key: &str) -> bool {
    matches!(
        normalize_key(key).as_str(),
        "db" | "database" | "actor" | "json" | "lock-timeout"
    )
}

fn insert_key_value(layer: &mut ConfigLayer, key: &str, value: String) {
    let key = normalize_key(key);
    if is_startup_key(&key) {
        layer.startup.insert(key, value);
    } else {
        layer.runtime.insert(key, value);
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace('_', "-")
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn get_startup_value<'a>(layer: &'a ConfigLayer, keys: &[&str]) -> Option<&'a String> {
    keys.iter()
        .find_map(|key| layer.startup.get(&normalize_key(key)))
}

fn get_value<'a>(layer: &'a ConfigLayer, keys: &[&str]) -> Option<&'a String> {
    keys.iter()
        .find_map(|key| layer.runtime.get(&normalize_key(key)))
}

fn db_override_from_layer(layer: &ConfigLayer) -> Option<PathBuf> {
    get_startup_value(layer, &["db", "database"]).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    })
}

fn lock_timeout_from_layer(layer: &ConfigLayer) -> Option<u64> {
    get_startup_value(layer, &["lock-timeout"]).and_then(|value| value.trim().parse::<u64>().ok())
}

fn layer_from_yaml_value(value: &serde_yaml::Value) -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    let mut flat = HashMap::new();
    flatten_yaml(value, "", &mut flat);

    for (key, value) in flat {
        insert_key_value(&mut layer, &key, value);
    }

    layer
}

fn flatten_yaml(value: &serde_yaml::Value, prefix: &str, out: &mut HashMap<String, String>) {
    match value {
        serde_yaml::Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key_str) = key.as_str() else {
                    continue;
                };
                let next_prefix = if prefix.is_empty() {
                    key_str.to_string()
                } else {
                    format!("{prefix}.{key_str}")
                };
                flatten_yaml(value, &next_prefix, out);
            }
        }
        serde_yaml::Value::Sequence(values) => {
            let joined = values
                .iter()
                .filter_map(yaml_scalar_to_string)
                .collect::<Vec<_>>()
                .join(",");
            out.insert(prefix.to_string(), joined);
        }
        _ => {
            if let Some(value) = yaml_scalar_to_string(value) {
                out.insert(prefix.to_string(), value);
            }
        }
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
        serde_yaml::Value::Tagged(tagged) => yaml_scalar_to_string(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn discover_walks_up() {
        let temp = TempDir::new().expect("tempdir");
        let workspace = temp.path().join(WORKSPACE_DIR);
        fs::create_dir_all(&workspace).unwrap();
        let nested = temp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let found = discover_workspace_with_env(Some(&nested), None).unwrap();
        assert_eq!(found, workspace);
    }

    #[test]
    fn discover_prefers_env_override() {
        let temp = TempDir::new().expect("tempdir");
        let other = temp.path().join("elsewhere");
        fs::create_dir_all(&other).unwrap();

        let found = discover_workspace_with_env(Some(temp.path()), Some(&other)).unwrap();
        assert_eq!(found, other);
    }

    #[test]
    fn discover_reports_not_initialized() {
        let temp = TempDir::new().expect("tempdir");
        let err = discover_workspace_with_env(Some(temp.path()), None).unwrap_err();
        assert!(matches!(err, MoverError::NotInitialized));
    }

    #[test]
    fn yaml_keys_split_into_startup_and_runtime() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("config.yaml");
        fs::write(
            &path,
            "actor: alice\nlock_timeout: 250\nallocation-retries: 5\n",
        )
        .unwrap();

        let layer = ConfigLayer::from_yaml(&path).unwrap();
        assert_eq!(layer.startup.get("actor").map(String::as_str), Some("alice"));
        assert_eq!(lock_timeout_from_layer(&layer), Some(250));
        assert_eq!(move_config_from_layer(&layer).unwrap().allocation_retries, 5);
    }

    #[test]
    fn env_layer_reads_prefixed_vars() {
        let layer = ConfigLayer::from_env_vars(vars(&[
            ("IMV_ACTOR", "bob"),
            ("IMV_GHOST_USERNAME", "departed"),
            ("IMV_DIR", "/tmp/somewhere"),
            ("PATH", "/usr/bin"),
        ]));
        assert_eq!(actor_from_layer(&layer).as_deref(), Some("bob"));
        assert_eq!(ghost_username_from_layer(&layer), "departed");
        assert!(!layer.runtime.contains_key("dir"));
        assert!(!layer.runtime.contains_key("path"));
    }

    #[test]
    fn precedence_highest_wins() {
        let defaults = default_config_layer();
        let mut project = ConfigLayer::default();
        insert_key_value(&mut project, "allocation-retries", "4".to_string());
        let env_layer = ConfigLayer::from_env_vars(vars(&[("IMV_ALLOCATION_RETRIES", "6")]));
        let cli = CliOverrides {
            actor: Some("carol".to_string()),
            json: Some(true),
            ..CliOverrides::default()
        };

        let merged = ConfigLayer::merge_layers(&[defaults, project, env_layer, cli.as_layer()]);
        assert_eq!(move_config_from_layer(&merged).unwrap().allocation_retries, 6);
        assert_eq!(resolve_actor(&merged), "carol");
        assert!(json_from_layer(&merged));
    }

    #[test]
    fn db_layer_ignores_startup_keys() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.set_config("actor", "mallory").unwrap();
        storage.set_config("ghost_username", "ghosty").unwrap();

        let layer = ConfigLayer::from_db(&storage).unwrap();
        assert!(actor_from_layer(&layer).is_none());
        assert_eq!(ghost_username_from_layer(&layer), "ghosty");
    }

    #[test]
    fn invalid_retries_is_config_error() {
        let mut layer = ConfigLayer::default();
        insert_key_value(&mut layer, "allocation-retries", "many".to_string());
        assert!(matches!(
            move_config_from_layer(&layer),
            Err(MoverError::Config(_))
        ));
    }

    #[test]
    fn defaults_fill_in() {
        let layer = default_config_layer();
        assert_eq!(
            move_config_from_layer(&layer).unwrap(),
            MoveConfig::default()
        );
        assert_eq!(ghost_username_from_layer(&layer), DEFAULT_GHOST_USERNAME);
    }
}
