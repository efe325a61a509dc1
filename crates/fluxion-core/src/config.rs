//! Environment Configuration Loader
//!
//! Loads environment variables from the canonical location: `/etc/fluxion/environment`
//! and resolves them into an [`AppConfig`] shared by the service and the library crates.
//!
//! ## Usage
//!
//! Call `load_environment()` early in main() before accessing any config:
//!
//! ```rust,no_run
//! use fluxion_core::config::{load_environment, AppConfig};
//!
//! load_environment();
//! let config = AppConfig::from_env().expect("database settings");
//! println!("database: {}", config.database_file().display());
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default path for the environment file
pub const DEFAULT_ENV_FILE: &str = "/etc/fluxion/environment";

/// Alternative paths to check (in order of priority)
pub const ENV_FILE_PATHS: &[&str] = &[DEFAULT_ENV_FILE, ".env"];

/// Default location of the schema reference used for text-to-SQL
pub const DEFAULT_SCHEMA_PATH: &str = "docs/SQL_SCHEMA.md";

/// Default OpenAI-compatible endpoint
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Load environment variables from the canonical configuration file.
///
/// This function:
/// 1. Checks `$FLUXION_ENV_FILE` if set
/// 2. Checks `/etc/fluxion/environment` (system-wide)
/// 3. Falls back to `.env` in current directory (development)
/// 4. Does NOT override existing environment variables
///
/// Returns the path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("FLUXION_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

/// Try to load an environment file from the given path.
fn try_load_env_file(path: &str) -> Option<String> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        return None;
    }

    match fs::read_to_string(path_obj) {
        Ok(content) => {
            let mut loaded_count = 0;
            let mut skipped_count = 0;

            for (key, value) in content.lines().filter_map(parse_env_line) {
                if std::env::var(&key).is_err() {
                    let shown = if is_secret_key(&key) { "***" } else { value.as_str() };
                    debug!("Loaded: {}={}", key, shown);
                    std::env::set_var(&key, &value);
                    loaded_count += 1;
                } else {
                    skipped_count += 1;
                    debug!("Skipped (already set): {}", key);
                }
            }

            info!(
                "Loaded {} environment variables from {} ({} skipped - already set)",
                loaded_count, path, skipped_count
            );

            Some(path.to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            None
        }
    }
}

fn is_secret_key(key: &str) -> bool {
    key.contains("KEY") || key.contains("TOKEN") || key.contains("SECRET")
}

/// Parse a single environment line into key-value pair.
///
/// Comments and blank lines yield `None`.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    // Handle: KEY=VALUE, KEY="VALUE", KEY='VALUE'
    let (key, value) = line.split_once('=')?;
    let key = key.trim().trim_start_matches("export ").trim();
    let value = value.trim();

    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Get an optional configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

// ============================================================================
// RESOLVED APPLICATION CONFIG
// ============================================================================

/// Settings resolved from the environment at process start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding the SQLite database
    pub database_dir: PathBuf,
    /// Database file name inside `database_dir`
    pub database_name: String,
    /// Provider tag (`ollama`, `openai`)
    pub llm_provider: String,
    /// Model override; provider default when `None`
    pub llm_model: Option<String>,
    pub ollama_base_url: Option<String>,
    pub ollama_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    /// Schema reference document for text-to-SQL
    pub schema_path: PathBuf,
    pub max_result_rows: usize,
    pub max_query_length: usize,
    pub max_select_count: usize,
}

impl AppConfig {
    /// Resolve config from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(get_config_opt)
    }

    /// Resolve config through an arbitrary lookup function.
    ///
    /// `PATH_TO_DATABASE` and `NAME_DB` are required; everything else has a default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_dir = lookup("PATH_TO_DATABASE");
        let database_name = lookup("NAME_DB");

        let (database_dir, database_name) = match (database_dir, database_name) {
            (Some(dir), Some(name)) => (PathBuf::from(dir), name),
            _ => {
                return Err(Error::config(
                    "Database path and name must be provided through PATH_TO_DATABASE and NAME_DB",
                ))
            }
        };

        let positive_or = |key: &str, default: usize| -> Result<usize> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or_else(|| {
                        Error::config(format!("{} must be a positive integer, got '{}'", key, raw))
                    }),
                None => Ok(default),
            }
        };

        Ok(Self {
            database_dir,
            database_name,
            llm_provider: lookup("LLM_PROVIDER").unwrap_or_else(|| "ollama".to_string()),
            llm_model: lookup("LLM_MODEL"),
            ollama_base_url: lookup("URL_BASE_OLLAMA"),
            ollama_api_key: lookup("KEY_OLLAMA"),
            openai_base_url: lookup("URL_BASE_OPENAI").unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            openai_api_key: lookup("KEY_OPENAI"),
            schema_path: lookup("SQL_SCHEMA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_PATH)),
            max_result_rows: positive_or("SQL_MAX_RESULT_ROWS", 1000)?,
            max_query_length: positive_or("SQL_MAX_QUERY_LENGTH", 2000)?,
            max_select_count: positive_or("SQL_MAX_SELECT_COUNT", 5)?,
        })
    }

    /// Full path of the database file
    pub fn database_file(&self) -> PathBuf {
        self.database_dir.join(&self.database_name)
    }
}
