//! CLI configuration resolved from environment variables

use std::env;
use std::path::PathBuf;

use pannier_core::EngineConfig;

use crate::error::CliError;

const API_URL_VAR: &str = "PANNIER_API_URL";
const TOKEN_VAR: &str = "PANNIER_TOKEN";
const DB_PATH_VAR: &str = "PANNIER_DB_PATH";

const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Everything a CLI invocation needs to wire up the engine.
pub struct CliConfig {
    pub engine: EngineConfig,
    pub credential: String,
}

/// Resolve configuration, preferring the command-line db path over the
/// environment over the platform data directory.
pub fn load(db_path_override: Option<PathBuf>) -> Result<CliConfig, CliError> {
    let api_url = env::var(API_URL_VAR).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    let credential = env::var(TOKEN_VAR)
        .ok()
        .filter(|token| !token.trim().is_empty())
        .ok_or(CliError::MissingToken)?;
    let db_path = db_path_override
        .or_else(|| env::var(DB_PATH_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(default_db_path);

    let engine = EngineConfig::new(api_url, db_path)?;
    Ok(CliConfig { engine, credential })
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pannier")
        .join("cache.db")
}
