//! Configuration resolution for the proof job
//!
//! Settings resolve ENV-first with an optional TOML file supplying
//! non-secret defaults (priority: ENV → TOML → compiled default). Secrets
//! (the API token, the encryption passphrase) are only ever accepted from
//! the environment; a TOML file checked into an image must not carry them.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Env var naming the optional TOML config file.
const CONFIG_PATH_VAR: &str = "STREAMPROOF_CONFIG";

const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_MAX_POINTS: u32 = 1000;
const DEFAULT_FETCH_BUDGET_SECS: u64 = 45;
const DEFAULT_MAX_PAGES: u32 = 5;
const DEFAULT_PAGE_SIZE: u32 = 50;
const DEFAULT_OUTPUT_DIR: &str = "/output";

/// Non-secret defaults loadable from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub api_base_url: Option<String>,
    pub max_points: Option<u32>,
    pub fetch_budget_secs: Option<u64>,
    pub max_pages: Option<u32>,
    pub page_size: Option<u32>,
    pub output_dir: Option<String>,
    pub dlp_id: Option<i64>,
}

/// Fully resolved job settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Upstream API bearer token (secret)
    pub api_token: String,
    /// Upstream API base URL
    pub api_base_url: String,
    /// Passphrase for symmetric artifact encryption (secret)
    pub encryption_passphrase: String,
    /// Opaque encrypted refresh-token blob persisted alongside the state row
    pub encrypted_refresh_token: Option<String>,
    /// Ledger database URL (sqlite)
    pub database_url: String,
    /// Destination address for the encrypted artifact
    pub file_url: String,
    /// File identifier assigned by the outer job scheduler
    pub file_id: i64,
    /// TEE job identifier
    pub job_id: String,
    /// Contributor's wallet address
    pub owner_address: String,
    /// Data pool identifier
    pub dlp_id: i64,
    /// Denominator for score normalization
    pub max_points: u32,
    /// Wall-clock budget for history collection, in seconds
    pub fetch_budget_secs: u64,
    /// Maximum backward-pagination depth per run
    pub max_pages: u32,
    /// Items requested per page
    pub page_size: u32,
    /// Directory the result document is written to
    pub output_dir: PathBuf,
}

impl Settings {
    /// Resolve settings from the process environment, honoring
    /// `STREAMPROOF_CONFIG` as an optional TOML defaults file.
    pub fn load() -> Result<Self> {
        let toml_config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => {
                tracing::info!("loading config defaults from {}", path);
                Some(load_toml_config(&path)?)
            }
            Err(_) => None,
        };
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_sources(&env, toml_config.unwrap_or_default())
    }

    /// Resolve settings from explicit sources. Split out of `load` so tests
    /// do not have to mutate the process environment.
    pub fn from_sources(env: &HashMap<String, String>, file: TomlConfig) -> Result<Self> {
        let get = |key: &str| env.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_token = get("STREAMPROOF_API_TOKEN")
            .ok_or_else(|| Error::Config("STREAMPROOF_API_TOKEN is required".to_string()))?;
        let encryption_passphrase = get("STREAMPROOF_ENCRYPTION_KEY")
            .ok_or_else(|| Error::Config("STREAMPROOF_ENCRYPTION_KEY is required".to_string()))?;
        let database_url = get("STREAMPROOF_DATABASE_URL")
            .ok_or_else(|| Error::Config("STREAMPROOF_DATABASE_URL is required".to_string()))?;
        let file_url = get("STREAMPROOF_FILE_URL")
            .ok_or_else(|| Error::Config("STREAMPROOF_FILE_URL is required".to_string()))?;

        Ok(Settings {
            api_token,
            api_base_url: get("STREAMPROOF_API_BASE_URL")
                .or(file.api_base_url)
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            encryption_passphrase,
            encrypted_refresh_token: get("STREAMPROOF_ENCRYPTED_REFRESH_TOKEN"),
            database_url,
            file_url,
            file_id: parse_or("STREAMPROOF_FILE_ID", get("STREAMPROOF_FILE_ID"), 0)?,
            job_id: get("STREAMPROOF_JOB_ID").unwrap_or_default(),
            owner_address: get("STREAMPROOF_OWNER_ADDRESS").unwrap_or_default(),
            dlp_id: parse_or("STREAMPROOF_DLP_ID", get("STREAMPROOF_DLP_ID"), file.dlp_id.unwrap_or(0))?,
            max_points: parse_or(
                "STREAMPROOF_MAX_POINTS",
                get("STREAMPROOF_MAX_POINTS"),
                file.max_points.unwrap_or(DEFAULT_MAX_POINTS),
            )?,
            fetch_budget_secs: parse_or(
                "STREAMPROOF_FETCH_BUDGET_SECS",
                get("STREAMPROOF_FETCH_BUDGET_SECS"),
                file.fetch_budget_secs.unwrap_or(DEFAULT_FETCH_BUDGET_SECS),
            )?,
            max_pages: parse_or(
                "STREAMPROOF_MAX_PAGES",
                get("STREAMPROOF_MAX_PAGES"),
                file.max_pages.unwrap_or(DEFAULT_MAX_PAGES),
            )?,
            page_size: parse_or(
                "STREAMPROOF_PAGE_SIZE",
                get("STREAMPROOF_PAGE_SIZE"),
                file.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            )?,
            output_dir: PathBuf::from(
                get("STREAMPROOF_OUTPUT_DIR")
                    .or(file.output_dir)
                    .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            ),
        })
    }

    /// Loggable view with secrets removed.
    pub fn redacted(&self) -> RedactedSettings<'_> {
        RedactedSettings {
            api_base_url: &self.api_base_url,
            database_url: &self.database_url,
            file_url: &self.file_url,
            file_id: self.file_id,
            job_id: &self.job_id,
            owner_address: &self.owner_address,
            dlp_id: self.dlp_id,
            max_points: self.max_points,
            fetch_budget_secs: self.fetch_budget_secs,
            max_pages: self.max_pages,
            page_size: self.page_size,
            output_dir: &self.output_dir,
        }
    }
}

/// Settings with secret fields omitted, safe to log.
#[derive(Debug)]
pub struct RedactedSettings<'a> {
    pub api_base_url: &'a str,
    pub database_url: &'a str,
    pub file_url: &'a str,
    pub file_id: i64,
    pub job_id: &'a str,
    pub owner_address: &'a str,
    pub dlp_id: i64,
    pub max_points: u32,
    pub fetch_budget_secs: u64,
    pub max_pages: u32,
    pub page_size: u32,
    pub output_dir: &'a PathBuf,
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(value) => value
            .parse()
            .map_err(|_| Error::Config(format!("{} is not a valid number: {}", key, value))),
        None => Ok(default),
    }
}

fn load_toml_config(path: &str) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read config file failed ({}): {}", path, e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse config file failed ({}): {}", path, e)))
}
