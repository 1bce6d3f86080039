//! Application configuration for repoindex.
//!
//! User config lives at `~/.repoindex/repoindex.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RepoIndexError, Result};
use crate::types::RepositorySource;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "repoindex.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".repoindex";

// ---------------------------------------------------------------------------
// Config structs (matching repoindex.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Donor identifier service.
    #[serde(default)]
    pub identifier: IdentifierConfig,

    #[serde(default)]
    pub cghub: CghubConfig,

    #[serde(default)]
    pub ega: EgaConfig,

    /// AWS object-store listing.
    #[serde(default)]
    pub aws: ObjectStoreConfig,

    /// Collaboratory object-store listing.
    #[serde(default)]
    pub collab: ObjectStoreConfig,

    #[serde(default)]
    pub notify: NotifyConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Staging + published records database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Search index database.
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Sources imported when none are given on the command line.
    #[serde(default = "default_sources")]
    pub sources: Vec<RepositorySource>,

    /// Withhold records whose donors have no resolved identifier.
    #[serde(default)]
    pub require_donor_ids: bool,

    /// Connect/read timeout for upstream requests.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            index_path: default_index_path(),
            sources: default_sources(),
            require_donor_ids: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_db_path() -> String {
    "var/repoindex/repository.db".into()
}
fn default_index_path() -> String {
    "var/repoindex/index.db".into()
}
fn default_sources() -> Vec<RepositorySource> {
    RepositorySource::ALL.to_vec()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[identifier]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifierConfig {
    /// Base URL of the identifier service. Donors stay unresolved when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// `[cghub]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CghubConfig {
    #[serde(default = "default_cghub_url")]
    pub base_url: String,

    /// Disease abbreviations to query, one request each.
    #[serde(default = "default_disease_codes")]
    pub disease_codes: Vec<String>,
}

impl Default for CghubConfig {
    fn default() -> Self {
        Self {
            base_url: default_cghub_url(),
            disease_codes: default_disease_codes(),
        }
    }
}

fn default_cghub_url() -> String {
    "https://cghub.ucsc.edu".into()
}
fn default_disease_codes() -> Vec<String> {
    ["BRCA", "LUAD", "PRAD", "OV"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// `[ega]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgaConfig {
    #[serde(default = "default_ega_url")]
    pub base_url: String,

    /// Name of the env var holding the EGA user name.
    #[serde(default = "default_ega_user_env")]
    pub username_env: String,

    /// Name of the env var holding the EGA password (never store it here).
    #[serde(default = "default_ega_password_env")]
    pub password_env: String,
}

impl Default for EgaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ega_url(),
            username_env: default_ega_user_env(),
            password_env: default_ega_password_env(),
        }
    }
}

fn default_ega_url() -> String {
    "https://ega.ebi.ac.uk/ega/rest/access/v2".into()
}
fn default_ega_user_env() -> String {
    "EGA_USERNAME".into()
}
fn default_ega_password_env() -> String {
    "EGA_PASSWORD".into()
}

/// `[aws]` / `[collab]` sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// URL of the JSON object listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_url: Option<String>,
}

/// `[notify]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Webhook receiving the completion report. Reports are only logged when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// EGA credentials read from the environment.
#[derive(Clone)]
pub struct EgaCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for EgaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EgaCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl EgaConfig {
    /// Read credentials from the configured env vars.
    pub fn credentials(&self) -> Result<EgaCredentials> {
        let read = |var: &str| match std::env::var(var) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Err(RepoIndexError::config(format!(
                "EGA credentials not found. Set the {var} environment variable."
            ))),
        };

        Ok(EgaCredentials {
            username: read(&self.username_env)?,
            password: read(&self.password_env)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.repoindex/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RepoIndexError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.repoindex/repoindex.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RepoIndexError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        RepoIndexError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RepoIndexError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RepoIndexError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RepoIndexError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that configured endpoints are well-formed URLs.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let mut urls: Vec<(&str, &str)> = vec![
        ("cghub.base_url", config.cghub.base_url.as_str()),
        ("ega.base_url", config.ega.base_url.as_str()),
    ];
    if let Some(url) = &config.identifier.url {
        urls.push(("identifier.url", url.as_str()));
    }
    if let Some(url) = &config.aws.listing_url {
        urls.push(("aws.listing_url", url.as_str()));
    }
    if let Some(url) = &config.collab.listing_url {
        urls.push(("collab.listing_url", url.as_str()));
    }
    if let Some(url) = &config.notify.webhook_url {
        urls.push(("notify.webhook_url", url.as_str()));
    }

    for (key, value) in urls {
        url::Url::parse(value)
            .map_err(|e| RepoIndexError::config(format!("{key} '{value}' is not a valid URL: {e}")))?;
    }

    if config.defaults.timeout_secs == 0 {
        return Err(RepoIndexError::config("defaults.timeout_secs must be positive"));
    }

    Ok(())
}
