//! Configuration module for nomsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::geo::{DEFAULT_CELL_LEVEL, MAX_CELL_LEVEL};
use crate::domain::status::StatusTableVersion;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for nomsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub matching: MatchingConfig,
    pub remote: RemoteConfig,
    pub storage: StorageConfig,
    pub inbox: InboxConfig,
    pub logging: LoggingConfig,
}

/// Delivery queue and cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum number of change events delivered at once.
    pub concurrency: usize,
    /// Attempts per change event before it is dropped.
    pub retry_limit: u32,
    /// Age after which the candidate cache is rebuilt from the planner.
    pub cache_max_age_hours: u64,
}

/// Reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Cell level used to bucket candidates (1..=30).
    pub cell_level: u8,
    /// A placeholder with the same title within this distance is a duplicate.
    pub same_title_meters: f64,
    /// A placeholder with a different title closer than this is a duplicate.
    pub cross_title_meters: f64,
    /// Which status normalization table to apply.
    pub status_table: StatusTableVersion,
}

/// Remote planner and profile settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Planner endpoint. A value stored with `config set-endpoint` wins.
    pub endpoint_url: Option<String>,
    /// Profile API returning the uploader's nickname.
    pub profile_url: String,
    /// Nickname used when the profile API cannot be reached.
    pub nickname_fallback: String,
    pub request_timeout_secs: u64,
}

/// Local persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database holding the candidate cache.
    pub database: PathBuf,
}

/// Inbox directory watched for submission batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboxConfig {
    pub directory: PathBuf,
    /// Milliseconds a batch file must stay unchanged before it is read.
    pub debounce_ms: u64,
    /// Delete batch files once they have been processed.
    pub remove_processed: bool,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Write the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/nomsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("nomsync")
            .join("config.yaml")
    }

    /// Cache age limit as a chrono duration
    pub fn cache_max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.sync.cache_max_age_hours as i64)
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("nomsync")
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            retry_limit: 3,
            cache_max_age_hours: 12,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            cell_level: DEFAULT_CELL_LEVEL,
            same_title_meters: 10.0,
            cross_title_meters: 3.0,
            status_table: StatusTableVersion::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            profile_url: "https://wayfarer.nianticlabs.com/api/v1/vault/properties".to_string(),
            nickname_fallback: "wayfarer".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: data_dir().join("nomsync.db"),
        }
    }
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            directory: data_dir().join("inbox"),
            debounce_ms: 500,
            remove_processed: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.concurrency"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.concurrency == 0 {
            errors.push(ValidationError::new("sync.concurrency", "must be greater than 0"));
        }
        if self.sync.retry_limit == 0 {
            errors.push(ValidationError::new("sync.retry_limit", "must be greater than 0"));
        }
        if self.sync.cache_max_age_hours == 0 {
            errors.push(ValidationError::new(
                "sync.cache_max_age_hours",
                "must be greater than 0",
            ));
        }

        // --- matching ---
        if self.matching.cell_level == 0 || self.matching.cell_level > MAX_CELL_LEVEL {
            errors.push(ValidationError::new(
                "matching.cell_level",
                format!("must be in range 1..={MAX_CELL_LEVEL}"),
            ));
        }
        if !(self.matching.same_title_meters >= 0.0) {
            errors.push(ValidationError::new(
                "matching.same_title_meters",
                "must be a non-negative distance",
            ));
        }
        if !(self.matching.cross_title_meters >= 0.0) {
            errors.push(ValidationError::new(
                "matching.cross_title_meters",
                "must be a non-negative distance",
            ));
        }

        // --- remote ---
        if let Some(url) = &self.remote.endpoint_url {
            if !is_http_url(url) {
                errors.push(ValidationError::new(
                    "remote.endpoint_url",
                    format!("not an http(s) URL: {url}"),
                ));
            }
        }
        if !is_http_url(&self.remote.profile_url) {
            errors.push(ValidationError::new(
                "remote.profile_url",
                format!("not an http(s) URL: {}", self.remote.profile_url),
            ));
        }
        if self.remote.nickname_fallback.trim().is_empty() {
            errors.push(ValidationError::new(
                "remote.nickname_fallback",
                "must not be empty",
            ));
        }
        if self.remote.request_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "remote.request_timeout_secs",
                "must be greater than 0",
            ));
        }

        // --- inbox ---
        if self.inbox.debounce_ms == 0 {
            errors.push(ValidationError::new("inbox.debounce_ms", "must be greater than 0"));
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::new(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use nomsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .sync_concurrency(5)
///     .remote_endpoint_url("https://planner.example/exec")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_concurrency(mut self, n: usize) -> Self {
        self.config.sync.concurrency = n;
        self
    }

    pub fn sync_retry_limit(mut self, n: u32) -> Self {
        self.config.sync.retry_limit = n;
        self
    }

    pub fn sync_cache_max_age_hours(mut self, hours: u64) -> Self {
        self.config.sync.cache_max_age_hours = hours;
        self
    }

    // --- matching ---

    pub fn matching_cell_level(mut self, level: u8) -> Self {
        self.config.matching.cell_level = level;
        self
    }

    pub fn matching_same_title_meters(mut self, meters: f64) -> Self {
        self.config.matching.same_title_meters = meters;
        self
    }

    pub fn matching_cross_title_meters(mut self, meters: f64) -> Self {
        self.config.matching.cross_title_meters = meters;
        self
    }

    pub fn matching_status_table(mut self, version: StatusTableVersion) -> Self {
        self.config.matching.status_table = version;
        self
    }

    // --- remote ---

    pub fn remote_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.endpoint_url = Some(url.into());
        self
    }

    pub fn remote_profile_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.profile_url = url.into();
        self
    }

    pub fn remote_nickname_fallback(mut self, nickname: impl Into<String>) -> Self {
        self.config.remote.nickname_fallback = nickname.into();
        self
    }

    pub fn remote_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.remote.request_timeout_secs = seconds;
        self
    }

    // --- storage ---

    pub fn storage_database(mut self, path: PathBuf) -> Self {
        self.config.storage.database = path;
        self
    }

    // --- inbox ---

    pub fn inbox_directory(mut self, path: PathBuf) -> Self {
        self.config.inbox.directory = path;
        self
    }

    pub fn inbox_debounce_ms(mut self, ms: u64) -> Self {
        self.config.inbox.debounce_ms = ms;
        self
    }

    pub fn inbox_remove_processed(mut self, remove: bool) -> Self {
        self.config.inbox.remove_processed = remove;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
