//! Configuration management using the prefer crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::migration::{DEFAULT_BATCH_SIZE, DEFAULT_DETAIL_LIMIT};

/// Default mapping lifetime in days.
pub const DEFAULT_MAPPING_TTL_DAYS: u64 = 7;

/// Default target database filename inside the data directory.
pub const DEFAULT_DATABASE_FILENAME: &str = "migration.db";

/// Default media subdirectory name.
const MEDIA_SUBDIR: &str = "media";

/// Name used for config discovery (`community-migrate.toml`, ...).
const CONFIG_NAME: &str = "community-migrate";

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory for the default target database and media.
    pub data_dir: PathBuf,
    /// Legacy source: a SQLite database or a `.json` dump.
    pub source: Option<PathBuf>,
    /// Target SQLite database (also holds the mapping store).
    pub target_database: PathBuf,
    /// Legacy system name used in mapping keys.
    pub source_system: String,
    pub mapping_ttl_days: u64,
    pub batch_size: u64,
    /// Itemized outcomes kept per entity when details are requested.
    pub detail_limit: usize,
    /// Base URL legacy media paths are relative to.
    pub media_base_url: Option<String>,
    /// Where downloaded media is stored.
    pub media_dir: PathBuf,
    /// HTTP timeout for media downloads, in seconds.
    pub request_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        // Local data dir -> home dir -> current dir
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_NAME);

        Self {
            source: None,
            target_database: data_dir.join(DEFAULT_DATABASE_FILENAME),
            media_dir: data_dir.join(MEDIA_SUBDIR),
            data_dir,
            source_system: "legacy".to_string(),
            mapping_ttl_days: DEFAULT_MAPPING_TTL_DAYS,
            batch_size: DEFAULT_BATCH_SIZE,
            detail_limit: DEFAULT_DETAIL_LIMIT,
            media_base_url: None,
            request_timeout: 30,
        }
    }
}

impl Settings {
    /// Create settings rooted at a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            target_database: data_dir.join(DEFAULT_DATABASE_FILENAME),
            media_dir: data_dir.join(MEDIA_SUBDIR),
            data_dir,
            ..Default::default()
        }
    }

    pub fn mapping_ttl(&self) -> Duration {
        Duration::from_secs(self.mapping_ttl_days.saturating_mul(24 * 60 * 60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Ensure the data, database and media directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        if let Some(parent) = self.target_database.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&self.media_dir)?;
        Ok(())
    }

    /// Apply environment overrides. `lookup` is `std::env::var` outside tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|s| !s.trim().is_empty());

        if let Some(source) = get("LEGACY_SOURCE") {
            tracing::debug!("Using LEGACY_SOURCE from environment: {}", source);
            self.source = Some(PathBuf::from(source));
        }
        if let Some(url) = get("TARGET_DATABASE_URL") {
            tracing::debug!("Using TARGET_DATABASE_URL from environment: {}", url);
            let path = url.strip_prefix("sqlite:").unwrap_or(&url);
            self.target_database = PathBuf::from(path.trim_start_matches("//"));
        }
        if let Some(system) = get("MIGRATION_SOURCE_SYSTEM") {
            self.source_system = system;
        }
        if let Some(url) = get("MEDIA_BASE_URL") {
            self.media_base_url = Some(url);
        }
        if let Some(dir) = get("MEDIA_DIR") {
            self.media_dir = PathBuf::from(dir);
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Legacy SQLite database or JSON dump.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Target SQLite database path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_ttl_days: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_dir: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    #[prefer(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery.
    /// Returns the default config when no file is found or it fails to parse.
    pub async fn load() -> Self {
        match prefer::load(CONFIG_NAME).await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config {}: {}", path.display(), e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// The format is chosen by extension: TOML, YAML, otherwise JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with `~/` are expanded to the home directory
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        if let (Some(rest), Some(home)) = (path_str.strip_prefix("~/"), dirs::home_dir()) {
            return home.join(rest);
        }
        let path = Path::new(path_str);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
            settings.target_database = settings.data_dir.join(DEFAULT_DATABASE_FILENAME);
            settings.media_dir = settings.data_dir.join(MEDIA_SUBDIR);
        }
        if let Some(ref source) = self.source {
            settings.source = Some(self.resolve_path(source, base_dir));
        }
        if let Some(ref database) = self.target_database {
            settings.target_database = self.resolve_path(database, base_dir);
        }
        if let Some(ref system) = self.source_system {
            settings.source_system = system.clone();
        }
        if let Some(days) = self.mapping_ttl_days {
            settings.mapping_ttl_days = days;
        }
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size;
        }
        if let Some(limit) = self.detail_limit {
            settings.detail_limit = limit;
        }
        if let Some(ref url) = self.media_base_url {
            settings.media_base_url = Some(url.clone());
        }
        if let Some(ref dir) = self.media_dir {
            settings.media_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of the config file directory.
    pub use_cwd: bool,
}

/// Load settings with explicit options.
///
/// Priority, lowest first: defaults, config file, environment. An explicit
/// config path that cannot be loaded is an error; a discovered one is not.
pub async fn load_settings_with_options(options: LoadOptions) -> Result<(Settings, Config), String> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = if options.use_cwd {
        cwd
    } else {
        config.base_dir().unwrap_or(cwd)
    };

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env_overrides(|name| std::env::var(name).ok());

    Ok((settings, config))
}
