//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/loadrun/config.toml)
//! 3. Environment variables (LOADRUN_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variable prefix
const ENV_PREFIX: &str = "LOADRUN";

/// Runtime the storage layer runs in
///
/// Web fallback stores are only used on `Web`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Mobile or desktop: primary store only
    #[default]
    Native,
    /// Browser-like runtime with session/local/object stores
    Web,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Native => "native",
            Platform::Web => "web",
        }
    }

    pub fn is_web(&self) -> bool {
        matches!(self, Platform::Web)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" | "mobile" | "ios" | "android" => Ok(Platform::Native),
            "web" => Ok(Platform::Web),
            other => anyhow::bail!("Unknown platform '{}'. Use 'native' or 'web'.", other),
        }
    }
}

/// Storage toggles, fixed when the orchestrator is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceOptions {
    /// Fan out to session/local stores on the web platform
    pub enable_web_fallbacks: bool,
    /// Also write to the SQLite object database on the web platform
    pub enable_object_database: bool,
    /// Write alias keys in addition to the logical key
    pub enable_multiple_backups: bool,
    /// Gzip payloads before storing them
    pub compression_enabled: bool,
    /// Upper bound on derived alias keys per logical key
    pub max_aliases: usize,
    /// Aliases not rewritten for this many days are garbage-collected
    pub alias_retention_days: Option<u32>,
    /// Byte quota for the session store
    pub session_quota_bytes: Option<usize>,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self {
            enable_web_fallbacks: true,
            enable_object_database: true,
            enable_multiple_backups: true,
            compression_enabled: false,
            max_aliases: 6,
            alias_retention_days: None,
            session_quota_bytes: None,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (primary store, local store, object db)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Runtime platform
    #[serde(default)]
    pub platform: Platform,

    /// Log file (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Storage options
    #[serde(default)]
    pub storage: PersistenceOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            platform: Platform::default(),
            log_file: None,
            storage: PersistenceOptions::default(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path from the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_PLATFORM", ENV_PREFIX)) {
            match val.parse() {
                Ok(platform) => self.platform = platform,
                Err(e) => warn!("Ignoring {}_PLATFORM: {}", ENV_PREFIX, e),
            }
        }

        if let Some(val) = env_flag("WEB_FALLBACKS") {
            self.storage.enable_web_fallbacks = val;
        }
        if let Some(val) = env_flag("OBJECT_DATABASE") {
            self.storage.enable_object_database = val;
        }
        if let Some(val) = env_flag("COMPRESSION") {
            self.storage.compression_enabled = val;
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with LOADRUN_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("loadrun")
            .join("config.toml")
    }

    /// Directory of the primary file store
    pub fn primary_dir(&self) -> PathBuf {
        self.data_dir.join("primary")
    }

    /// JSON file of the persistent web store
    pub fn local_storage_path(&self) -> PathBuf {
        self.data_dir.join("local_storage.json")
    }

    /// SQLite file of the object database
    pub fn object_db_path(&self) -> PathBuf {
        self.data_dir.join("objects.db")
    }
}

/// Read a boolean LOADRUN_* variable ("true"/"1" are true)
fn env_flag(name: &str) -> Option<bool> {
    std::env::var(format!("{}_{}", ENV_PREFIX, name))
        .ok()
        .map(|val| val.eq_ignore_ascii_case("true") || val == "1")
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loadrun")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "LOADRUN_DATA_DIR",
        "LOADRUN_PLATFORM",
        "LOADRUN_WEB_FALLBACKS",
        "LOADRUN_OBJECT_DATABASE",
        "LOADRUN_COMPRESSION",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.platform, Platform::Native);
        assert!(config.log_file.is_none());
        assert!(config.data_dir.ends_with("loadrun"));
        assert!(config.storage.enable_multiple_backups);
        assert!(!config.storage.compression_enabled);
        assert_eq!(config.storage.max_aliases, 6);
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.primary_dir().ends_with("primary"));
        assert!(config.local_storage_path().ends_with("local_storage.json"));
        assert!(config.object_db_path().ends_with("objects.db"));
    }

    #[test]
    fn test_platform_parsing() {
        assert_eq!("web".parse::<Platform>().unwrap(), Platform::Web);
        assert_eq!("Android".parse::<Platform>().unwrap(), Platform::Native);
        assert!("desktop-gui".parse::<Platform>().is_err());
        assert_eq!(Platform::Web.to_string(), "web");
    }

    #[test]
    fn test_env_override_data_dir_and_platform() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("LOADRUN_DATA_DIR", "/tmp/loadrun-test");
        env::set_var("LOADRUN_PLATFORM", "web");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/loadrun-test"));
        assert_eq!(config.platform, Platform::Web);
    }

    #[test]
    fn test_invalid_platform_env_is_ignored() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("LOADRUN_PLATFORM", "toaster");
        config.apply_env_overrides();
        assert_eq!(config.platform, Platform::Native);
    }

    #[test]
    fn test_env_override_flags() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("LOADRUN_COMPRESSION", "1");
        env::set_var("LOADRUN_WEB_FALLBACKS", "false");
        env::set_var("LOADRUN_OBJECT_DATABASE", "TRUE");
        config.apply_env_overrides();

        assert!(config.storage.compression_enabled);
        assert!(!config.storage.enable_web_fallbacks);
        assert!(config.storage.enable_object_database);
    }

    #[test]
    fn test_load_from_str_partial_storage_section() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            platform = "web"

            [storage]
            compression_enabled = true
            alias_retention_days = 30
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.platform, Platform::Web);
        assert!(config.storage.compression_enabled);
        assert_eq!(config.storage.alias_retention_days, Some(30));
        // Unspecified fields keep their defaults
        assert!(config.storage.enable_web_fallbacks);
        assert_eq!(config.storage.max_aliases, 6);
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("cfg").join("config.toml");

        let mut config = Config::default();
        config.data_dir = temp_dir.path().join("data");
        config.platform = Platform::Web;
        config.storage.session_quota_bytes = Some(4096);
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.data_dir, config.data_dir);
        assert_eq!(loaded.platform, Platform::Web);
        assert_eq!(loaded.storage, config.storage);
        assert!(loaded.data_dir.exists());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("LOADRUN_DATA_DIR", temp_dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.platform, Platform::Native);
        assert!(config.storage.enable_web_fallbacks);
    }
}
