//! Bootstrap configuration for clipon.
//!
//! This module loads the settings the daemon needs before it can open its
//! store: where files live, how often the clipboard is polled, and whether a
//! log file is written. Settings come from figment, merging defaults, a TOML
//! file and environment variables.
//!
//! The runtime-tunable history options (`autosave`, `max_entry`,
//! `max_length`) are not part of this file; see [`crate::options`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Directory name used under the per-user config and data directories.
const APP_DIR_NAME: &str = "clipon";

/// File holding the runtime history options.
const OPTIONS_FILE_NAME: &str = "clipon.conf";

/// Content log file name.
const DATA_LOG_FILE_NAME: &str = "history.txt";

/// Index file name.
const META_FILE_NAME: &str = "clipon.json";

/// Daemon log file name.
const LOG_FILE_NAME: &str = "clipon.log";

/// Singleton lock file name.
const LOCK_FILE_NAME: &str = "clipon.lock";

/// Service socket file name.
const SOCKET_FILE_NAME: &str = "clipon.sock";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CLIPON_`, sections split by `__`)
/// 2. TOML config file at `~/.config/clipon/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// File locations.
    pub paths: PathsConfig,
    /// Capture configuration.
    pub capture: CaptureConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// File locations. Every `None` resolves to a per-user default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding `clipon.conf`.
    pub config_dir: Option<PathBuf>,
    /// Directory holding the history files and the log file.
    pub data_dir: Option<PathBuf>,
    /// Singleton lock file.
    pub lock_file: Option<PathBuf>,
    /// Unix socket the daemon listens on.
    pub socket_path: Option<PathBuf>,
}

/// Capture-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Start with clipboard monitoring active.
    pub start_active: bool,
    /// Interval between clipboard checks in milliseconds.
    pub poll_interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write daemon logs to `clipon.log` in the data directory.
    pub log_to_file: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            start_active: true,
            poll_interval_ms: 500,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { log_to_file: true }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("CLIPON_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration rooted entirely under `root`.
    ///
    /// Used by tests and by embedders that don't want per-user paths.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            paths: PathsConfig {
                config_dir: Some(root.join("config")),
                data_dir: Some(root.join("data")),
                lock_file: Some(root.join(LOCK_FILE_NAME)),
                socket_path: Some(root.join(SOCKET_FILE_NAME)),
            },
            ..Self::default()
        }
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(CONFIG_FILE_NAME)
    }

    /// Get the default config directory path.
    #[must_use]
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(APP_DIR_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(APP_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.capture.poll_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "poll_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.lock_path() == self.socket_path() {
            return Err(Error::ConfigValidation {
                message: "lock_file and socket_path must differ".to_string(),
            });
        }

        Ok(())
    }

    /// Directory holding the options file.
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.paths
            .config_dir
            .clone()
            .unwrap_or_else(Self::default_config_dir)
    }

    /// Directory holding the history files.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Path of the runtime options file.
    #[must_use]
    pub fn options_path(&self) -> PathBuf {
        self.config_dir().join(OPTIONS_FILE_NAME)
    }

    /// Path of the content log.
    #[must_use]
    pub fn data_log_path(&self) -> PathBuf {
        self.data_dir().join(DATA_LOG_FILE_NAME)
    }

    /// Path of the history index.
    #[must_use]
    pub fn meta_path(&self) -> PathBuf {
        self.data_dir().join(META_FILE_NAME)
    }

    /// Path of the daemon log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.data_dir().join(LOG_FILE_NAME)
    }

    /// Get the lock path, resolving defaults if not set.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.paths.lock_file.clone().unwrap_or_else(|| {
            dirs::runtime_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(LOCK_FILE_NAME)
        })
    }

    /// Get the socket path, resolving defaults if not set.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.paths.socket_path.clone().unwrap_or_else(|| {
            dirs::runtime_dir()
                .unwrap_or_else(|| self.data_dir())
                .join(SOCKET_FILE_NAME)
        })
    }

    /// Get the clipboard poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.capture.poll_interval_ms)
    }

    /// Create the config and data directories with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.config_dir(), self.data_dir()] {
            create_private_dir(&dir)?;
        }
        Ok(())
    }
}

/// Create `path` (and parents) with mode 0700 where the platform allows it.
fn create_private_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    builder
        .create(path)
        .map_err(|source| Error::DirectoryCreate {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.capture.start_active);
        assert_eq!(config.capture.poll_interval_ms, 500);
        assert!(config.logging.log_to_file);
        assert!(config.paths.data_dir.is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.capture.poll_interval_ms = 0;

        let result = config.validate();
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("poll_interval_ms"));
    }

    #[test]
    fn test_validate_lock_equals_socket() {
        let mut config = Config::default();
        config.paths.lock_file = Some(PathBuf::from("/tmp/same"));
        config.paths.socket_path = Some(PathBuf::from("/tmp/same"));

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("must differ"));
    }

    #[test]
    fn test_store_paths_live_in_data_dir() {
        let mut config = Config::default();
        config.paths.data_dir = Some(PathBuf::from("/custom/data"));

        assert_eq!(
            config.data_log_path(),
            PathBuf::from("/custom/data/history.txt")
        );
        assert_eq!(config.meta_path(), PathBuf::from("/custom/data/clipon.json"));
        assert_eq!(config.log_path(), PathBuf::from("/custom/data/clipon.log"));
    }

    #[test]
    fn test_options_path_in_config_dir() {
        let mut config = Config::default();
        config.paths.config_dir = Some(PathBuf::from("/custom/config"));

        assert_eq!(
            config.options_path(),
            PathBuf::from("/custom/config/clipon.conf")
        );
    }

    #[test]
    fn test_lock_and_socket_defaults() {
        let config = Config::default();

        assert!(config.lock_path().to_string_lossy().ends_with("clipon.lock"));
        assert!(config.socket_path().to_string_lossy().ends_with("clipon.sock"));
    }

    #[test]
    fn test_rooted_at() {
        let config = Config::rooted_at(Path::new("/srv/clip"));

        assert_eq!(config.config_dir(), PathBuf::from("/srv/clip/config"));
        assert_eq!(config.data_dir(), PathBuf::from("/srv/clip/data"));
        assert_eq!(config.lock_path(), PathBuf::from("/srv/clip/clipon.lock"));
        assert_eq!(config.socket_path(), PathBuf::from("/srv/clip/clipon.sock"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_poll_interval() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("clipon"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Loading from a nonexistent path should work (uses defaults)
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(
            &file,
            "[capture]\npoll_interval_ms = 250\n\n[paths]\ndata_dir = \"/var/clip\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(file)).unwrap();
        assert_eq!(config.capture.poll_interval_ms, 250);
        assert_eq!(config.data_dir(), PathBuf::from("/var/clip"));
    }

    #[test]
    fn test_ensure_dirs_creates_private_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted_at(dir.path());

        config.ensure_dirs().unwrap();
        assert!(config.config_dir().is_dir());
        assert!(config.data_dir().is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(config.data_dir())
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn test_config_serialize() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("poll_interval_ms"));
        assert!(json.contains("log_to_file"));
    }
}
