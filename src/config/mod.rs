//! Configuration types for catalog access and download runs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of transfers allowed in flight at once.
pub const CONCURRENCY_LIMIT: usize = 4;

/// Default catalog server.
pub const DEFAULT_SERVER: &str = "https://api.tnris.org";

/// How the coordinator refills the transfer window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowPolicy {
    /// Fill the window, then wait for the whole window to drain before
    /// dispatching the next resource.
    #[default]
    Batch,
    /// Dispatch the next resource as soon as any slot frees up.
    Sliding,
}

/// Configuration for download runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Number of concurrent file downloads.
    pub concurrent_files: usize,
    /// Window refill policy.
    pub window: WindowPolicy,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrent_files: CONCURRENCY_LIMIT,
            window: WindowPolicy::Batch,
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of concurrent file downloads.
    #[must_use]
    pub const fn with_concurrent_files(mut self, concurrent: usize) -> Self {
        self.concurrent_files = concurrent;
        self
    }

    /// Sets the window refill policy.
    #[must_use]
    pub const fn with_window(mut self, window: WindowPolicy) -> Self {
        self.window = window;
        self
    }

    /// Returns the effective window width (never zero).
    #[must_use]
    pub fn limit(&self) -> usize {
        self.concurrent_files.max(1)
    }
}

/// Catalog server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the catalog service, without a trailing slash.
    pub server: String,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            connect_timeout_secs: 30,
        }
    }
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory where downloaded files are saved.
    pub download_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Download configuration.
    pub download: DownloadConfig,
    /// Catalog configuration.
    pub catalog: CatalogConfig,
    /// Path configuration.
    pub paths: PathConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the config file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("datahub-dl")
            .join("config.toml")
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid TOML for this shape.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Loads configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Loads configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    /// Environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => {
                let default_path = Self::default_path();
                if default_path.is_file() {
                    log::debug!("Loading config from {}", default_path.display());
                    Self::load(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `DATAHUB_SERVER` and `DATAHUB_DOWNLOAD_DIR` overrides.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(server) = lookup("DATAHUB_SERVER").filter(|s| !s.is_empty()) {
            self.catalog.server = server.trim_end_matches('/').to_string();
        }
        if let Some(dir) = lookup("DATAHUB_DOWNLOAD_DIR").filter(|s| !s.is_empty()) {
            self.paths.download_dir = Some(PathBuf::from(dir));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_download_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.concurrent_files, 4);
        assert_eq!(config.window, WindowPolicy::Batch);
    }

    #[test]
    fn download_config_builder_pattern() {
        let config = DownloadConfig::new()
            .with_concurrent_files(2)
            .with_window(WindowPolicy::Sliding);

        assert_eq!(config.concurrent_files, 2);
        assert_eq!(config.window, WindowPolicy::Sliding);
    }

    #[test]
    fn zero_limit_is_clamped() {
        assert_eq!(DownloadConfig::new().with_concurrent_files(0).limit(), 1);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [download]
            window = "sliding"

            [paths]
            download_dir = "/tmp/out"
            "#,
        )
        .unwrap();
        assert_eq!(config.download.window, WindowPolicy::Sliding);
        assert_eq!(config.download.concurrent_files, 4);
        assert_eq!(config.catalog.server, DEFAULT_SERVER);
        assert_eq!(config.paths.download_dir, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("[download\nwindow = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[catalog]\nserver = \"http://localhost:9000\"\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.catalog.server, "http://localhost:9000");
        assert_eq!(config.catalog.connect_timeout_secs, 30);
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = AppConfig::load_or_default(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            "DATAHUB_SERVER" => Some("http://mirror.local/".to_string()),
            "DATAHUB_DOWNLOAD_DIR" => Some("/data".to_string()),
            _ => None,
        });
        assert_eq!(config.catalog.server, "http://mirror.local");
        assert_eq!(config.paths.download_dir, Some(PathBuf::from("/data")));
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let loaded = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(loaded.download.concurrent_files, config.download.concurrent_files);
        assert_eq!(loaded.catalog.server, config.catalog.server);
    }
}
