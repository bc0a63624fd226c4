//! Scanner configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the worker binary.
pub const SCANNER_BINARY: &str = "medley-scanner";

/// Default number of worker restarts before a scan is abandoned.
pub const DEFAULT_MAX_RESTARTS: u32 = 40;

/// Configuration for the scan orchestrator.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct ScannerConfig {
    /// Worker executable.
    #[builder(default = "default_scanner_path()")]
    pub scanner_path: PathBuf,

    /// Directory for batch files and checkpoints.
    #[builder(default = "default_scratch_dir()")]
    pub scratch_dir: PathBuf,

    /// Scan collection folders recursively.
    #[builder(default = "true")]
    pub recursive: bool,

    /// Periodically rescan the collection for changes.
    #[builder(default = "false")]
    pub monitor_changes: bool,

    /// Check the worker's version once after startup.
    #[builder(default = "true")]
    pub check_version: bool,

    /// Worker restarts allowed per scan.
    #[builder(default = "DEFAULT_MAX_RESTARTS")]
    pub max_restarts: u32,

    /// Interval between watch rescans, in milliseconds.
    #[builder(default = "60_000")]
    pub watch_interval_ms: u64,

    /// Delay before the version check, in milliseconds.
    #[builder(default = "30_000")]
    pub version_check_delay_ms: u64,

    /// Longest stretch of committing without a change notification, in
    /// milliseconds.
    #[builder(default = "5_000")]
    pub notify_interval_ms: u64,

    /// Time a worker gets to exit on its own before it is killed, in
    /// milliseconds.
    #[builder(default = "2_000")]
    pub kill_grace_ms: u64,
}

fn default_scanner_path() -> PathBuf {
    let name = format!("{SCANNER_BINARY}{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .filter(|path| path.exists())
        .unwrap_or_else(|| PathBuf::from(name))
}

fn default_scratch_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("medley")
}

impl ScannerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref path) = self.scanner_path {
            if path.as_os_str().is_empty() {
                return Err("Scanner path cannot be empty".to_string());
            }
        }
        if let Some(ref dir) = self.scratch_dir {
            if dir.as_os_str().is_empty() {
                return Err("Scratch directory cannot be empty".to_string());
            }
        }
        if self.notify_interval_ms == Some(0) {
            return Err("Notify interval must be positive".to_string());
        }
        Ok(())
    }
}

impl ScannerConfig {
    /// Create a new config builder.
    pub fn builder() -> ScannerConfigBuilder {
        ScannerConfigBuilder::default()
    }

    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("medley").join("config.toml"))
    }

    /// Load a config from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.notify_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "notify_interval_ms must be positive".to_string(),
            });
        }
        Ok(config)
    }

    /// Load the config file at the default location if it exists.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    pub fn version_check_delay(&self) -> Duration {
        Duration::from_millis(self.version_check_delay_ms)
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scanner_path: default_scanner_path(),
            scratch_dir: default_scratch_dir(),
            recursive: true,
            monitor_changes: false,
            check_version: true,
            max_restarts: DEFAULT_MAX_RESTARTS,
            watch_interval_ms: 60_000,
            version_check_delay_ms: 30_000,
            notify_interval_ms: 5_000,
            kill_grace_ms: 2_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ScannerConfig::builder()
            .scanner_path("/usr/bin/medley-scanner")
            .max_restarts(3u32)
            .recursive(false)
            .build()
            .unwrap();

        assert_eq!(config.scanner_path, PathBuf::from("/usr/bin/medley-scanner"));
        assert_eq!(config.max_restarts, 3);
        assert!(!config.recursive);
        assert_eq!(config.notify_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_builder_rejects_empty_path() {
        let result = ScannerConfig::builder().scanner_path("").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_restarts = 5\nmonitor_changes = true\n").unwrap();

        let config = ScannerConfig::load(&path).unwrap();
        assert_eq!(config.max_restarts, 5);
        assert!(config.monitor_changes);
        assert!(config.recursive);
        assert_eq!(config.kill_grace_ms, 2_000);
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_restarts = \"many\"").unwrap();

        assert!(matches!(
            ScannerConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
