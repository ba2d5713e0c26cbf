//! Engine configuration
//!
//! Configuration lives in an optional `update.toml` next to the
//! installation. Library callers usually construct [`UpdateConfig`]
//! programmatically and override individual fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::UpdateError;

/// Name of the persisted per-channel version state file.
pub const VERSION_STATE_FILE: &str = "patch-version.json";

/// Name of the optional on-disk config file.
pub const CONFIG_FILE: &str = "update.toml";

/// Update engine configuration
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Endpoint returning the latest release descriptor as JSON
    pub feed_url: String,
    /// Root directory of the installed application
    pub install_dir: PathBuf,
    /// Version of the currently running application
    pub app_version: String,
    /// Main executable to relaunch after a restart-required apply
    pub executable: PathBuf,
    /// Process names the restart helper terminates before extracting
    pub process_names: Vec<String>,
    /// Delay before the first periodic check
    pub initial_delay: Duration,
    /// Interval between periodic checks
    pub check_interval: Duration,
    /// Per-request timeout for release/manifest probe calls
    pub probe_timeout: Duration,
    /// Directory under which per-apply staging directories are created
    pub staging_root: PathBuf,
}

/// Raw shape of `update.toml`
#[derive(Debug, Deserialize)]
struct RawConfig {
    feed_url: String,
    app_version: String,
    executable: Option<PathBuf>,
    #[serde(default)]
    process_names: Vec<String>,
    initial_delay_secs: Option<u64>,
    check_interval_secs: Option<u64>,
    probe_timeout_secs: Option<u64>,
}

impl UpdateConfig {
    /// Create a configuration with default timings
    pub fn new(
        feed_url: impl Into<String>,
        install_dir: impl Into<PathBuf>,
        app_version: impl Into<String>,
    ) -> Self {
        let install_dir = install_dir.into();
        Self {
            feed_url: feed_url.into(),
            executable: install_dir.join("app"),
            install_dir,
            app_version: app_version.into(),
            process_names: Vec::new(),
            initial_delay: Duration::from_secs(30),
            check_interval: Duration::from_secs(3600),
            probe_timeout: Duration::from_secs(10),
            staging_root: std::env::temp_dir(),
        }
    }

    /// Load configuration from `update.toml` in the install directory
    pub fn load(install_dir: &Path) -> Result<Self, UpdateError> {
        let config_file = install_dir.join(CONFIG_FILE);

        let content = std::fs::read_to_string(&config_file).map_err(|e| {
            UpdateError::Config(format!(
                "Failed to read {}: {}",
                config_file.display(),
                e
            ))
        })?;

        let raw: RawConfig = toml::from_str(&content)
            .map_err(|e| UpdateError::Config(format!("Invalid config TOML: {}", e)))?;

        let mut config = Self::new(raw.feed_url, install_dir, raw.app_version);
        if let Some(exe) = raw.executable {
            config.executable = if exe.is_absolute() {
                exe
            } else {
                install_dir.join(exe)
            };
        }
        config.process_names = raw.process_names;
        if let Some(secs) = raw.initial_delay_secs {
            config.initial_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = raw.check_interval_secs {
            config.check_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = raw.probe_timeout_secs {
            config.probe_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Path of the persisted version state file
    pub fn state_path(&self) -> PathBuf {
        self.install_dir.join(VERSION_STATE_FILE)
    }

    /// Resolve a manifest-relative target directory against the install dir
    pub fn target_dir(&self, relative: &str) -> PathBuf {
        self.install_dir.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
feed_url = "https://releases.example.com/latest"
app_version = "1.0.0"
executable = "bin/app"
process_names = ["app", "app-backend"]
check_interval_secs = 600
"#,
        )
        .unwrap();

        let config = UpdateConfig::load(dir.path()).unwrap();
        assert_eq!(config.feed_url, "https://releases.example.com/latest");
        assert_eq!(config.app_version, "1.0.0");
        assert_eq!(config.executable, dir.path().join("bin/app"));
        assert_eq!(config.process_names, vec!["app", "app-backend"]);
        assert_eq!(config.check_interval, Duration::from_secs(600));
        // Defaults survive partial files
        assert_eq!(config.probe_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_load_missing_or_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(UpdateConfig::load(dir.path()).is_err());

        std::fs::write(dir.path().join(CONFIG_FILE), "not = [valid").unwrap();
        assert!(matches!(
            UpdateConfig::load(dir.path()),
            Err(UpdateError::Config(_))
        ));
    }
}
