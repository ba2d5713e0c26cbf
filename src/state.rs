//! Persisted per-channel version state
//!
//! `patch-version.json` lives next to the installation and records the
//! overall installed version plus any channels patched away from it.
//! Writes are atomic (write-temp-then-rename) so a crash mid-update can
//! never leave a corrupt state file behind.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalVersionState {
    /// Overall installed version
    pub version: String,
    /// Per-channel versions; a channel absent here is at `version`
    #[serde(default)]
    pub channels: HashMap<String, String>,
}

impl LocalVersionState {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            channels: HashMap::new(),
        }
    }

    /// Load state from disk, falling back to a fresh state at
    /// `fallback_version` when the file is missing or unreadable.
    pub fn load_or(path: &Path, fallback_version: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt version state, starting fresh");
                    Self::new(fallback_version)
                }
            },
            Err(_) => Self::new(fallback_version),
        }
    }

    /// Effective version of a channel (lazy default to the overall version)
    pub fn channel_version(&self, channel: &str) -> &str {
        self.channels
            .get(channel)
            .map(String::as_str)
            .unwrap_or(&self.version)
    }

    pub fn set_channel(&mut self, channel: &str, version: &str) {
        self.channels
            .insert(channel.to_string(), version.to_string());
    }

    /// Atomically write the state to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patch-version.json");

        let mut state = LocalVersionState::new("1.0.0");
        state.set_channel("frontend", "1.1.0");
        state.save(&path).unwrap();

        let loaded = LocalVersionState::load_or(&path, "0.0.0");
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_channel_defaults_to_overall_version() {
        let mut state = LocalVersionState::new("1.0.0");
        assert_eq!(state.channel_version("backend"), "1.0.0");

        state.set_channel("backend", "1.2.0");
        assert_eq!(state.channel_version("backend"), "1.2.0");
        assert_eq!(state.channel_version("frontend"), "1.0.0");
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let state = LocalVersionState::load_or(&dir.path().join("nope.json"), "1.0.0");
        assert_eq!(state.version, "1.0.0");
        assert!(state.channels.is_empty());
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patch-version.json");
        std::fs::write(&path, "{broken").unwrap();

        let state = LocalVersionState::load_or(&path, "1.0.0");
        assert_eq!(state, LocalVersionState::new("1.0.0"));
    }

    #[test]
    fn test_save_overwrites_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patch-version.json");

        LocalVersionState::new("1.0.0").save(&path).unwrap();
        LocalVersionState::new("1.1.0").save(&path).unwrap();

        let loaded = LocalVersionState::load_or(&path, "0.0.0");
        assert_eq!(loaded.version, "1.1.0");
        // No temp files left behind next to the state file
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
