//! Patch manifest schema
//!
//! A manifest describes one update generation: the target version, whether
//! only a full reinstall is supported, and the per-channel archives with
//! their integrity digests.

use std::collections::HashMap;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, UpdateError};

/// Asset name the resolver looks for on each release
pub const MANIFEST_ASSET: &str = "patch-manifest.json";

/// Fixed channel enumeration; apply order always follows this, never the
/// manifest's insertion order, so applies are deterministic across runs.
pub const CHANNEL_ORDER: [&str; 4] = ["frontend", "electron", "backend", "html"];

/// Channels whose archives contain the running executable or its core
/// runtime; patching any of these requires the kill/extract/relaunch path.
pub const RESTART_CHANNELS: [&str; 2] = ["electron", "backend"];

/// One updatable slice of the installed application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEntry {
    /// Release asset name holding this channel's tar.gz archive
    pub asset: String,
    /// Archive size in bytes
    pub size: u64,
    /// Expected SHA-256 of the archive, lowercase hex
    pub sha256: String,
    /// Extraction target, relative to the install directory
    pub target_dir: String,
}

/// Description of one update generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchManifest {
    /// Version every listed channel is brought to
    pub version: String,
    /// When set, only a full reinstall is supported for this generation
    #[serde(default)]
    pub requires_full_update: bool,
    /// Installed versions below this can only take the full-update path
    #[serde(default)]
    pub min_version: Option<String>,
    #[serde(default)]
    pub channels: HashMap<String, ChannelEntry>,
}

impl PatchManifest {
    pub fn parse(text: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(text)
            .map_err(|e| UpdateError::Manifest(format!("Invalid patch manifest: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Manifests come off the network; every name that ends up in a
    /// filesystem path must stay inside the directory it is joined to.
    fn validate(&self) -> Result<()> {
        for (name, entry) in &self.channels {
            if !is_plain_file_name(&entry.asset) {
                return Err(UpdateError::Manifest(format!(
                    "channel '{}' has unsafe asset name '{}'",
                    name, entry.asset
                )));
            }
            if !is_confined_dir(&entry.target_dir) {
                return Err(UpdateError::Manifest(format!(
                    "channel '{}' has unsafe target dir '{}'",
                    name, entry.target_dir
                )));
            }
        }
        Ok(())
    }

    /// Look up a channel entry by name
    pub fn entry(&self, channel: &str) -> Option<&ChannelEntry> {
        self.channels.get(channel)
    }
}

/// True for a bare file name: no separators, no traversal, nothing the
/// platform would rewrite. Checked by requiring sanitization to be a no-op.
pub(crate) fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && sanitize_filename::sanitize_with_options(
            name,
            sanitize_filename::Options {
                replacement: "_",
                windows: true,
                truncate: true,
            },
        ) == name
}

/// True for a relative path made of normal components only, so joining it
/// under a root cannot escape that root.
pub(crate) fn is_confined_dir(dir: &str) -> bool {
    !dir.is_empty()
        && Path::new(dir)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// True if any planned channel forces a process restart.
pub fn requires_restart(channels: &[String]) -> bool {
    channels
        .iter()
        .any(|c| RESTART_CHANNELS.contains(&c.as_str()))
}
