//! Release resolution
//!
//! Queries the release feed for the latest release descriptor, fetches the
//! patch manifest when one is published, and decides between the
//! differential and full-only update paths. A failed check is advisory
//! only: every error collapses to "no update available".

use serde::Deserialize;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::UpdateConfig;
use crate::errors::Result;
use crate::manifest::{PatchManifest, MANIFEST_ASSET};
use crate::net::Fetcher;
use crate::plan::diff_channels;
use crate::state::LocalVersionState;
use crate::version::is_newer;

/// One downloadable file attached to a release
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(alias = "browser_download_url")]
    pub url: String,
    #[serde(default)]
    pub size: u64,
}

/// Latest-release descriptor from the feed endpoint.
///
/// Field aliases accept the GitHub releases API shape as well as the
/// bespoke feed shape.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseDescriptor {
    #[serde(alias = "tag_name")]
    pub tag: String,
    #[serde(default, alias = "body")]
    pub notes: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseDescriptor {
    /// Version string of the release (tag with any leading `v` stripped)
    pub fn version(&self) -> &str {
        self.tag.trim_start_matches('v')
    }

    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }

    /// Locate the full installer asset: prefer platform-conventional
    /// extensions, fall back to the largest non-metadata asset.
    pub fn installer_asset(&self) -> Option<&ReleaseAsset> {
        let preferred: &[&str] = if cfg!(windows) {
            &[".exe", ".msi"]
        } else if cfg!(target_os = "macos") {
            &[".dmg", ".pkg"]
        } else {
            &[".AppImage", ".deb", ".run"]
        };

        for ext in preferred {
            if let Some(asset) = self.assets.iter().find(|a| a.name.ends_with(ext)) {
                return Some(asset);
            }
        }

        self.assets
            .iter()
            .filter(|a| a.name != MANIFEST_ASSET && !a.name.ends_with(".sig"))
            .max_by_key(|a| a.size)
    }
}

/// Result of an update check, also the "update available" event payload
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateCheck {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_size: Option<u64>,
    pub channels: Vec<String>,
    pub full_only: bool,
}

impl UpdateCheck {
    fn none() -> Self {
        Self::default()
    }
}

/// Queries the release host and plans what an update would involve
pub struct Resolver<'a> {
    fetcher: &'a Fetcher,
    config: &'a UpdateConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(fetcher: &'a Fetcher, config: &'a UpdateConfig) -> Self {
        Self { fetcher, config }
    }

    /// Fetch the latest release descriptor from the feed.
    pub async fn latest_release(&self) -> Result<ReleaseDescriptor> {
        let body = self.fetcher.fetch_text(&self.config.feed_url).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch the release and, when published, its patch manifest.
    ///
    /// A manifest that cannot be fetched or parsed is treated as absent:
    /// the caller then routes to the full-update path rather than failing.
    pub async fn resolve(&self) -> Result<(ReleaseDescriptor, Option<PatchManifest>)> {
        let release = self.latest_release().await?;

        let manifest = match release.asset(MANIFEST_ASSET) {
            Some(asset) => match self.fetch_manifest(&asset.url).await {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    warn!(error = %e, "patch manifest unusable, falling back to full update");
                    None
                }
            },
            None => None,
        };

        Ok((release, manifest))
    }

    async fn fetch_manifest(&self, url: &str) -> Result<PatchManifest> {
        let body = self.fetcher.fetch_text(url).await?;
        PatchManifest::parse(&body)
    }

    /// Check whether an update is available for `local`.
    ///
    /// Never fails: any network or parse error is swallowed and reported
    /// as "no update", so a dead release host cannot block the app.
    pub async fn check_for_update(&self, local: &LocalVersionState) -> UpdateCheck {
        match self.try_check(local).await {
            Ok(check) => check,
            Err(e) => {
                debug!(error = %e, "update check failed");
                UpdateCheck::none()
            }
        }
    }

    async fn try_check(&self, local: &LocalVersionState) -> Result<UpdateCheck> {
        let (release, manifest) = self.resolve().await?;

        if !is_newer(&local.version, release.version()) {
            debug!(local = %local.version, remote = %release.version(), "already up to date");
            return Ok(UpdateCheck::none());
        }

        let manifest = match manifest {
            Some(m) if !m.requires_full_update && !below_floor(&local.version, &m) => m,
            _ => {
                let size = release.installer_asset().map(|a| a.size).unwrap_or(0);
                return Ok(UpdateCheck {
                    available: true,
                    version: Some(release.version().to_string()),
                    notes: Some(release.notes.clone()),
                    patch_size: Some(size),
                    channels: Vec::new(),
                    full_only: true,
                });
            }
        };

        let channels = diff_channels(local, &manifest);
        let patch_size = channels
            .iter()
            .filter_map(|c| manifest.entry(c))
            .map(|e| e.size)
            .sum();

        Ok(UpdateCheck {
            available: true,
            version: Some(release.version().to_string()),
            notes: Some(release.notes.clone()),
            patch_size: Some(patch_size),
            channels,
            full_only: false,
        })
    }
}

/// True when the installed version is below the manifest's supported floor.
pub fn below_floor(installed: &str, manifest: &PatchManifest) -> bool {
    manifest
        .min_version
        .as_deref()
        .is_some_and(|floor| is_newer(installed, floor))
}
