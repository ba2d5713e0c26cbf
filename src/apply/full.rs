//! Full-update fallback
//!
//! Used whenever the differential path is unavailable or unsafe: no
//! manifest, an explicit `requires_full_update` flag, an installed version
//! below the manifest floor, or an unexpected differential failure. The
//! installer is downloaded to a staging directory and handed to the same
//! restart orchestration as a restart-required patch, with "run the
//! installer silently" in place of archive extraction.

use tracing::{info, warn};

use crate::apply::restart::{RestartOrchestrator, RestartPlan};
use crate::apply::{ApplyOutcome, Progress};
use crate::config::UpdateConfig;
use crate::errors::{Result, UpdateError};
use crate::manifest::is_plain_file_name;
use crate::net::Fetcher;
use crate::release::ReleaseDescriptor;

pub(crate) async fn apply_full_update(
    config: &UpdateConfig,
    fetcher: &Fetcher,
    orchestrator: &dyn RestartOrchestrator,
    release: &ReleaseDescriptor,
    progress: Progress<'_>,
) -> ApplyOutcome {
    match try_full_update(config, fetcher, orchestrator, release, progress).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "full update failed");
            ApplyOutcome::failed(&e)
        }
    }
}

async fn try_full_update(
    config: &UpdateConfig,
    fetcher: &Fetcher,
    orchestrator: &dyn RestartOrchestrator,
    release: &ReleaseDescriptor,
    progress: Progress<'_>,
) -> Result<ApplyOutcome> {
    let asset = release
        .installer_asset()
        .ok_or_else(|| UpdateError::Manifest("release has no installer asset".into()))?;
    // Release metadata is untrusted; the name becomes a staging path
    if !is_plain_file_name(&asset.name) {
        return Err(UpdateError::Manifest(format!(
            "unsafe installer asset name '{}'",
            asset.name
        )));
    }

    info!(version = %release.version(), asset = %asset.name, "downloading full installer");

    let staging = tempfile::Builder::new()
        .prefix("pulsepatch-full-")
        .tempdir_in(&config.staging_root)?;
    let installer = staging.path().join(&asset.name);

    fetcher
        .fetch_to_file(&asset.url, &installer, |done, total| {
            if let Some(total) = total.filter(|t| *t > 0) {
                let pct = ((done * 100) / total).min(99) as u8;
                progress(pct, None);
            }
        })
        .await?;

    let plan = RestartPlan {
        archives: Vec::new(),
        installer: Some(installer),
        staged_state: None,
        state_path: config.state_path(),
        staging_dir: staging.path().to_path_buf(),
        process_names: config.process_names.clone(),
        relaunch_exe: config.executable.clone(),
    };
    orchestrator.schedule_restart_apply(&plan)?;

    // The helper owns staging cleanup from here on
    let _ = staging.keep();

    progress(100, None);
    Ok(ApplyOutcome::restart_scheduled())
}
