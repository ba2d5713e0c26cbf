//! Apply engine
//!
//! Orchestrates one apply attempt end to end: re-resolve the release,
//! route to the full-update fallback when the differential path is
//! unavailable, otherwise download the planned channel archives into a
//! staging directory, verify every digest, and apply either in place
//! (hot reload) or through the detached restart helper.
//!
//! Failure semantics: network and integrity errors surface as a failed
//! outcome with the version state untouched; everything else falls back
//! to the full update rather than propagating. The staging directory is
//! removed on every exit path except a scheduled restart, where the
//! helper owns its cleanup.

pub mod archive;
pub mod full;
pub mod restart;

use std::fmt::Display;

use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::UpdateConfig;
use crate::errors::{Result, UpdateError};
use crate::integrity::digest_file;
use crate::manifest::{requires_restart, ChannelEntry, PatchManifest, CHANNEL_ORDER};
use crate::net::Fetcher;
use crate::plan::diff_channels;
use crate::release::{below_floor, ReleaseDescriptor, Resolver};
use crate::state::LocalVersionState;
use crate::version::is_newer;

use restart::{RestartOrchestrator, RestartPlan};

/// Progress callback: percent complete plus the channel being worked on
pub type Progress<'a> = &'a (dyn Fn(u8, Option<&str>) + Send + Sync);

/// Structured result of one apply attempt; the public boundary never throws
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub success: bool,
    pub error: Option<String>,
    /// The detached helper has been scheduled; the caller should exit soon
    pub restart_pending: bool,
}

impl ApplyOutcome {
    pub(crate) fn done() -> Self {
        Self {
            success: true,
            error: None,
            restart_pending: false,
        }
    }

    pub(crate) fn restart_scheduled() -> Self {
        Self {
            success: true,
            error: None,
            restart_pending: true,
        }
    }

    pub(crate) fn failed(error: impl Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            restart_pending: false,
        }
    }
}

/// Run one apply attempt.
pub(crate) async fn apply_patch(
    config: &UpdateConfig,
    fetcher: &Fetcher,
    orchestrator: &dyn RestartOrchestrator,
    progress: Progress<'_>,
) -> ApplyOutcome {
    let resolver = Resolver::new(fetcher, config);

    // Never trust a possibly stale check result; re-resolve before acting
    let (release, manifest) = match resolver.resolve().await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(error = %e, "could not resolve release");
            return ApplyOutcome::failed(&e);
        }
    };

    let local = LocalVersionState::load_or(&config.state_path(), &config.app_version);

    let manifest = match manifest {
        Some(m) if !m.requires_full_update && !below_floor(&local.version, &m) => m,
        _ => {
            // Full reinstall only for genuinely newer releases; a manifest
            // flag alone must not reinstall the version already running
            if !is_newer(&local.version, release.version()) {
                debug!("release is not newer, nothing to apply");
                return ApplyOutcome::done();
            }
            return full::apply_full_update(config, fetcher, orchestrator, &release, progress)
                .await;
        }
    };

    match differential(config, fetcher, orchestrator, &release, &manifest, &local, progress).await
    {
        Ok(outcome) => outcome,
        Err(
            e @ (UpdateError::Integrity { .. }
            | UpdateError::Http { .. }
            | UpdateError::Request(_)
            | UpdateError::TooManyRedirects(_)
            | UpdateError::Orchestration(_)),
        ) => {
            warn!(error = %e, "apply attempt failed");
            ApplyOutcome::failed(&e)
        }
        Err(e) => {
            // Last resort: a broken differential path must not strand the user
            warn!(error = %e, "differential apply failed unexpectedly, falling back to full update");
            full::apply_full_update(config, fetcher, orchestrator, &release, progress).await
        }
    }
}

async fn differential(
    config: &UpdateConfig,
    fetcher: &Fetcher,
    orchestrator: &dyn RestartOrchestrator,
    release: &ReleaseDescriptor,
    manifest: &PatchManifest,
    local: &LocalVersionState,
    progress: Progress<'_>,
) -> Result<ApplyOutcome> {
    let plan = diff_channels(local, manifest);
    if plan.is_empty() {
        debug!("all channels current, nothing to apply");
        progress(100, None);
        return Ok(ApplyOutcome::done());
    }

    info!(version = %manifest.version, channels = ?plan, "applying differential update");

    // Deleted on drop, i.e. on every failure path out of this function
    let staging = tempfile::Builder::new()
        .prefix("pulsepatch-")
        .tempdir_in(&config.staging_root)?;

    let total: u64 = plan
        .iter()
        .filter_map(|c| manifest.entry(c))
        .map(|e| e.size)
        .sum::<u64>()
        .max(1);

    // Sequential downloads keep progress and staging bookkeeping simple
    let mut done = 0u64;
    for channel in &plan {
        let entry = channel_entry(manifest, channel)?;
        let asset = release.asset(&entry.asset).ok_or_else(|| {
            UpdateError::Manifest(format!("release has no asset '{}'", entry.asset))
        })?;

        let dest = staging.path().join(&entry.asset);
        let base = done;
        fetcher
            .fetch_to_file(&asset.url, &dest, |got, _| {
                // Capped below 100 until verification completes
                let pct = (((base + got) * 100) / total).min(99) as u8;
                progress(pct, Some(channel.as_str()));
            })
            .await?;
        done += entry.size;
    }

    // Verify everything before anything is applied; partial application
    // is never committed
    for channel in &plan {
        let entry = channel_entry(manifest, channel)?;
        let archive_path = staging.path().join(&entry.asset);
        let actual = run_blocking(move || digest_file(&archive_path)).await?;
        if !actual.eq_ignore_ascii_case(&entry.sha256) {
            return Err(UpdateError::Integrity {
                channel: channel.clone(),
                expected: entry.sha256.clone(),
                actual,
            });
        }
        debug!(%channel, "digest verified");
    }

    if requires_restart(&plan) {
        restart_apply(config, orchestrator, manifest, local, &plan, staging, progress)
    } else {
        hot_apply(config, manifest, local, &plan, &staging, progress).await
    }
}

/// Digesting and extracting are synchronous file work; keep them off the
/// async workers.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| UpdateError::Io(std::io::Error::other(e)))?
}

fn channel_entry<'m>(manifest: &'m PatchManifest, channel: &str) -> Result<&'m ChannelEntry> {
    manifest
        .entry(channel)
        .ok_or_else(|| UpdateError::Manifest(format!("manifest has no channel '{}'", channel)))
}

/// The committed state after applying `plan`: every enumerated channel is
/// pinned at its previous effective version first, so bumping the overall
/// version cannot silently re-version channels the plan never touched.
fn committed_state(
    local: &LocalVersionState,
    manifest: &PatchManifest,
    plan: &[String],
) -> LocalVersionState {
    let mut next = local.clone();
    for name in CHANNEL_ORDER {
        next.set_channel(name, local.channel_version(name));
    }
    for channel in plan {
        next.set_channel(channel, &manifest.version);
    }
    next.version = manifest.version.clone();
    next
}

/// No running binaries involved: extract over the target directories while
/// the app keeps running, committing state per channel as we go.
async fn hot_apply(
    config: &UpdateConfig,
    manifest: &PatchManifest,
    local: &LocalVersionState,
    plan: &[String],
    staging: &TempDir,
    progress: Progress<'_>,
) -> Result<ApplyOutcome> {
    let state_path = config.state_path();
    let mut state = local.clone();

    for channel in plan {
        let entry = channel_entry(manifest, channel)?;
        let archive_path = staging.path().join(&entry.asset);
        let target = config.target_dir(&entry.target_dir);
        run_blocking(move || archive::extract_archive(&archive_path, &target)).await?;
        state.set_channel(channel, &manifest.version);
        state.save(&state_path)?;
        info!(%channel, version = %manifest.version, "channel hot-reloaded");
    }

    committed_state(local, manifest, plan).save(&state_path)?;
    progress(100, None);
    Ok(ApplyOutcome::done())
}

/// Running binaries change: stage the updated state file and hand the whole
/// apply to the detached helper. State is committed once, atomically, as
/// the helper's last step before relaunch.
fn restart_apply(
    config: &UpdateConfig,
    orchestrator: &dyn RestartOrchestrator,
    manifest: &PatchManifest,
    local: &LocalVersionState,
    plan: &[String],
    staging: TempDir,
    progress: Progress<'_>,
) -> Result<ApplyOutcome> {
    let staged_state = staging.path().join("patch-version.next.json");
    committed_state(local, manifest, plan).save(&staged_state)?;

    let mut archives = Vec::with_capacity(plan.len());
    for channel in plan {
        let entry = channel_entry(manifest, channel)?;
        archives.push((
            staging.path().join(&entry.asset),
            config.target_dir(&entry.target_dir),
        ));
    }

    let restart_plan = RestartPlan {
        archives,
        installer: None,
        staged_state: Some(staged_state),
        state_path: config.state_path(),
        staging_dir: staging.path().to_path_buf(),
        process_names: config.process_names.clone(),
        relaunch_exe: config.executable.clone(),
    };
    orchestrator.schedule_restart_apply(&restart_plan)?;

    // The helper owns staging cleanup from here on
    let _ = staging.keep();

    info!(version = %manifest.version, "restart-required apply scheduled");
    progress(100, None);
    Ok(ApplyOutcome::restart_scheduled())
}
