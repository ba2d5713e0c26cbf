//! Periodic update checks
//!
//! A [`SchedulerHandle`] owns its own timer task; nothing here is global.
//! The dismissed-version slot is shared with the engine that started the
//! handle, so a dismissal outlives scheduler restarts. Each tick runs an
//! update check and, unless the user already dismissed that exact version,
//! pushes the payload into the UI collaborator. The scheduler only ever
//! notifies, never applies.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::UpdateConfig;
use crate::net::Fetcher;
use crate::release::{Resolver, UpdateCheck};
use crate::state::LocalVersionState;

/// How the engine reports back to its UI collaborator
pub trait UpdateSink: Send + Sync {
    /// A new release is available and not dismissed
    fn update_available(&self, check: &UpdateCheck);
    /// Apply progress, mirrored from the apply progress callback
    fn apply_progress(&self, percent: u8, channel: Option<&str>);
    /// An apply finished successfully
    fn apply_complete(&self, kind: ApplyKind);
}

/// What a completed apply asks of the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyKind {
    /// Files were swapped in place; reload the view, no restart
    HotReload,
    /// A detached helper will restart the app; issue "restart now"
    RestartPending,
}

/// Owns the periodic-check task
pub struct SchedulerHandle {
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Spawn the check loop: one initial delay, then a fixed interval.
    ///
    /// `dismissed` is the caller's slot; versions dismissed before this
    /// handle existed are honored on the first tick.
    pub fn start(
        config: UpdateConfig,
        fetcher: Fetcher,
        sink: Arc<dyn UpdateSink>,
        dismissed: Arc<Mutex<Option<String>>>,
    ) -> Self {
        let task = tokio::spawn(async move {
            tokio::time::sleep(config.initial_delay).await;
            loop {
                run_check(&config, &fetcher, &dismissed, sink.as_ref()).await;
                tokio::time::sleep(config.check_interval).await;
            }
        });

        Self { task }
    }

    /// Cancel the check loop. Safe to call more than once.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_check(
    config: &UpdateConfig,
    fetcher: &Fetcher,
    dismissed: &Mutex<Option<String>>,
    sink: &dyn UpdateSink,
) {
    let local = LocalVersionState::load_or(&config.state_path(), &config.app_version);
    let check = Resolver::new(fetcher, config).check_for_update(&local).await;

    if !check.available {
        return;
    }

    let is_dismissed = {
        let guard = dismissed.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_deref() == check.version.as_deref()
    };
    if is_dismissed {
        debug!(version = ?check.version, "update available but dismissed");
        return;
    }

    sink.update_available(&check);
}
