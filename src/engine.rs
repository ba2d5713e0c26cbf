//! Public engine facade
//!
//! [`UpdateEngine`] wires the resolver, apply engine, and scheduler behind
//! the four-call surface the UI collaborator uses: `check`, `apply`,
//! `dismiss`, and periodic-check start/stop. Both `check_for_update` and
//! `apply_patch` return structured results and never return `Err`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::apply::restart::{RestartOrchestrator, ScriptOrchestrator};
use crate::apply::{self, ApplyOutcome};
use crate::config::UpdateConfig;
use crate::errors::{Result, UpdateError};
use crate::net::Fetcher;
use crate::release::{Resolver, UpdateCheck};
use crate::scheduler::{ApplyKind, SchedulerHandle, UpdateSink};
use crate::state::LocalVersionState;

pub struct UpdateEngine {
    config: UpdateConfig,
    fetcher: Fetcher,
    orchestrator: Arc<dyn RestartOrchestrator>,
    /// Re-entrancy guard: only one apply may be in flight
    applying: AtomicBool,
    scheduler: Mutex<Option<SchedulerHandle>>,
    sink: Mutex<Option<Arc<dyn UpdateSink>>>,
    /// Version the user dismissed this session, shared with the scheduler
    dismissed: Arc<Mutex<Option<String>>>,
}

impl UpdateEngine {
    pub fn new(config: UpdateConfig) -> Result<Self> {
        let fetcher = Fetcher::new(config.probe_timeout)?;
        Ok(Self {
            config,
            fetcher,
            orchestrator: Arc::new(ScriptOrchestrator::new()),
            applying: AtomicBool::new(false),
            scheduler: Mutex::new(None),
            sink: Mutex::new(None),
            dismissed: Arc::new(Mutex::new(None)),
        })
    }

    /// Substitute the restart orchestration, mainly for tests.
    pub fn with_orchestrator(mut self, orchestrator: Arc<dyn RestartOrchestrator>) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    /// Currently recorded local version state.
    pub fn local_state(&self) -> LocalVersionState {
        LocalVersionState::load_or(&self.config.state_path(), &self.config.app_version)
    }

    /// Advisory check: failures are swallowed into `available: false`.
    pub async fn check_for_update(&self) -> UpdateCheck {
        let local = self.local_state();
        Resolver::new(&self.fetcher, &self.config)
            .check_for_update(&local)
            .await
    }

    /// Run one apply attempt, reporting progress through `on_progress`
    /// (and the UI sink, when periodic checks are running).
    pub async fn apply_patch<F>(&self, on_progress: F) -> ApplyOutcome
    where
        F: Fn(u8, Option<&str>) + Send + Sync,
    {
        if self.applying.swap(true, Ordering::SeqCst) {
            return ApplyOutcome::failed(UpdateError::Busy);
        }
        let _reset = ResetOnDrop(&self.applying);

        let sink = self.current_sink();
        let forward = |percent: u8, channel: Option<&str>| {
            on_progress(percent, channel);
            if let Some(sink) = &sink {
                sink.apply_progress(percent, channel);
            }
        };

        let outcome = apply::apply_patch(
            &self.config,
            &self.fetcher,
            self.orchestrator.as_ref(),
            &forward,
        )
        .await;

        if outcome.success {
            if let Some(sink) = &sink {
                sink.apply_complete(if outcome.restart_pending {
                    ApplyKind::RestartPending
                } else {
                    ApplyKind::HotReload
                });
            }
        }
        outcome
    }

    /// Suppress "update available" notifications for this exact version
    /// until the process restarts. Recorded whether or not periodic checks
    /// are currently running.
    pub fn dismiss_update(&self, version: &str) {
        let mut guard = self.dismissed.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(version.to_string());
    }

    /// Start timer-driven checks, replacing any scheduler already running.
    pub fn start_periodic_check(&self, sink: Arc<dyn UpdateSink>) {
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&sink));
        let handle = SchedulerHandle::start(
            self.config.clone(),
            self.fetcher.clone(),
            sink,
            Arc::clone(&self.dismissed),
        );
        let mut guard = self.scheduler.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = guard.replace(handle) {
            old.stop();
        }
    }

    /// Cancel periodic checks and drop the UI reference. Idempotent; safe
    /// to call before `start_periodic_check`.
    pub fn stop_periodic_check(&self) {
        if let Some(handle) = self
            .scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.stop();
        }
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn current_sink(&self) -> Option<Arc<dyn UpdateSink>> {
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
