//! pulsepatch — differential update engine for self-updating desktop apps
//!
//! Detects new releases on a release feed, decides between a per-channel
//! patch and a full reinstall, downloads and SHA-256-verifies the
//! payloads, and applies them either by hot-swapping files while the app
//! keeps running or through a detached kill/extract/relaunch helper when
//! running binaries must be replaced.
//!
//! # Module Organization
//!
//! - [`version`] - dotted version comparison
//! - [`net`] - redirect-following fetch primitives
//! - [`integrity`] - streaming SHA-256 digests
//! - [`manifest`] - patch manifest schema and channel classification
//! - [`state`] - persisted per-channel version state
//! - [`release`] - release resolution and update checks
//! - [`plan`] - channel diff planning
//! - [`apply`] - download, verify, hot-reload / restart orchestration
//! - [`scheduler`] - periodic checks and the UI sink
//! - [`engine`] - the public [`UpdateEngine`] facade

pub mod apply;
pub mod config;
pub mod engine;
pub mod errors;
pub mod integrity;
pub mod manifest;
pub mod net;
pub mod plan;
pub mod release;
pub mod scheduler;
pub mod state;
pub mod version;

pub use apply::restart::{RestartOrchestrator, RestartPlan, ScriptOrchestrator};
pub use apply::ApplyOutcome;
pub use config::UpdateConfig;
pub use engine::UpdateEngine;
pub use errors::{Result, UpdateError};
pub use manifest::{ChannelEntry, PatchManifest};
pub use release::{ReleaseAsset, ReleaseDescriptor, UpdateCheck};
pub use scheduler::{ApplyKind, SchedulerHandle, UpdateSink};
pub use state::LocalVersionState;
pub use version::is_newer;
