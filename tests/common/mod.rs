//! Common test utilities for pulsepatch integration tests
//!
//! Provides a mock release host (release descriptor + manifest + archive
//! assets), tar.gz fixture builders, and a recording restart orchestrator.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use wiremock::matchers::{method, path as url_path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pulsepatch::apply::restart::{RestartOrchestrator, RestartPlan};
use pulsepatch::errors::Result;
use pulsepatch::UpdateConfig;

/// Build a tar.gz archive holding the given (name, content) files.
pub fn build_archive(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, *name, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Mount a release descriptor at `/latest` plus its assets under `/assets/`.
pub async fn mount_release(server: &MockServer, tag: &str, assets: &[(&str, Vec<u8>)]) {
    let asset_list: Vec<serde_json::Value> = assets
        .iter()
        .map(|(name, body)| {
            serde_json::json!({
                "name": name,
                "url": format!("{}/assets/{}", server.uri(), name),
                "size": body.len(),
            })
        })
        .collect();

    Mock::given(method("GET"))
        .and(url_path("/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tag": tag,
            "notes": "release notes",
            "assets": asset_list,
        })))
        .mount(server)
        .await;

    for (name, body) in assets {
        Mock::given(method("GET"))
            .and(url_path(format!("/assets/{}", name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(server)
            .await;
    }
}

/// Manifest JSON for `channels`: (name, asset, size, sha256, target_dir).
pub fn manifest_json(
    version: &str,
    min_version: Option<&str>,
    requires_full_update: bool,
    channels: &[(&str, &str, u64, &str, &str)],
) -> Vec<u8> {
    let channel_map: serde_json::Map<String, serde_json::Value> = channels
        .iter()
        .map(|(name, asset, size, sha, target)| {
            (
                name.to_string(),
                serde_json::json!({
                    "asset": asset,
                    "size": size,
                    "sha256": sha,
                    "target_dir": target,
                }),
            )
        })
        .collect();

    serde_json::to_vec(&serde_json::json!({
        "version": version,
        "requires_full_update": requires_full_update,
        "min_version": min_version,
        "channels": channel_map,
    }))
    .unwrap()
}

/// Engine config pointed at the mock server, with fast timings and an
/// isolated staging root so tests can assert on staging cleanup.
pub fn test_config(
    server: &MockServer,
    install_dir: &Path,
    app_version: &str,
    staging_root: &Path,
) -> UpdateConfig {
    let mut config = UpdateConfig::new(
        format!("{}/latest", server.uri()),
        install_dir,
        app_version,
    );
    config.staging_root = staging_root.to_path_buf();
    config.probe_timeout = Duration::from_secs(5);
    config.initial_delay = Duration::from_millis(20);
    config.check_interval = Duration::from_millis(50);
    config.process_names = vec!["app".into(), "app-backend".into()];
    config
}

/// Restart orchestrator double that records plans instead of spawning.
#[derive(Default)]
pub struct RecordingOrchestrator {
    pub plans: Mutex<Vec<RestartPlan>>,
}

impl RecordingOrchestrator {
    pub fn take_plans(&self) -> Vec<RestartPlan> {
        std::mem::take(&mut *self.plans.lock().unwrap())
    }
}

impl RestartOrchestrator for RecordingOrchestrator {
    fn schedule_restart_apply(&self, plan: &RestartPlan) -> Result<()> {
        self.plans.lock().unwrap().push(plan.clone());
        Ok(())
    }
}

/// Count of archive/installer downloads the mock server has seen so far.
pub async fn asset_request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| {
            let p = r.url.path();
            p.starts_with("/assets/") && !p.ends_with("patch-manifest.json")
        })
        .count()
}
