//! pulsepatch CLI
//!
//! Thin driver over the update engine: check for updates, apply one, or
//! watch the feed on the configured interval. The real consumer is the
//! desktop app's UI process; this binary exists for operations and
//! debugging.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use humansize::{format_size, DECIMAL};
use tracing_subscriber::EnvFilter;

use pulsepatch::scheduler::{ApplyKind, UpdateSink};
use pulsepatch::release::UpdateCheck;
use pulsepatch::{UpdateConfig, UpdateEngine};

#[derive(Parser)]
#[command(name = "pulsepatch", version, about = "Differential update engine")]
struct Cli {
    /// Installation directory containing update.toml
    #[arg(long, default_value = ".")]
    install_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Query the release feed once and print the result as JSON
    Check,
    /// Download and apply the available update
    Apply,
    /// Keep checking on the configured interval, printing notifications
    Watch,
}

struct ConsoleSink;

impl UpdateSink for ConsoleSink {
    fn update_available(&self, check: &UpdateCheck) {
        let version = check.version.as_deref().unwrap_or("?");
        if check.full_only {
            println!("update available: {} (full reinstall)", version);
        } else {
            println!(
                "update available: {} (channels: {})",
                version,
                check.channels.join(", ")
            );
        }
    }

    fn apply_progress(&self, percent: u8, channel: Option<&str>) {
        match channel {
            Some(channel) => eprintln!("  {:>3}% {}", percent, channel),
            None => eprintln!("  {:>3}%", percent),
        }
    }

    fn apply_complete(&self, kind: ApplyKind) {
        match kind {
            ApplyKind::HotReload => println!("update applied in place"),
            ApplyKind::RestartPending => println!("update staged, restarting"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = UpdateConfig::load(&cli.install_dir)
        .with_context(|| format!("loading config from {}", cli.install_dir.display()))?;
    let engine = UpdateEngine::new(config)?;

    match cli.command {
        Command::Check => {
            let check = engine.check_for_update().await;
            println!("{}", serde_json::to_string_pretty(&check)?);
            if let Some(size) = check.patch_size.filter(|_| check.available) {
                eprintln!("download size: {}", format_size(size, DECIMAL));
            }
        }
        Command::Apply => {
            let outcome = engine
                .apply_patch(|percent, channel| match channel {
                    Some(channel) => eprintln!("  {:>3}% {}", percent, channel),
                    None => eprintln!("  {:>3}%", percent),
                })
                .await;
            if !outcome.success {
                anyhow::bail!(
                    "apply failed: {}",
                    outcome.error.unwrap_or_else(|| "unknown error".into())
                );
            }
            if outcome.restart_pending {
                println!("restart scheduled, exiting so the helper can take over");
            } else {
                println!("update applied");
            }
        }
        Command::Watch => {
            engine.start_periodic_check(Arc::new(ConsoleSink));
            tokio::signal::ctrl_c().await?;
            engine.stop_periodic_check();
        }
    }

    Ok(())
}
