//! Binary entrypoint for backdrop-sync.
//!
//! Authorises against Imgur, resolves the folder and runs one rotation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use backdrop_sync::config::Configuration;
use backdrop_sync::desktop::SystemDesktop;
use backdrop_sync::logging::init_tracing;
use backdrop_sync::rotation::{Outcome, Rotator, select_folder};
use chrono::Utc;
use clap::{ArgAction, Parser};
use tracing::{info, warn};

/// Rotate the desktop background through an Imgur favourites folder
#[derive(Debug, Parser)]
#[command(name = "backdrop-sync", version, about)]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Name of the folder to pull backgrounds from
    #[arg(long, value_name = "NAME")]
    folder_name: Option<String>,

    /// Username owning the folder. Defaults to you
    #[arg(long, value_name = "USER")]
    folder_owner: Option<String>,

    /// Minutes between background changes
    #[arg(long, value_name = "MINUTES")]
    interval_minutes: Option<u64>,

    /// Change the background now even if the interval has not passed
    #[arg(long)]
    force_change: bool,

    /// Fetch the folder listing even if the cache is fresh
    #[arg(long)]
    refresh_cache: bool,

    /// Minimum width/height ratio in percent (0 = off)
    #[arg(long, value_name = "PERCENT")]
    min_ratio: Option<u32>,

    /// Maximum width/height ratio in percent (0 = off)
    #[arg(long, value_name = "PERCENT")]
    max_ratio: Option<u32>,

    /// Shuffle seed; use the same value on every machine (0 = folder order)
    #[arg(long)]
    seed: Option<u64>,

    /// Sync rotation state across machines through Imgur
    #[arg(long, overrides_with = "no_sync")]
    sync: bool,

    /// Disable state sync even if the config enables it
    #[arg(long, overrides_with = "sync")]
    no_sync: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply(&self, cfg: &mut Configuration) {
        if let Some(name) = &self.folder_name {
            cfg.folder_name = name.clone();
        }
        if let Some(owner) = &self.folder_owner {
            cfg.folder_owner = Some(owner.clone());
        }
        if let Some(minutes) = self.interval_minutes {
            cfg.change_interval = std::time::Duration::from_secs(minutes.saturating_mul(60));
        }
        if let Some(ratio) = self.min_ratio {
            cfg.min_ratio = ratio;
        }
        if let Some(ratio) = self.max_ratio {
            cfg.max_ratio = ratio;
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if self.sync {
            cfg.sync = true;
        } else if self.no_sync {
            cfg.sync = false;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config_path = cli.config.clone().unwrap_or_else(Configuration::default_path);
    let mut cfg = Configuration::from_yaml_file(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    cli.apply(&mut cfg);
    let cfg = cfg.validated().context("validating configuration")?;
    let client = cfg
        .connect()
        .with_context(|| format!("connecting with settings from {}", config_path.display()))?;
    let owner = cfg
        .folder_owner
        .clone()
        .unwrap_or_else(|| client.username().to_string());
    let folder =
        select_folder(&client, &owner, &cfg.folder_name).context("failed to select folder")?;
    info!(
        folder = %folder.name,
        owner = %owner,
        interval = %humantime::format_duration(cfg.change_interval),
        sync = cfg.sync,
        "loading available images"
    );

    let desktop = SystemDesktop;
    let rotator = Rotator::new(
        &client,
        &desktop,
        owner,
        folder,
        &cfg.locations(),
        cfg.run_options(cli.force_change, cli.refresh_cache),
    );
    let report = rotator.run(Utc::now())?;
    match report.outcome {
        Outcome::NoMatch => warn!(id = %report.entry.id, "filters matched nothing; kept current image"),
        Outcome::Changed => info!(id = %report.entry.id, "background changed"),
        Outcome::Unchanged => info!(id = %report.entry.id, "background not due for a change"),
    }
    Ok(())
}
