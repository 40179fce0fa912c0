//! Uploads each subdirectory of a local tree as an album and favourites the
//! albums into one of your folders.

use std::path::PathBuf;

use anyhow::{Context, Result};
use backdrop_sync::config::Configuration;
use backdrop_sync::logging::init_tracing;
use backdrop_sync::remote::Visibility;
use backdrop_sync::rotation::select_folder;
use backdrop_sync::upload::upload_tree;
use clap::{ArgAction, Parser, ValueEnum};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Privacy {
    Public,
    Hidden,
    Secret,
}

impl From<Privacy> for Visibility {
    fn from(privacy: Privacy) -> Self {
        match privacy {
            Privacy::Public => Visibility::Public,
            Privacy::Hidden => Visibility::Hidden,
            Privacy::Secret => Visibility::Secret,
        }
    }
}

/// Upload a directory tree into an Imgur favourites folder
#[derive(Debug, Parser)]
#[command(name = "upload-tree", version, about)]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Folder the new albums are added to
    #[arg(long, value_name = "NAME", default_value = "Screenshots")]
    folder_name: String,

    /// Directory whose subdirectories become albums
    #[arg(long, value_name = "DIR", default_value = ".")]
    source: PathBuf,

    /// Visibility of the created albums
    #[arg(long, value_enum, default_value_t = Privacy::Hidden)]
    privacy: Privacy,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config_path = cli.config.clone().unwrap_or_else(Configuration::default_path);
    let cfg = Configuration::from_yaml_file(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?
        .validated()
        .context("validating configuration")?;
    let client = cfg
        .connect()
        .with_context(|| format!("connecting with settings from {}", config_path.display()))?;

    // Albums can only be favourited into the authorised account's folders.
    let owner = client.username().to_string();
    let folder =
        select_folder(&client, &owner, &cli.folder_name).context("failed to select folder")?;

    let uploaded = upload_tree(&client, &cli.source, &folder, cli.privacy.into())
        .with_context(|| format!("uploading {}", cli.source.display()))?;
    let images: usize = uploaded.iter().map(|a| a.images).sum();
    info!(albums = uploaded.len(), images, folder = %folder.name, "finished uploading");
    Ok(())
}
