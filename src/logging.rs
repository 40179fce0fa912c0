//! Tracing setup shared by the binaries.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

/// `RUST_LOG` wins when set; otherwise `info`, with our own crates raised to
/// debug or trace by `verbosity`.
pub fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(format!("backdrop_sync={level}").parse()?)
        .add_directive(format!("imgur_api={level}").parse()?);
    fmt().with_env_filter(filter).with_target(false).compact().init();
    Ok(())
}
