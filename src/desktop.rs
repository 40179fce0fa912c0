use std::path::Path;

use anyhow::{Result, anyhow, ensure};
use tracing::debug;

/// Applies an image file as the desktop background.
pub trait Desktop {
    fn set_background(&self, path: &Path) -> Result<()>;
}

/// Uses the platform's own mechanism (gsettings, the macOS dock, the Windows
/// registry, ...) through the `wallpaper` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDesktop;

impl Desktop for SystemDesktop {
    fn set_background(&self, path: &Path) -> Result<()> {
        ensure!(path.exists(), "image file {} does not exist", path.display());
        let path = path.canonicalize()?;
        let path_str = path.display().to_string();
        debug!(path = %path_str, "setting desktop background");
        wallpaper::set_from_path(&path_str)
            .map_err(|err| anyhow!("failed to set desktop background: {err}"))
    }
}
