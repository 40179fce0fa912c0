use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::CatalogEntry;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Library error type for rotation runs.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote host failed while listing, downloading or uploading.
    #[error("remote request failed: {0:#}")]
    Remote(anyhow::Error),

    /// A local cache or state file exists but cannot be used.
    #[error("unusable file {}: {reason}", path.display())]
    CacheCorruption { path: PathBuf, reason: String },

    /// Every candidate was rejected by the filters. The current entry is kept
    /// and handed back so the caller can still display something.
    #[error("no image in the folder matches the configured filters")]
    NoMatch { fallback: Box<CatalogEntry> },

    /// The folder lists no images at all.
    #[error("the folder contains no images")]
    EmptyCatalog,

    /// A remote state record exists but could not be decoded.
    #[error("remote state record is unreadable: {0}")]
    SyncDecode(String),

    #[error("failed to render state record: {0}")]
    SyncEncode(String),

    #[error("failed to write {}: {source}", path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An upload source is missing or is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("could not find a folder called {name:?}; options: {}", options.join(", "))]
    FolderNotFound { name: String, options: Vec<String> },

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
