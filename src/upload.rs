//! Bulk upload of a local directory tree into a favourites folder.
//!
//! Each subdirectory of the source becomes one album named after it. Its
//! images are uploaded into that album, which is then added to the folder.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::remote::{RemoteAlbum, RemoteFolder, RemoteStore, Visibility};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff"];

/// Return `true` if `path` has an extension the photo host accepts.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
}

/// One subdirectory and the images directly inside it, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumSource {
    pub title: String,
    pub dir: PathBuf,
    pub images: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAlbum {
    pub album: RemoteAlbum,
    pub images: usize,
}

/// Lists the album sources under `source`. Hidden directories are skipped,
/// and so are directories without images.
pub fn plan(source: &Path) -> Result<Vec<AlbumSource>> {
    if !source.is_dir() {
        return Err(Error::NotADirectory(source.to_path_buf()));
    }
    let mut albums = Vec::new();
    for dir in children(source)? {
        if !dir.file_type().is_dir() || is_hidden(&dir) {
            continue;
        }
        let images: Vec<PathBuf> = children(dir.path())?
            .into_iter()
            .filter(|e| e.file_type().is_file() && is_supported_image(e.path()))
            .map(DirEntry::into_path)
            .collect();
        let title = dir.file_name().to_string_lossy().into_owned();
        if images.is_empty() {
            warn!(dir = %dir.path().display(), "no images; skipping");
            continue;
        }
        albums.push(AlbumSource {
            title,
            dir: dir.into_path(),
            images,
        });
    }
    Ok(albums)
}

/// Uploads every album source under `source` and adds each album to `folder`.
/// Stops at the first failure.
pub fn upload_tree<R: RemoteStore + ?Sized>(
    remote: &R,
    source: &Path,
    folder: &RemoteFolder,
    visibility: Visibility,
) -> Result<Vec<UploadedAlbum>> {
    let plan = plan(source)?;
    info!(albums = plan.len(), source = %source.display(), "uploading directory tree");
    plan.iter()
        .map(|album| upload_album(remote, album, folder, visibility))
        .collect()
}

fn upload_album<R: RemoteStore + ?Sized>(
    remote: &R,
    source: &AlbumSource,
    folder: &RemoteFolder,
    visibility: Visibility,
) -> Result<UploadedAlbum> {
    info!(album = %source.title, images = source.images.len(), "uploading directory");
    let album = remote
        .create_album(&source.title, "", visibility)
        .map_err(Error::Remote)?;
    for path in &source.images {
        let bytes = fs::read(path).map_err(|source| Error::FileRead {
            path: path.clone(),
            source,
        })?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let image = remote
            .upload_image(bytes, &label, "", &album.id)
            .map_err(Error::Remote)?;
        debug!(id = %image.id, file = %label, "uploaded image");
    }
    remote
        .add_album_to_folder(&folder.id, &album.id)
        .map_err(Error::Remote)?;
    Ok(UploadedAlbum {
        album,
        images: source.images.len(),
    })
}

fn children(dir: &Path) -> Result<Vec<DirEntry>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.map_err(|err| Error::Io(io::Error::from(err))))
        .collect()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|n| n.starts_with('.'))
}
