//! Rotation state mirrored on the photo host as a QR code image.
//!
//! The host has no key-value storage, so a hidden album acts as the bucket
//! and each record is a single image titled `<account>.<folder>` whose pixels
//! encode the JSON state.

use std::cell::OnceCell;
use std::io::Cursor;

use chrono::{DateTime, Utc};
use image::{ImageFormat, Luma};
use qrcode::QrCode;
use tracing::{debug, info};

use crate::catalog::FolderKey;
use crate::error::{Error, Result};
use crate::remote::{RemoteAlbum, RemoteImage, RemoteStore, Visibility};
use crate::state::{self, RotationState};

pub const STATE_ALBUM_TITLE: &str = "Backdrop Sync Data";
const STATE_ALBUM_DESCRIPTION: &str =
    "Created automatically by backdrop-sync. Holds state for syncing backgrounds across computers";
/// Edge length of the rendered code in pixels.
const RECORD_SIZE: u32 = 512;

/// Renders `state` as a PNG holding a QR code of its JSON payload.
pub fn encode_record(state: &RotationState) -> Result<Vec<u8>> {
    let payload = state::encode_payload(state)?;
    let code = QrCode::new(payload.as_bytes()).map_err(|err| Error::SyncEncode(err.to_string()))?;
    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(RECORD_SIZE, RECORD_SIZE)
        .build();
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|err| Error::SyncEncode(err.to_string()))?;
    Ok(png)
}

/// Inverse of [`encode_record`]. Accepts any image format the host may have
/// re-encoded the record into.
pub fn decode_record(bytes: &[u8]) -> Result<RotationState> {
    let luma = image::load_from_memory(bytes)
        .map_err(|err| Error::SyncDecode(format!("not an image: {err}")))?
        .to_luma8();
    let (width, height) = luma.dimensions();
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        width as usize,
        height as usize,
        |x, y| luma.get_pixel(x as u32, y as u32)[0],
    );
    let grids = prepared.detect_grids();
    let grid = grids
        .first()
        .ok_or_else(|| Error::SyncDecode("no QR code found".to_string()))?;
    let (_, payload) = grid
        .decode()
        .map_err(|err| Error::SyncDecode(format!("unreadable QR code: {err}")))?;
    state::decode_payload(&payload)
}

/// Single-slot remote store for one folder's rotation state.
pub struct StateMirror<'a, R: RemoteStore + ?Sized> {
    remote: &'a R,
    key: FolderKey,
    album: OnceCell<RemoteAlbum>,
}

impl<'a, R: RemoteStore + ?Sized> StateMirror<'a, R> {
    pub fn new(remote: &'a R, key: FolderKey) -> Self {
        Self {
            remote,
            key,
            album: OnceCell::new(),
        }
    }

    pub fn label(&self) -> String {
        self.key.to_string()
    }

    /// Fetches and decodes the record. `Ok(None)` when nothing was uploaded
    /// yet; an undecodable record is an error.
    pub fn download(&self) -> Result<Option<RotationState>> {
        let Some(album) = self.find_album()? else {
            debug!("no state album yet");
            return Ok(None);
        };
        let Some(record) = self.find_record(&album)? else {
            debug!(label = %self.label(), "no remote state record");
            return Ok(None);
        };
        let bytes = self
            .remote
            .download_image_bytes(&record.link)
            .map_err(Error::Remote)?;
        let state = decode_record(&bytes)?;
        debug!(id = %record.id, stamp = %state.state_timestamp, "downloaded remote state");
        Ok(Some(state))
    }

    /// Replaces the remote record with `state`, creating the album on first use.
    pub fn upload(&self, state: &RotationState, now: DateTime<Utc>) -> Result<RemoteImage> {
        let album = self.ensure_album()?;
        if let Some(old) = self.find_record(&album)? {
            debug!(id = %old.id, "deleting previous state record");
            self.remote.delete_image(&old.id).map_err(Error::Remote)?;
        }
        let png = encode_record(state)?;
        let caption = format!("Last updated on {}", now.to_rfc2822());
        let image = self
            .remote
            .upload_image(png, &self.label(), &caption, &album.id)
            .map_err(Error::Remote)?;
        info!(id = %image.id, label = %self.label(), "uploaded state record");
        Ok(image)
    }

    fn find_album(&self) -> Result<Option<RemoteAlbum>> {
        if let Some(album) = self.album.get() {
            return Ok(Some(album.clone()));
        }
        let albums = self.remote.list_albums().map_err(Error::Remote)?;
        let found = albums.into_iter().find(|a| a.title == STATE_ALBUM_TITLE);
        if let Some(album) = &found {
            let _ = self.album.set(album.clone());
        }
        Ok(found)
    }

    fn ensure_album(&self) -> Result<RemoteAlbum> {
        if let Some(album) = self.find_album()? {
            return Ok(album);
        }
        let album = self
            .remote
            .create_album(STATE_ALBUM_TITLE, STATE_ALBUM_DESCRIPTION, Visibility::Hidden)
            .map_err(Error::Remote)?;
        info!(id = %album.id, "created state album");
        let _ = self.album.set(album.clone());
        Ok(album)
    }

    fn find_record(&self, album: &RemoteAlbum) -> Result<Option<RemoteImage>> {
        let label = self.label();
        let images = self
            .remote
            .list_album_images(&album.id)
            .map_err(Error::Remote)?;
        Ok(images.into_iter().find(|image| image.title == label))
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_record, encode_record};
    use crate::error::Error;
    use crate::state::RotationState;
    use chrono::{TimeZone, Utc};

    #[test]
    fn record_round_trip_is_exact() {
        let state = RotationState {
            current_index: 1234,
            cache_timestamp: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            date_changed: Utc.with_ymd_and_hms(2026, 2, 3, 4, 5, 6).unwrap(),
            state_timestamp: Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap(),
            seed: u64::MAX,
        };
        let png = encode_record(&state).unwrap();
        assert_eq!(decode_record(&png).unwrap(), state);
    }

    #[test]
    fn zero_state_round_trips() {
        let state = RotationState::default();
        assert_eq!(decode_record(&encode_record(&state).unwrap()).unwrap(), state);
    }

    #[test]
    fn rendered_record_is_at_least_512_square() {
        let png = encode_record(&RotationState::default()).unwrap();
        let image = image::load_from_memory(&png).unwrap();
        assert!(image.width() >= 512);
        assert_eq!(image.width(), image.height());
    }

    #[test]
    fn blank_image_is_a_decode_error() {
        let blank = image::GrayImage::from_pixel(64, 64, image::Luma([255u8]));
        let mut png = Vec::new();
        blank
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        assert!(matches!(decode_record(&png), Err(Error::SyncDecode(_))));
    }

    #[test]
    fn non_image_bytes_are_a_decode_error() {
        assert!(matches!(
            decode_record(b"definitely not a png"),
            Err(Error::SyncDecode(_))
        ));
    }
}
