//! Small JSON file helpers shared by the catalog cache and the state store.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Serialises `value` as pretty JSON to `path`, creating parent directories.
/// `mode` is applied on unix.
pub fn write_json<T: Serialize>(path: &Path, value: &T, mode: u32) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    write_atomic(path, &json, mode)
}

/// Writes `bytes` next to `path` and renames the result into place, so a
/// reader never sees a partially written file at `path`.
pub fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    let wrap = |source: io::Error| Error::FileWrite {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    let tmp = partial_path(path);
    // A leftover from an interrupted write would keep its old mode.
    if let Err(err) = fs::remove_file(&tmp)
        && err.kind() != io::ErrorKind::NotFound
    {
        return Err(wrap(err));
    }
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    let written = options.open(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(err) = written.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(wrap(err));
    }
    Ok(())
}

/// `image.jpg` is staged as `image.jpg.part`.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Reads JSON from `path`, returning `None` when the file does not exist.
/// Parse failures come back as [`Error::CacheCorruption`].
pub fn read_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|err| Error::CacheCorruption {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{read_json_optional, write_atomic, write_json};
    use crate::error::Error;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn missing_file_reads_as_none() {
        let tmp = tempdir().unwrap();
        let value: Option<BTreeMap<String, u32>> =
            read_json_optional(&tmp.path().join("absent.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn writes_create_parent_directories() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("a").join("b").join("value.json");
        let mut value = BTreeMap::new();
        value.insert("answer".to_string(), 42u32);
        write_json(&path, &value, 0o644).unwrap();
        let back: BTreeMap<String, u32> = read_json_optional(&path).unwrap().unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn garbage_is_reported_as_corruption() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("broken.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = read_json_optional::<BTreeMap<String, u32>>(&path).unwrap_err();
        assert!(matches!(err, Error::CacheCorruption { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn mode_is_applied_on_create() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("secret.json");
        write_json(&path, &1u8, 0o600).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn atomic_write_replaces_and_leaves_no_partial_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("img").join("A.jpg");
        write_atomic(&path, b"first", 0o644).unwrap();
        write_atomic(&path, b"second", 0o644).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("A.jpg")]);
    }

    #[test]
    fn stale_partial_file_is_replaced() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("A.jpg");
        std::fs::write(tmp.path().join("A.jpg.part"), b"trunc").unwrap();
        write_atomic(&path, b"whole image", 0o644).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"whole image");
        assert!(!tmp.path().join("A.jpg.part").exists());
    }

    #[test]
    fn directory_in_the_way_is_a_write_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();
        let err = write_json(&path, &1u8, 0o644).unwrap_err();
        assert!(matches!(err, Error::FileWrite { .. }), "{err:?}");
        assert!(!tmp.path().join("state.json.part").exists());
    }
}
