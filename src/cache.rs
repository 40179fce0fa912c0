use std::path::{Path, PathBuf};

use tracing::debug;

use crate::catalog::{Catalog, FolderKey};
use crate::error::Result;
use crate::persist;

const CACHE_MODE: u32 = 0o644;

/// Local copy of each folder listing, one JSON file per [`FolderKey`].
#[derive(Debug, Clone)]
pub struct CatalogCache {
    dir: PathBuf,
}

impl CatalogCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &FolderKey) -> PathBuf {
        self.dir.join(format!("cache.{key}.json"))
    }

    /// `Ok(None)` when nothing was cached yet. An unparseable file yields
    /// [`crate::Error::CacheCorruption`] so the caller can decide to rebuild.
    pub fn load(&self, key: &FolderKey) -> Result<Option<Catalog>> {
        let path = self.path(key);
        let catalog: Option<Catalog> = persist::read_json_optional(&path)?;
        if let Some(catalog) = &catalog {
            debug!(path = %path.display(), images = catalog.len(), "loaded catalog cache");
        }
        Ok(catalog)
    }

    pub fn save(&self, key: &FolderKey, catalog: &Catalog) -> Result<()> {
        let path = self.path(key);
        persist::write_json(&path, catalog, CACHE_MODE)?;
        debug!(path = %path.display(), images = catalog.len(), "saved catalog cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::CatalogCache;
    use crate::catalog::{Catalog, CatalogEntry, FolderKey};
    use crate::error::Error;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn sample() -> Catalog {
        Catalog::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            vec![CatalogEntry {
                id: "a".into(),
                link: "https://i.imgur.com/a.jpg".into(),
                media_type: "image/jpeg".into(),
                animated: false,
                width: 1920,
                height: 1080,
            }],
        )
    }

    #[test]
    fn folders_do_not_collide() {
        let tmp = tempdir().unwrap();
        let cache = CatalogCache::new(tmp.path());
        let one = FolderKey::new("alice", "1");
        let two = FolderKey::new("alice", "2");
        cache.save(&one, &sample()).unwrap();

        assert_eq!(cache.load(&one).unwrap(), Some(sample()));
        assert_eq!(cache.load(&two).unwrap(), None);
        assert!(cache.path(&one).ends_with("cache.alice.1.json"));
    }

    #[test]
    fn corrupt_cache_is_distinguished_from_missing() {
        let tmp = tempdir().unwrap();
        let cache = CatalogCache::new(tmp.path());
        let key = FolderKey::new("alice", "1");
        std::fs::write(cache.path(&key), "[]").unwrap();
        assert!(matches!(
            cache.load(&key),
            Err(Error::CacheCorruption { .. })
        ));
    }
}
