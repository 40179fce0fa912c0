use std::fmt;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Identity shared by a catalog, its rotation state and the remote record:
/// the folder owner plus the folder id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderKey {
    pub account: String,
    pub folder: String,
}

impl FolderKey {
    pub fn new(account: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            folder: folder.into(),
        }
    }
}

impl fmt::Display for FolderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.account, self.folder)
    }
}

/// One image of the remote folder, as captured at fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub link: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub animated: bool,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl CatalogEntry {
    /// Width as a percentage of height; 0 when the height is unknown.
    pub fn aspect_ratio(&self) -> u32 {
        if self.height == 0 {
            return 0;
        }
        let ratio = u64::from(self.width) * 100 / u64::from(self.height);
        u32::try_from(ratio).unwrap_or(u32::MAX)
    }

    pub fn is_still_image(&self) -> bool {
        !self.animated && self.media_type.starts_with("image/")
    }

    /// Final path segment of the link, used as the local file name.
    pub fn file_name(&self) -> &str {
        let trimmed = self.link.split(['?', '#']).next().unwrap_or_default();
        match trimmed.rsplit('/').next() {
            Some(name) if !name.is_empty() => name,
            _ => &self.id,
        }
    }
}

/// Ordered rotation sequence for one folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub fetched_at: DateTime<Utc>,
    #[serde(rename = "images")]
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(fetched_at: DateTime<Utc>, entries: Vec<CatalogEntry>) -> Self {
        Self {
            fetched_at,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }
}

/// Reorders a freshly fetched list. Seed `0` keeps the remote order; any
/// other seed yields the same permutation on every machine.
pub fn shuffle<T>(entries: &mut [T], seed: u64) {
    if seed == 0 {
        return;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    entries.shuffle(&mut rng);
}
