//! One rotation run: sync, refresh, pick, display, persist.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::cache::CatalogCache;
use crate::catalog::{self, Catalog, CatalogEntry, FolderKey};
use crate::desktop::Desktop;
use crate::error::{Error, Result};
use crate::mirror::StateMirror;
use crate::persist;
use crate::picker::{self, PickOptions};
use crate::reconcile::{Reconciled, reconcile};
use crate::remote::{RemoteFolder, RemoteStore};
use crate::state::{RotationState, StateStore};

const IMAGE_MODE: u32 = 0o644;

/// Finds the folder called `name` (case-insensitively) among `owner`'s folders.
pub fn select_folder<R: RemoteStore + ?Sized>(
    remote: &R,
    owner: &str,
    name: &str,
) -> Result<RemoteFolder> {
    let folders = remote.list_folders(owner).map_err(Error::Remote)?;
    let wanted = name.to_lowercase();
    if let Some(folder) = folders.iter().find(|f| f.name.to_lowercase() == wanted) {
        debug!(id = %folder.id, name = %folder.name, "selected folder");
        return Ok(folder.clone());
    }
    Err(Error::FolderNotFound {
        name: name.to_string(),
        options: folders.into_iter().map(|f| f.name).collect(),
    })
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub pick: PickOptions,
    /// Age after which the cached folder listing is fetched again.
    pub cache_ttl: Duration,
    pub refresh_cache: bool,
    pub seed: Option<u64>,
    pub sync: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            pick: PickOptions::default(),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            refresh_cache: false,
            seed: None,
            sync: false,
        }
    }
}

/// Where each run keeps its files.
#[derive(Debug, Clone)]
pub struct Locations {
    /// Rotation state files.
    pub config_dir: PathBuf,
    /// Catalog caches and downloaded images.
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The current image is not due for a change yet.
    Unchanged,
    Changed,
    /// No image passed the filters; the current one stays.
    NoMatch,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: Outcome,
    pub entry: CatalogEntry,
    /// Local copy of the image, if it could be obtained.
    pub image_path: Option<PathBuf>,
    pub background_set: bool,
    pub catalog_refreshed: bool,
    pub state: RotationState,
}

pub struct Rotator<'a, R: RemoteStore + ?Sized, D: Desktop + ?Sized> {
    remote: &'a R,
    desktop: &'a D,
    owner: String,
    folder: RemoteFolder,
    key: FolderKey,
    cache: CatalogCache,
    states: StateStore,
    options: RunOptions,
}

impl<'a, R: RemoteStore + ?Sized, D: Desktop + ?Sized> Rotator<'a, R, D> {
    pub fn new(
        remote: &'a R,
        desktop: &'a D,
        owner: impl Into<String>,
        folder: RemoteFolder,
        locations: &Locations,
        options: RunOptions,
    ) -> Self {
        let owner = owner.into();
        let key = FolderKey::new(owner.clone(), folder.id.clone());
        Self {
            remote,
            desktop,
            owner,
            folder,
            key,
            cache: CatalogCache::new(&locations.cache_dir),
            states: StateStore::new(&locations.config_dir),
            options,
        }
    }

    pub fn key(&self) -> &FolderKey {
        &self.key
    }

    pub fn run(&self, now: DateTime<Utc>) -> Result<RunReport> {
        // State files store whole seconds.
        let now = now.trunc_subsecs(0);
        let mirror = StateMirror::new(self.remote, self.key.clone());

        let mut state = self.states.load(&self.key);
        if self.options.sync {
            if let Some(remote_state) = mirror.download()? {
                if state.adopt_if_newer(remote_state) {
                    info!(index = state.current_index, "using newer state from another machine");
                }
            }
        }
        state.resolve_seed(self.options.seed);

        let (catalog, catalog_refreshed) = self.load_catalog(&mut state, now)?;

        let pick_options = self.options.pick;
        if pick_options.force {
            info!("forcing a change of background");
        }
        let (outcome, entry) = match picker::pick(&catalog, &state, now, &pick_options) {
            Ok(pick) => {
                state = pick.state;
                let outcome = if pick.changed {
                    Outcome::Changed
                } else {
                    Outcome::Unchanged
                };
                (outcome, pick.entry)
            }
            Err(Error::NoMatch { fallback }) => {
                warn!(
                    min_ratio = pick_options.min_ratio,
                    max_ratio = pick_options.max_ratio,
                    "no image matches the filters; keeping the current one"
                );
                (Outcome::NoMatch, *fallback)
            }
            Err(err) => return Err(err),
        };
        info!(id = %entry.id, index = state.current_index, ?outcome, "picked image");

        if let Err(err) = self.cache.save(&self.key, &catalog) {
            warn!(error = %err, "failed to save catalog cache; the next run will fetch again");
        }

        let image_path = match self.ensure_local_copy(&entry) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(error = %err, id = %entry.id, "failed to download image");
                None
            }
        };
        let background_set = match &image_path {
            Some(path) => match self.desktop.set_background(path) {
                Ok(()) => {
                    info!(path = %path.display(), "desktop background set");
                    true
                }
                Err(err) => {
                    warn!(error = %err, "failed to set desktop background");
                    false
                }
            },
            None => false,
        };

        state.state_timestamp = now;
        self.states.save(&self.key, &state)?;
        if self.options.sync {
            mirror.upload(&state, now)?;
        }

        Ok(RunReport {
            outcome,
            entry,
            image_path,
            background_set,
            catalog_refreshed,
            state,
        })
    }

    /// Returns the catalog to pick from, fetching and reconciling a new one
    /// when the cache is stale. Updates the state's index and cache stamp
    /// when it does.
    fn load_catalog(&self, state: &mut RotationState, now: DateTime<Utc>) -> Result<(Catalog, bool)> {
        let cached = match self.cache.load(&self.key) {
            Ok(cached) => cached,
            Err(err) => {
                warn!(error = %err, "ignoring unusable catalog cache");
                None
            }
        };

        let stale_reason = match &cached {
            None => Some("no usable cache"),
            Some(_) if self.options.refresh_cache => Some("refresh requested"),
            Some(c) if self.is_stale(c, now) => Some("cache expired"),
            Some(c) if state.cache_timestamp > c.fetched_at => {
                Some("another machine has a newer listing")
            }
            Some(_) => None,
        };
        match (stale_reason, cached) {
            (None, Some(catalog)) => Ok((catalog, false)),
            (reason, cached) => self.refresh(state, cached, reason.unwrap_or_default(), now),
        }
    }

    fn refresh(
        &self,
        state: &mut RotationState,
        cached: Option<Catalog>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(Catalog, bool)> {
        info!(reason, folder = %self.folder.name, "fetching folder listing");
        let mut fresh = match self.remote.list_folder_images(&self.owner, &self.folder.id) {
            Ok(fresh) => fresh,
            Err(err) => match cached {
                Some(stale) => {
                    warn!(error = %format!("{err:#}"), "failed to fetch folder listing; using cached copy");
                    return Ok((stale, false));
                }
                None => return Err(Error::Remote(err)),
            },
        };
        catalog::shuffle(&mut fresh, state.seed);

        // An index from another machine's newer listing does not describe our
        // cache. Its catalog is not synced, so the index is applied to the
        // plain seeded order; both machines converge on that order once the
        // other one adopts this state.
        let (reconciled, changed) = match &cached {
            Some(old) if state.cache_timestamp <= old.fetched_at => {
                (reconcile(&old.entries, state.current_index, fresh), true)
            }
            _ => {
                let changed = cached.as_ref().is_none_or(|old| old.entries != fresh);
                let reconciled = Reconciled {
                    entries: fresh,
                    current_index: state.current_index,
                };
                (reconciled, changed)
            }
        };
        info!(
            images = reconciled.entries.len(),
            index = reconciled.current_index,
            "folder listing refreshed"
        );

        state.current_index = reconciled.current_index;
        // The stamp marks the last change of the catalog content.
        if changed {
            state.cache_timestamp = now;
        }
        Ok((Catalog::new(now, reconciled.entries), true))
    }

    fn is_stale(&self, catalog: &Catalog, now: DateTime<Utc>) -> bool {
        let ttl = TimeDelta::from_std(self.options.cache_ttl).unwrap_or(TimeDelta::MAX);
        catalog
            .fetched_at
            .checked_add_signed(ttl)
            .is_some_and(|deadline| deadline <= now)
    }

    fn ensure_local_copy(&self, entry: &CatalogEntry) -> Result<PathBuf> {
        let path = self.cache.dir().join(entry.file_name());
        if path.exists() {
            debug!(path = %path.display(), "image already downloaded");
            return Ok(path);
        }
        let bytes = self
            .remote
            .download_image_bytes(&entry.link)
            .map_err(Error::Remote)?;
        persist::write_atomic(&path, &bytes, IMAGE_MODE)?;
        debug!(path = %path.display(), bytes = bytes.len(), "downloaded image");
        Ok(path)
    }
}
