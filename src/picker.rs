use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace};

use crate::catalog::{Catalog, CatalogEntry};
use crate::error::{Error, Result};
use crate::state::RotationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickOptions {
    /// How long an image stays before it is due for a change.
    pub expiry: Duration,
    /// Minimum width/height percentage; 0 disables.
    pub min_ratio: u32,
    /// Maximum width/height percentage; 0 disables.
    pub max_ratio: u32,
    /// Treat the current image as expired regardless of `expiry`.
    pub force: bool,
}

impl Default for PickOptions {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(24 * 60 * 60),
            min_ratio: 0,
            max_ratio: 0,
            force: false,
        }
    }
}

impl PickOptions {
    /// A minimum above the maximum could never match; the maximum wins.
    fn effective_min(&self) -> u32 {
        if self.max_ratio > 0 && self.min_ratio > self.max_ratio {
            0
        } else {
            self.min_ratio
        }
    }

    fn accepts(&self, entry: &CatalogEntry) -> bool {
        if !entry.is_still_image() {
            trace!(id = %entry.id, media = %entry.media_type, "skipping non-still image");
            return false;
        }
        let ratio = entry.aspect_ratio();
        let min = self.effective_min();
        if min > 0 && ratio < min {
            trace!(id = %entry.id, ratio, min, "skipping narrow image");
            return false;
        }
        if self.max_ratio > 0 && ratio > self.max_ratio {
            trace!(id = %entry.id, ratio, max = self.max_ratio, "skipping wide image");
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pick {
    pub entry: CatalogEntry,
    pub state: RotationState,
    /// Whether the displayed image changed.
    pub changed: bool,
}

/// Chooses the image to display at `now`.
///
/// Before expiry the current entry is returned with the state untouched.
/// Once due, the catalog is scanned forward from the entry after the current
/// one, wrapping, and the first entry passing the filters becomes current.
/// A scan that finds nothing yields [`Error::NoMatch`] carrying the current
/// entry.
pub fn pick(
    catalog: &Catalog,
    state: &RotationState,
    now: DateTime<Utc>,
    options: &PickOptions,
) -> Result<Pick> {
    let len = catalog.len();
    if len == 0 {
        return Err(Error::EmptyCatalog);
    }
    let mut state = state.clone();
    if state.current_index >= len {
        debug!(index = state.current_index, len, "current index out of range; restarting");
        state.current_index = 0;
    }
    let current = state.current_index;

    if !options.force && !is_due(&state, now, options.expiry) {
        return Ok(Pick {
            entry: catalog.entries[current].clone(),
            state,
            changed: false,
        });
    }

    for step in 1..=len {
        let index = (current + step) % len;
        let entry = &catalog.entries[index];
        if options.accepts(entry) {
            debug!(index, id = %entry.id, "picked next image");
            state.current_index = index;
            state.date_changed = now;
            return Ok(Pick {
                entry: entry.clone(),
                state,
                changed: true,
            });
        }
    }

    Err(Error::NoMatch {
        fallback: Box::new(catalog.entries[current].clone()),
    })
}

fn is_due(state: &RotationState, now: DateTime<Utc>, expiry: Duration) -> bool {
    let expiry = TimeDelta::from_std(expiry).unwrap_or(TimeDelta::MAX);
    match state.date_changed.checked_add_signed(expiry) {
        Some(deadline) => deadline <= now,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{PickOptions, pick};
    use crate::catalog::{Catalog, CatalogEntry};
    use crate::error::Error;
    use crate::state::RotationState;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;

    fn entry(id: &str, width: u32, height: u32) -> CatalogEntry {
        CatalogEntry {
            id: id.into(),
            link: format!("https://i.imgur.com/{id}.jpg"),
            media_type: "image/jpeg".into(),
            animated: false,
            width,
            height,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn catalog(list: Vec<CatalogEntry>) -> Catalog {
        Catalog::new(now(), list)
    }

    fn landscape(n: usize) -> Catalog {
        catalog((0..n).map(|i| entry(&format!("e{i}"), 1920, 1080)).collect())
    }

    fn hourly() -> PickOptions {
        PickOptions {
            expiry: Duration::from_secs(3600),
            ..PickOptions::default()
        }
    }

    #[test]
    fn pick_before_expiry_is_idempotent() {
        let catalog = landscape(4);
        let state = RotationState {
            current_index: 2,
            date_changed: now() - chrono::TimeDelta::minutes(10),
            ..RotationState::default()
        };
        for _ in 0..3 {
            let result = pick(&catalog, &state, now(), &hourly()).unwrap();
            assert_eq!(result.entry.id, "e2");
            assert_eq!(result.state, state);
            assert!(!result.changed);
        }
    }

    #[test]
    fn expired_picks_visit_every_entry_once() {
        let catalog = landscape(5);
        let mut state = RotationState::default();
        let mut visited = Vec::new();
        let mut clock = now();
        for _ in 0..5 {
            let result = pick(&catalog, &state, clock, &hourly()).unwrap();
            visited.push(result.entry.id.clone());
            state = result.state;
            clock += chrono::TimeDelta::hours(2);
        }
        assert_eq!(visited, vec!["e1", "e2", "e3", "e4", "e0"]);
        let again = pick(&catalog, &state, clock, &hourly()).unwrap();
        assert_eq!(again.entry.id, "e1");
    }

    #[test]
    fn force_changes_before_expiry() {
        let catalog = landscape(3);
        let state = RotationState {
            date_changed: now(),
            ..RotationState::default()
        };
        let options = PickOptions {
            force: true,
            ..hourly()
        };
        let result = pick(&catalog, &state, now(), &options).unwrap();
        assert_eq!(result.entry.id, "e1");
        assert_eq!(result.state.date_changed, now());
        assert!(result.changed);
    }

    #[test]
    fn impossible_filter_reports_no_match_with_current_entry() {
        let catalog = landscape(4);
        let state = RotationState {
            current_index: 1,
            ..RotationState::default()
        };
        let options = PickOptions {
            min_ratio: 1000,
            ..hourly()
        };
        match pick(&catalog, &state, now(), &options) {
            Err(Error::NoMatch { fallback }) => assert_eq!(fallback.id, "e1"),
            other => panic!("expected NoMatch, got {other:?}"),
        }
    }

    #[test]
    fn skips_animated_and_out_of_ratio_entries() {
        let mut gif = entry("gif", 1920, 1080);
        gif.animated = true;
        let mut video = entry("video", 1920, 1080);
        video.media_type = "video/mp4".into();
        let catalog = catalog(vec![
            entry("start", 1920, 1080),
            gif,
            video,
            entry("portrait", 1080, 1920),
            entry("ultrawide", 3440, 1080),
            entry("good", 2560, 1440),
        ]);
        let options = PickOptions {
            min_ratio: 150,
            max_ratio: 200,
            ..hourly()
        };
        let result = pick(&catalog, &RotationState::default(), now(), &options).unwrap();
        assert_eq!(result.entry.id, "good");
        assert_eq!(result.state.current_index, 5);
    }

    #[test]
    fn max_ratio_wins_over_conflicting_min() {
        let catalog = catalog(vec![entry("wide", 1920, 1080), entry("tall", 1080, 1920)]);
        let options = PickOptions {
            min_ratio: 150,
            max_ratio: 100,
            ..hourly()
        };
        let result = pick(&catalog, &RotationState::default(), now(), &options).unwrap();
        assert_eq!(result.entry.id, "tall");
    }

    #[test]
    fn wraps_back_to_current_when_it_is_the_only_match() {
        let catalog = catalog(vec![entry("only", 1920, 1080), entry("tall", 1080, 1920)]);
        let options = PickOptions {
            min_ratio: 150,
            ..hourly()
        };
        let result = pick(&catalog, &RotationState::default(), now(), &options).unwrap();
        assert_eq!(result.entry.id, "only");
        assert!(result.changed);
    }

    #[test]
    fn out_of_range_index_restarts_at_zero() {
        let catalog = landscape(2);
        let state = RotationState {
            current_index: 10,
            date_changed: now(),
            ..RotationState::default()
        };
        let result = pick(&catalog, &state, now(), &hourly()).unwrap();
        assert_eq!(result.entry.id, "e0");
        assert_eq!(result.state.current_index, 0);
    }

    #[test]
    fn empty_catalog_is_an_error() {
        let err = pick(&catalog(Vec::new()), &RotationState::default(), now(), &hourly());
        assert!(matches!(err, Err(Error::EmptyCatalog)));
    }
}
