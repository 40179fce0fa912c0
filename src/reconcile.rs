//! Carries rotation progress across a catalog refresh.

use std::collections::HashSet;

use tracing::debug;

use crate::catalog::CatalogEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub entries: Vec<CatalogEntry>,
    pub current_index: usize,
}

/// Moves entries of the old seen prefix (`old[..current_index]`) that still
/// exist to the front of `fresh`, keeping the fresh relative order on both
/// sides of the split. The returned index is the number of survivors.
pub fn reconcile(old: &[CatalogEntry], current_index: usize, fresh: Vec<CatalogEntry>) -> Reconciled {
    let seen_len = current_index.min(old.len());
    if seen_len == 0 {
        return Reconciled {
            entries: fresh,
            current_index: 0,
        };
    }

    let seen: HashSet<&str> = old[..seen_len].iter().map(|e| e.id.as_str()).collect();
    let (mut entries, unseen): (Vec<_>, Vec<_>) = fresh
        .into_iter()
        .partition(|entry| seen.contains(entry.id.as_str()));
    let survivors = entries.len();
    entries.extend(unseen);

    debug!(
        seen = seen_len,
        survivors,
        dropped = seen_len - survivors.min(seen_len),
        "reconciled catalog"
    );
    Reconciled {
        entries,
        current_index: survivors,
    }
}
