//! Desktop background rotation fed from an Imgur favourites folder.
//!
//! Each run loads the rotation state (merging a newer copy mirrored by
//! another machine), refreshes the cached folder listing when it is stale,
//! picks the next image, sets it as the background and saves the state.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod desktop;
pub mod error;
pub mod logging;
pub mod mirror;
pub mod persist;
pub mod picker;
pub mod reconcile;
pub mod remote;
pub mod rotation;
pub mod state;
pub mod upload;

pub use catalog::{Catalog, CatalogEntry, FolderKey};
pub use error::{Error, Result};
pub use rotation::{Outcome, RunOptions, RunReport, Rotator, select_folder};
pub use state::RotationState;
