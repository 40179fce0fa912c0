use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::FolderKey;
use crate::error::{Error, Result};
use crate::persist;

const STATE_MODE: u32 = 0o644;

/// Rotation progress for one folder.
///
/// Timestamps travel as RFC 3339 text. Missing, null or unparseable values
/// decode as [`ZERO_TIME`] so files written by older releases still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationState {
    #[serde(default, alias = "current_image")]
    pub current_index: usize,
    /// When the catalog this index refers to was fetched.
    #[serde(default = "zero_time", with = "timestamp")]
    pub cache_timestamp: DateTime<Utc>,
    /// When the displayed image last changed.
    #[serde(default = "zero_time", with = "timestamp")]
    pub date_changed: DateTime<Utc>,
    /// When this record was produced; decides remote merges.
    #[serde(default = "zero_time", with = "timestamp")]
    pub state_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub seed: u64,
}

/// The "never happened" instant.
pub const ZERO_TIME: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

fn zero_time() -> DateTime<Utc> {
    ZERO_TIME
}

impl Default for RotationState {
    fn default() -> Self {
        Self {
            current_index: 0,
            cache_timestamp: ZERO_TIME,
            date_changed: ZERO_TIME,
            state_timestamp: ZERO_TIME,
            seed: 0,
        }
    }
}

impl RotationState {
    /// True until a run has saved this state at least once.
    pub fn is_pristine(&self) -> bool {
        self.state_timestamp == ZERO_TIME
    }

    /// Last-writer-wins: the remote record replaces `self` wholesale when it
    /// was produced strictly later. Returns whether it was adopted.
    pub fn adopt_if_newer(&mut self, remote: RotationState) -> bool {
        if remote.state_timestamp > self.state_timestamp {
            debug!(
                local = %self.state_timestamp,
                remote = %remote.state_timestamp,
                "remote state is newer"
            );
            *self = remote;
            true
        } else {
            false
        }
    }

    /// Applies the shuffle seed contract: a positive requested seed always
    /// wins; otherwise an existing state keeps its seed and only a first run
    /// picks a fresh one (or none, when `Some(0)` asks for remote order).
    pub fn resolve_seed(&mut self, requested: Option<u64>) {
        self.resolve_seed_with(requested, || rand::rng().random_range(1..=u64::MAX));
    }

    pub fn resolve_seed_with(&mut self, requested: Option<u64>, fresh: impl FnOnce() -> u64) {
        match requested {
            Some(seed) if seed > 0 => self.seed = seed,
            _ if !self.is_pristine() => {}
            Some(_) => self.seed = 0,
            None => {
                self.seed = fresh();
                info!(seed = self.seed, "generated shuffle seed");
            }
        }
    }
}

/// Local rotation state, one JSON file per [`FolderKey`].
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, key: &FolderKey) -> PathBuf {
        self.dir.join(format!("state.{key}.json"))
    }

    /// Never fails: a missing file is a first run and an unreadable one is
    /// logged and replaced by a zero state.
    pub fn load(&self, key: &FolderKey) -> RotationState {
        let path = self.path(key);
        match persist::read_json_optional::<RotationState>(&path) {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!(path = %path.display(), "no saved state; starting fresh");
                RotationState::default()
            }
            Err(err) => {
                warn!(error = %err, "ignoring unusable state file");
                RotationState::default()
            }
        }
    }

    pub fn save(&self, key: &FolderKey, state: &RotationState) -> Result<()> {
        persist::write_json(&self.path(key), state, STATE_MODE)
    }
}

/// Decodes a state payload received from another machine.
pub fn decode_payload(text: &str) -> Result<RotationState> {
    serde_json::from_str(text).map_err(|err| Error::SyncDecode(format!("bad payload: {err}")))
}

pub fn encode_payload(state: &RotationState) -> Result<String> {
    Ok(serde_json::to_string(state)?)
}

mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::ZERO_TIME;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(raw.as_str().map(parse).unwrap_or(ZERO_TIME))
    }

    /// Anything before the epoch (including Go-style `0001-01-01`) is zero.
    pub fn parse(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|t| t.with_timezone(&Utc))
            .map(|t| t.max(ZERO_TIME))
            .unwrap_or(ZERO_TIME)
    }
}

#[cfg(test)]
mod tests {
    use super::{RotationState, StateStore, ZERO_TIME, decode_payload, encode_payload};
    use crate::catalog::FolderKey;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn at(hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, hour, 0, 0).unwrap()
    }

    fn saved(index: usize, stamp: chrono::DateTime<Utc>, seed: u64) -> RotationState {
        RotationState {
            current_index: index,
            cache_timestamp: at(1),
            date_changed: at(2),
            state_timestamp: stamp,
            seed,
        }
    }

    #[test]
    fn missing_and_malformed_timestamps_are_zero() {
        let state = decode_payload(
            r#"{"current_image": 3, "cache_timestamp": "", "date_changed": "yesterday", "seed": 9}"#,
        )
        .unwrap();
        assert_eq!(state.current_index, 3);
        assert_eq!(state.cache_timestamp, ZERO_TIME);
        assert_eq!(state.date_changed, ZERO_TIME);
        assert_eq!(state.state_timestamp, ZERO_TIME);
        assert_eq!(state.seed, 9);
        assert!(state.is_pristine());
    }

    #[test]
    fn go_zero_time_maps_to_zero() {
        let state = decode_payload(r#"{"date_changed": "0001-01-01T00:00:00Z", "state_timestamp": null}"#)
            .unwrap();
        assert_eq!(state.date_changed, ZERO_TIME);
        assert_eq!(state.state_timestamp, ZERO_TIME);
    }

    #[test]
    fn offsets_are_normalised_to_utc() {
        let state = decode_payload(r#"{"date_changed": "2026-05-01T04:00:00+02:00"}"#).unwrap();
        assert_eq!(state.date_changed, at(2));
    }

    #[test]
    fn payload_round_trip_is_exact() {
        let mut state = saved(7, at(5), 1234);
        state.date_changed = Utc.timestamp_opt(1_780_000_000, 123_456_789).unwrap();
        let back = decode_payload(&encode_payload(&state).unwrap()).unwrap();
        assert_eq!(back, state);

        let zero = RotationState::default();
        assert_eq!(decode_payload(&encode_payload(&zero).unwrap()).unwrap(), zero);
    }

    #[test]
    fn newer_remote_replaces_local() {
        let mut local = saved(1, at(3), 5);
        let remote = saved(4, at(4), 6);
        assert!(local.adopt_if_newer(remote.clone()));
        assert_eq!(local, remote);
    }

    #[test]
    fn older_or_equal_remote_is_ignored() {
        let original = saved(1, at(3), 5);
        let mut local = original.clone();
        assert!(!local.adopt_if_newer(saved(4, at(2), 6)));
        assert!(!local.adopt_if_newer(saved(4, at(3), 6)));
        assert_eq!(local, original);
    }

    #[test]
    fn positive_seed_always_wins() {
        let mut state = saved(0, at(3), 5);
        state.resolve_seed_with(Some(11), || unreachable!());
        assert_eq!(state.seed, 11);
    }

    #[test]
    fn existing_state_keeps_its_seed() {
        let mut state = saved(0, at(3), 5);
        state.resolve_seed_with(None, || unreachable!());
        assert_eq!(state.seed, 5);
        state.resolve_seed_with(Some(0), || unreachable!());
        assert_eq!(state.seed, 5);
    }

    #[test]
    fn first_run_generates_a_seed_once() {
        let mut state = RotationState::default();
        state.resolve_seed_with(None, || 77);
        assert_eq!(state.seed, 77);

        let mut state = RotationState::default();
        state.resolve_seed(None);
        assert_ne!(state.seed, 0);
    }

    #[test]
    fn first_run_with_zero_seed_keeps_remote_order() {
        let mut state = RotationState::default();
        state.resolve_seed_with(Some(0), || unreachable!());
        assert_eq!(state.seed, 0);
    }

    #[test]
    fn store_round_trip_and_corruption() {
        let tmp = tempdir().unwrap();
        let store = StateStore::new(tmp.path());
        let key = FolderKey::new("alice", "42");
        assert_eq!(store.load(&key), RotationState::default());

        let state = saved(2, at(6), 8);
        store.save(&key, &state).unwrap();
        assert_eq!(store.load(&key), state);
        assert!(store.path(&key).ends_with("state.alice.42.json"));

        std::fs::write(store.path(&key), "garbage").unwrap();
        assert_eq!(store.load(&key), RotationState::default());
    }
}
