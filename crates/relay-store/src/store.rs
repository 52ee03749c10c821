//! The per-environment flag/segment store: initialization status plus
//! read-only accessors. The store is owned by its environment; only the
//! environment's upstream-client task writes to it (spec §5), all other
//! readers are lock-free snapshot readers over an `arc_swap`-style clone.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientSideAvailability {
    #[serde(default)]
    pub using_environment_id: bool,
    #[serde(default)]
    pub using_mobile_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagRep {
    pub key: String,
    pub version: u64,
    pub value: serde_json::Value,
    pub variation: u64,
    #[serde(default)]
    pub track_events: bool,
    #[serde(default)]
    pub is_experiment: bool,
    #[serde(default)]
    pub debug_events_until_date: Option<i64>,
    #[serde(default)]
    pub client_side_availability: ClientSideAvailability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRep {
    pub key: String,
    pub version: u64,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    Uninitialized,
    Initialized,
}

/// A point-in-time, cheaply cloneable view of a store's contents. Used both
/// to answer polling/eval requests and as the initial "put" a stream
/// provider sends a new subscriber.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub flags: BTreeMap<String, FlagRep>,
    pub segments: BTreeMap<String, SegmentRep>,
}

pub struct DataStore {
    inner: RwLock<Inner>,
}

struct Inner {
    status: InitStatus,
    snapshot: StoreSnapshot,
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                status: InitStatus::Uninitialized,
                snapshot: StoreSnapshot::default(),
            }),
        }
    }

    /// Replace the entire store contents (a full "put").
    pub fn init(&self, flags: Vec<FlagRep>, segments: Vec<SegmentRep>) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.snapshot.flags = flags.into_iter().map(|f| (f.key.clone(), f)).collect();
        inner.snapshot.segments = segments
            .into_iter()
            .map(|s| (s.key.clone(), s))
            .collect();
        inner.status = InitStatus::Initialized;
    }

    pub fn upsert_flag(&self, flag: FlagRep) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.snapshot.flags.insert(flag.key.clone(), flag);
    }

    pub fn upsert_segment(&self, segment: SegmentRep) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.snapshot.segments.insert(segment.key.clone(), segment);
    }

    pub fn delete_flag(&self, key: &str) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.snapshot.flags.remove(key);
    }

    pub fn delete_segment(&self, key: &str) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.snapshot.segments.remove(key);
    }

    pub fn status(&self) -> InitStatus {
        self.inner.read().expect("store lock poisoned").status
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.inner.read().expect("store lock poisoned").snapshot.clone()
    }

    pub fn get_flag(&self, key: &str) -> Option<FlagRep> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .snapshot
            .flags
            .get(key)
            .cloned()
    }

    pub fn get_segment(&self, key: &str) -> Option<SegmentRep> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .snapshot
            .segments
            .get(key)
            .cloned()
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(key: &str, version: u64) -> FlagRep {
        FlagRep {
            key: key.to_string(),
            version,
            value: serde_json::json!(true),
            variation: 0,
            track_events: false,
            is_experiment: false,
            debug_events_until_date: None,
            client_side_availability: ClientSideAvailability::default(),
        }
    }

    #[test]
    fn uninitialized_until_init_called() {
        let store = DataStore::new();
        assert_eq!(store.status(), InitStatus::Uninitialized);
        store.init(vec![flag("a", 1)], vec![]);
        assert_eq!(store.status(), InitStatus::Initialized);
    }

    #[test]
    fn upsert_and_delete_flag() {
        let store = DataStore::new();
        store.init(vec![flag("a", 1)], vec![]);
        store.upsert_flag(flag("b", 1));
        assert!(store.get_flag("b").is_some());
        store.delete_flag("a");
        assert!(store.get_flag("a").is_none());
    }

    #[test]
    fn snapshot_is_independent_copy() {
        let store = DataStore::new();
        store.init(vec![flag("a", 1)], vec![]);
        let snap = store.snapshot();
        store.upsert_flag(flag("a", 2));
        assert_eq!(snap.flags["a"].version, 1);
        assert_eq!(store.get_flag("a").unwrap().version, 2);
    }
}
