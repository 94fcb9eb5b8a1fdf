use crate::domain::models::{DEFAULT_DURATION, FloorArea, TimerPatch, TimerRecord};
use crate::domain::seed::initial_timers;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::KeyValueStore;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

pub const TIMERS_KEY: &str = "timers";

/// In-memory timer list mirrored to a key-value blob after every mutation.
///
/// Storage failures are logged and never returned: a failed read behaves like
/// empty storage and a failed write leaves the in-memory list authoritative.
pub struct TimerStore<K>
where
    K: KeyValueStore,
{
    storage: Arc<K>,
    seed: Vec<TimerRecord>,
    default_duration: String,
    timers: Mutex<Vec<TimerRecord>>,
}

impl<K> TimerStore<K>
where
    K: KeyValueStore,
{
    pub fn new(storage: Arc<K>) -> Self {
        Self {
            storage,
            seed: initial_timers(),
            default_duration: DEFAULT_DURATION.to_string(),
            timers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default_duration(mut self, duration: impl Into<String>) -> Self {
        self.default_duration = duration.into();
        self
    }

    pub fn load(&self) -> Vec<TimerRecord> {
        let stored = match self.storage.get(TIMERS_KEY) {
            Ok(stored) => stored,
            Err(error) => {
                warn!(%error, "failed to read stored timers; using seed layout");
                let seed = self.seed.clone();
                *self.timers() = seed.clone();
                return seed;
            }
        };

        let loaded = match stored {
            None => {
                info!(count = self.seed.len(), "seeding timers from initial layout");
                self.seed.clone()
            }
            Some(raw) => match self.merge_with_seed(&raw) {
                Ok(merged) => merged,
                Err(error) => {
                    warn!(%error, "stored timers are corrupt; resetting to seed layout");
                    self.seed.clone()
                }
            },
        };

        let mut timers = self.timers();
        *timers = loaded;
        self.persist(&timers);
        timers.clone()
    }

    /// Re-reads storage as-is, without reconciling against the seed layout.
    pub fn refresh(&self) -> Vec<TimerRecord> {
        let refreshed = match self.storage.get(TIMERS_KEY) {
            Ok(None) => {
                let seed = self.seed.clone();
                self.persist(&seed);
                seed
            }
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Array(items)) => items
                    .into_iter()
                    .filter_map(|item| match serde_json::from_value::<TimerRecord>(item) {
                        Ok(record) => Some(record),
                        Err(error) => {
                            warn!(%error, "dropping unreadable stored timer");
                            None
                        }
                    })
                    .collect(),
                Ok(_) => self.seed.clone(),
                Err(error) => {
                    warn!(%error, "refresh failed to parse stored timers");
                    self.seed.clone()
                }
            },
            Err(error) => {
                warn!(%error, "refresh failed to read stored timers");
                self.seed.clone()
            }
        };

        let mut timers = self.timers();
        *timers = refreshed;
        timers.clone()
    }

    /// Applies `patch` to the timer with `timer_id`, appending a new timer when
    /// none exists. Returns `None` when the result would not be a valid timer.
    pub fn update(&self, timer_id: &str, patch: &TimerPatch) -> Option<TimerRecord> {
        let mut timers = self.timers();
        let index = timers.iter().position(|timer| timer.id == timer_id);

        let mut candidate = match index {
            Some(index) => timers[index].clone(),
            None => TimerRecord::new(timer_id),
        };
        candidate.apply(patch);
        if let Err(error) = candidate.validate() {
            warn!(timer_id, %error, "rejecting timer update");
            return None;
        }

        match index {
            Some(index) => timers[index] = candidate.clone(),
            None => timers.push(candidate.clone()),
        }
        self.persist(&timers);
        Some(candidate)
    }

    pub fn reset(&self, timer_id: &str) -> Option<TimerRecord> {
        let mut timers = self.timers();
        let timer = timers.iter_mut().find(|timer| timer.id == timer_id)?;
        timer.start = None;
        timer.duration = self.default_duration.clone();
        let reset = timer.clone();

        self.persist(&timers);
        info!(timer_id, "timer reset");
        Some(reset)
    }

    pub fn add(&self, record: TimerRecord) {
        let mut timers = self.timers();
        timers.push(record);
        self.persist(&timers);
    }

    pub fn remove(&self, timer_id: &str) -> bool {
        let mut timers = self.timers();
        let before = timers.len();
        timers.retain(|timer| timer.id != timer_id);
        let removed = timers.len() != before;
        self.persist(&timers);
        removed
    }

    /// Deletes the persisted list; the next `load` reseeds.
    pub fn purge(&self) {
        match self.storage.remove(TIMERS_KEY) {
            Ok(()) => info!("stored timers removed"),
            Err(error) => warn!(%error, "failed to remove stored timers"),
        }
    }

    pub fn snapshot(&self) -> Vec<TimerRecord> {
        self.timers().clone()
    }

    pub fn get(&self, timer_id: &str) -> Option<TimerRecord> {
        self.timers().iter().find(|timer| timer.id == timer_id).cloned()
    }

    pub fn in_area(&self, area: FloorArea) -> Vec<TimerRecord> {
        self.timers()
            .iter()
            .filter(|timer| timer.area() == Some(area))
            .cloned()
            .collect()
    }

    pub fn dump_json(&self) -> Option<String> {
        let raw = match self.storage.get(TIMERS_KEY) {
            Ok(raw) => raw?,
            Err(error) => {
                warn!(%error, "failed to read stored timers");
                return None;
            }
        };
        let parsed: Value = serde_json::from_str(&raw).ok()?;
        serde_json::to_string_pretty(&parsed).ok()
    }

    fn timers(&self) -> MutexGuard<'_, Vec<TimerRecord>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, timers: &[TimerRecord]) {
        let result = serde_json::to_string(timers)
            .map_err(InfraError::from)
            .and_then(|payload| self.storage.set(TIMERS_KEY, &payload));
        if let Err(error) = result {
            warn!(%error, "failed to persist timers");
        }
    }

    fn merge_with_seed(&self, raw: &str) -> Result<Vec<TimerRecord>, InfraError> {
        let parsed: Value = serde_json::from_str(raw)?;
        let items = match parsed {
            Value::Array(items) if !items.is_empty() => items,
            _ => {
                info!("stored timers are empty or not a list; using seed layout");
                return Ok(self.seed.clone());
            }
        };

        let mut stored_by_id: HashMap<String, Map<String, Value>> = HashMap::new();
        for item in items {
            let id = item
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(ToOwned::to_owned);
            match (id, item) {
                (Some(id), Value::Object(fields)) => {
                    stored_by_id.insert(id, fields);
                }
                (_, item) => warn!(%item, "ignoring stored timer without id"),
            }
        }

        let merged = self
            .seed
            .iter()
            .map(|seed| match stored_by_id.remove(&seed.id) {
                Some(fields) => overlay(seed, fields),
                None => seed.clone(),
            })
            .collect();

        if !stored_by_id.is_empty() {
            let mut orphaned: Vec<_> = stored_by_id.into_keys().collect();
            orphaned.sort();
            warn!(?orphaned, "discarding stored timers that are not in the seed layout");
        }
        Ok(merged)
    }
}

fn overlay(seed: &TimerRecord, fields: Map<String, Value>) -> TimerRecord {
    let mut merged = match serde_json::to_value(seed) {
        Ok(Value::Object(merged)) => merged,
        _ => return seed.clone(),
    };
    for (key, value) in fields {
        if key != "id" {
            merged.insert(key, value);
        }
    }

    let record = serde_json::from_value::<TimerRecord>(Value::Object(merged))
        .map_err(|error| error.to_string())
        .and_then(|record| record.validate().map(|()| record));
    match record {
        Ok(record) => record,
        Err(error) => {
            warn!(timer_id = %seed.id, %error, "stored timer is malformed; using seed values");
            seed.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemoryKeyValueStore;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn store_with(raw: Option<&str>) -> (Arc<InMemoryKeyValueStore>, TimerStore<InMemoryKeyValueStore>) {
        let storage = Arc::new(InMemoryKeyValueStore::default());
        if let Some(raw) = raw {
            storage.set(TIMERS_KEY, raw).expect("seed storage");
        }
        let store = TimerStore::new(Arc::clone(&storage));
        (storage, store)
    }

    fn stored_list(storage: &InMemoryKeyValueStore) -> Vec<TimerRecord> {
        let raw = storage.get(TIMERS_KEY).expect("read").expect("timers persisted");
        serde_json::from_str(&raw).expect("parse persisted timers")
    }

    #[derive(Debug, Default)]
    struct FailingStore {
        fail_writes: AtomicBool,
        inner: InMemoryKeyValueStore,
    }

    impl KeyValueStore for FailingStore {
        fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(InfraError::Io(std::io::Error::other("disk full")));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), InfraError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn load_with_empty_storage_seeds_and_persists() {
        let (storage, store) = store_with(None);
        let loaded = store.load();
        assert_eq!(loaded, initial_timers());
        assert_eq!(stored_list(&storage), initial_timers());
    }

    #[test]
    fn load_with_empty_or_non_list_value_reseeds() {
        for raw in ["[]", r#"{"id":"1"}"#, "not json"] {
            let (storage, store) = store_with(Some(raw));
            assert_eq!(store.load(), initial_timers());
            assert_eq!(stored_list(&storage), initial_timers());
        }
    }

    #[test]
    fn load_overlays_stored_fields_and_drops_unknown_ids() {
        let (storage, store) = store_with(Some(
            r#"[
                {"id":"3","start":"2026-03-01T10:00:00Z","duration":"10:00"},
                {"id":"999","start":null,"duration":"05:00"},
                {"start":null},
                {"id":"49","x":90}
            ]"#,
        ));
        let loaded = store.load();

        assert_eq!(loaded.len(), initial_timers().len());
        assert!(loaded.iter().all(|timer| timer.id != "999"));

        let third = loaded.iter().find(|timer| timer.id == "3").expect("timer 3");
        assert_eq!(third.start, Some(fixed_time("2026-03-01T10:00:00Z")));
        assert_eq!(third.duration, "10:00");
        assert_eq!(third.x, 275.0);

        let bench = loaded.iter().find(|timer| timer.id == "49").expect("timer 49");
        assert_eq!(bench.x, 90.0);
        assert_eq!(bench.shape, crate::domain::models::TimerShape::Rectangle);

        assert_eq!(stored_list(&storage), loaded);
    }

    #[test]
    fn load_falls_back_to_seed_for_malformed_fields() {
        let (_, store) = store_with(Some(r#"[{"id":"2","duration":"soon","scale":"big"}]"#));
        let loaded = store.load();
        let second = loaded.iter().find(|timer| timer.id == "2").expect("timer 2");
        assert_eq!(second, &initial_timers()[1]);
    }

    #[test]
    fn load_falls_back_to_seed_for_overflowing_duration() {
        let (storage, store) = store_with(Some(
            r#"[{"id":"1","duration":"999999999999999999:00","start":"2026-03-01T10:00:00Z"}]"#,
        ));
        let loaded = store.load();
        assert_eq!(loaded.len(), 51);
        assert_eq!(loaded[0], initial_timers()[0]);
        assert_eq!(stored_list(&storage)[0].duration, DEFAULT_DURATION);
    }

    #[test]
    fn update_patches_existing_and_appends_missing() {
        let (storage, store) = store_with(None);
        store.load();
        let start = fixed_time("2026-03-01T10:00:00Z");

        let updated = store
            .update("5", &TimerPatch::started(start, "20:00"))
            .expect("update timer 5");
        assert_eq!(updated.id, "5");
        assert_eq!(updated.x, 260.0);
        assert_eq!(updated.start, Some(start));

        let appended = store
            .update("patio-1", &TimerPatch::started(start, "05:00"))
            .expect("append timer");
        assert_eq!(appended.duration, "05:00");

        let persisted = stored_list(&storage);
        assert_eq!(persisted.len(), initial_timers().len() + 1);
        assert_eq!(persisted.last().map(|timer| timer.id.as_str()), Some("patio-1"));
    }

    #[test]
    fn update_rejects_invalid_duration() {
        let (_, store) = store_with(None);
        store.load();
        let patch = TimerPatch {
            duration: Some("later".to_string()),
            ..TimerPatch::default()
        };
        assert!(store.update("1", &patch).is_none());
        assert_eq!(store.get("1").expect("timer 1").duration, DEFAULT_DURATION);
    }

    #[test]
    fn reset_restores_idle_default() {
        let (storage, store) = store_with(None);
        store.load();
        store.update("7", &TimerPatch::started(fixed_time("2026-03-01T10:00:00Z"), "10:00"));

        let reset = store.reset("7").expect("reset timer 7");
        assert_eq!(reset.start, None);
        assert_eq!(reset.duration, DEFAULT_DURATION);
        assert!(store.reset("missing").is_none());
        assert_eq!(stored_list(&storage), store.snapshot());
    }

    #[test]
    fn reset_uses_configured_default_duration() {
        let storage = Arc::new(InMemoryKeyValueStore::default());
        let store = TimerStore::new(storage).with_default_duration("30:00");
        store.load();
        assert_eq!(store.reset("1").expect("reset").duration, "30:00");
    }

    #[test]
    fn add_and_remove_persist() {
        let (storage, store) = store_with(None);
        store.load();
        store.add(TimerRecord::new("extra"));
        assert!(stored_list(&storage).iter().any(|timer| timer.id == "extra"));
        assert!(store.remove("extra"));
        assert!(!store.remove("extra"));
        assert!(stored_list(&storage).iter().all(|timer| timer.id != "extra"));
    }

    #[test]
    fn refresh_takes_stored_list_without_merging() {
        let (_, store) = store_with(Some(r#"[{"id":"999"},{"nope":true}]"#));
        let refreshed = store.refresh();
        assert_eq!(refreshed, vec![TimerRecord::new("999")]);
    }

    #[test]
    fn purge_clears_storage_and_next_load_reseeds() {
        let (storage, store) = store_with(None);
        store.load();
        store.update("1", &TimerPatch::started(fixed_time("2026-03-01T10:00:00Z"), "10:00"));
        store.purge();
        assert_eq!(storage.get(TIMERS_KEY).expect("read"), None);
        assert_eq!(store.load(), initial_timers());
    }

    #[test]
    fn write_failures_keep_memory_authoritative() {
        let storage = Arc::new(FailingStore::default());
        let store = TimerStore::new(Arc::clone(&storage));
        store.load();
        storage.fail_writes.store(true, Ordering::SeqCst);

        let start = fixed_time("2026-03-01T10:00:00Z");
        let updated = store.update("1", &TimerPatch::started(start, "10:00"));
        assert!(updated.is_some());
        assert_eq!(store.get("1").and_then(|timer| timer.start), Some(start));

        let raw = storage.get(TIMERS_KEY).expect("read").expect("seed persisted");
        let persisted: Vec<TimerRecord> = serde_json::from_str(&raw).expect("parse");
        assert_eq!(persisted[0].start, None);
    }

    #[test]
    fn area_filter_and_dump() {
        let (_, store) = store_with(None);
        store.load();
        assert_eq!(store.in_area(FloorArea::Inside).len(), 30);
        assert_eq!(store.in_area(FloorArea::Outside).len(), 21);
        let dump = store.dump_json().expect("dump");
        assert!(dump.contains("\"id\": \"51\""));
    }
}
