use crate::logging::append_run_log;
use crate::storage::StorageBackend;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub const RECORDS_KEY: &str = "attendance_records";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub member_id: String,
    pub service_id: String,
    pub location: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub timestamp: i64,
    pub synced: bool,
    #[serde(default)]
    pub sync_error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub member_id: String,
    pub service_id: String,
    pub location: String,
    pub notes: Option<String>,
}

// `sync_error` is doubly optional so a patch can distinguish "leave as
// is" from "clear".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub synced: Option<bool>,
    pub sync_error: Option<Option<String>>,
    pub retry_count: Option<u32>,
}

impl RecordPatch {
    pub fn accepted() -> Self {
        Self {
            synced: Some(true),
            sync_error: Some(None),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            sync_error: Some(Some(message.into())),
            ..Self::default()
        }
    }

    pub fn retried(count: u32) -> Self {
        Self {
            retry_count: Some(count),
            ..Self::default()
        }
    }
}

// The in-memory sequence is authoritative; the full blob is rewritten
// on every mutation.
pub struct RecordStore {
    storage: Arc<dyn StorageBackend>,
    records: Vec<AttendanceRecord>,
}

impl RecordStore {
    // An absent or unreadable blob fails open to the empty sequence.
    pub fn load(storage: Arc<dyn StorageBackend>) -> Self {
        let records = match storage.get(RECORDS_KEY) {
            Ok(Some(blob)) => match serde_json::from_str::<Vec<AttendanceRecord>>(&blob) {
                Ok(records) => {
                    append_run_log(
                        "info",
                        "record_store.hydrated",
                        json!({ "count": records.len() }),
                    );
                    records
                }
                Err(error) => {
                    append_run_log(
                        "warn",
                        "record_store.hydrate_failed",
                        json!({ "blob_len": blob.len(), "error": error.to_string() }),
                    );
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(error) => {
                append_run_log(
                    "warn",
                    "record_store.hydrate_failed",
                    json!({ "error": error.to_string() }),
                );
                Vec::new()
            }
        };
        Self { storage, records }
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // Records never leave the store, so the length doubles as a
    // monotonic sequence number for id generation.
    pub fn next_seq(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn append(&mut self, record: AttendanceRecord) {
        append_run_log("info", "record_store.appended", json!({ "id": record.id }));
        self.records.push(record);
        self.persist();
    }

    // No-op when `id` is absent or the record is already synced;
    // synced records are frozen.
    pub fn update(&mut self, id: &str, patch: RecordPatch) {
        let Some(record) = self.records.iter_mut().find(|record| record.id == id) else {
            return;
        };
        if record.synced {
            return;
        }
        if let Some(synced) = patch.synced {
            record.synced = synced;
        }
        if let Some(sync_error) = patch.sync_error {
            record.sync_error = sync_error;
        }
        if let Some(retry_count) = patch.retry_count {
            record.retry_count = retry_count;
        }
        self.persist();
    }

    // Owned clones in insertion order, so a sync cycle works on a
    // snapshot.
    pub fn unsynced(&self) -> Vec<AttendanceRecord> {
        self.records
            .iter()
            .filter(|record| !record.synced)
            .cloned()
            .collect()
    }

    pub fn clear_sync_errors(&mut self) {
        for record in &mut self.records {
            record.sync_error = None;
            if !record.synced {
                record.retry_count = 0;
            }
        }
        append_run_log(
            "info",
            "record_store.errors_cleared",
            json!({ "count": self.records.len() }),
        );
        self.persist();
    }

    // Persistence failures must not surface to the recording path; the
    // in-memory sequence stays authoritative and the next successful
    // rewrite repairs the blob.
    fn persist(&self) {
        let blob = match serde_json::to_string(&self.records) {
            Ok(blob) => blob,
            Err(error) => {
                append_run_log(
                    "warn",
                    "record_store.persist_failed",
                    json!({ "error": error.to_string() }),
                );
                return;
            }
        };
        if let Err(error) = self.storage.put(RECORDS_KEY, &blob) {
            append_run_log(
                "warn",
                "record_store.persist_failed",
                json!({ "error": error.to_string() }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AttendanceRecord, RecordPatch, RecordStore, RECORDS_KEY};
    use crate::errors::RecorderError;
    use crate::storage::{MemoryStorage, StorageBackend};
    use std::sync::Arc;

    fn record(id: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: id.to_string(),
            member_id: "m1".to_string(),
            service_id: "s1".to_string(),
            location: "main".to_string(),
            notes: None,
            timestamp: 1_000,
            synced: false,
            sync_error: None,
            retry_count: 0,
        }
    }

    #[test]
    fn append_keeps_insertion_order_and_persists() {
        let storage = MemoryStorage::default();
        let mut store = RecordStore::load(Arc::new(storage.clone()));
        store.append(record("a"));
        store.append(record("b"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].id, "a");
        assert_eq!(store.records()[1].id, "b");

        let blob = storage.stored(RECORDS_KEY).expect("persisted");
        assert!(blob.contains("\"a\"") && blob.contains("\"b\""));
    }

    #[test]
    fn hydration_fails_open_on_garbage_blob() {
        let storage = MemoryStorage::with_value(RECORDS_KEY, "not json");
        let store = RecordStore::load(Arc::new(storage));
        assert!(store.is_empty());
    }

    #[test]
    fn hydration_fails_open_on_read_error() {
        let storage = MemoryStorage::default();
        storage.set_fail_next(RecorderError::Storage("disk gone".to_string()));
        let store = RecordStore::load(Arc::new(storage));
        assert!(store.is_empty());
    }

    #[test]
    fn hydration_round_trips_persisted_records() {
        let storage = MemoryStorage::default();
        {
            let mut store = RecordStore::load(Arc::new(storage.clone()));
            store.append(record("a"));
        }
        let store = RecordStore::load(Arc::new(storage));
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].id, "a");
    }

    #[test]
    fn update_merges_patch_and_skips_unknown_ids() {
        let storage = MemoryStorage::default();
        let mut store = RecordStore::load(Arc::new(storage));
        store.append(record("a"));

        store.update("missing", RecordPatch::failed("nope"));
        assert!(store.records()[0].sync_error.is_none());

        store.update("a", RecordPatch::failed("Sync failed"));
        assert_eq!(
            store.records()[0].sync_error.as_deref(),
            Some("Sync failed")
        );
        assert!(!store.records()[0].synced);
    }

    #[test]
    fn synced_records_are_frozen() {
        let storage = MemoryStorage::default();
        let mut store = RecordStore::load(Arc::new(storage));
        store.append(record("a"));
        store.update("a", RecordPatch::accepted());
        assert!(store.records()[0].synced);

        store.update("a", RecordPatch::failed("late failure"));
        assert!(store.records()[0].sync_error.is_none());
        assert_eq!(store.records()[0].retry_count, 0);
    }

    #[test]
    fn unsynced_returns_snapshot_in_order() {
        let storage = MemoryStorage::default();
        let mut store = RecordStore::load(Arc::new(storage));
        store.append(record("a"));
        store.append(record("b"));
        store.update("a", RecordPatch::accepted());

        let unsynced = store.unsynced();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].id, "b");
    }

    #[test]
    fn clear_sync_errors_resets_unsynced_retry_counts_only() {
        let storage = MemoryStorage::default();
        let mut store = RecordStore::load(Arc::new(storage));
        store.append(record("a"));
        store.append(record("b"));
        store.update("a", RecordPatch::retried(2));
        store.update("a", RecordPatch::failed("Sync failed"));
        store.update("b", RecordPatch::accepted());

        store.clear_sync_errors();

        assert!(store.records()[0].sync_error.is_none());
        assert_eq!(store.records()[0].retry_count, 0);
        assert!(store.records()[1].synced);
    }

    #[test]
    fn write_failure_is_absorbed_and_memory_stays_authoritative() {
        let storage = MemoryStorage::default();
        let mut store = RecordStore::load(Arc::new(storage.clone()));
        storage.set_fail_next(RecorderError::Storage("disk full".to_string()));
        store.append(record("a"));

        assert_eq!(store.len(), 1);
        // Next mutation persists the full sequence again.
        store.append(record("b"));
        let blob = storage.stored(RECORDS_KEY).expect("repaired");
        assert!(blob.contains("\"a\"") && blob.contains("\"b\""));
    }
}
