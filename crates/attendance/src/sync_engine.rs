use crate::logging::append_run_log;
use crate::record_store::{AttendanceRecord, RecordPatch, RecordStore};
use crate::remote::{failure_message, RemoteEndpoint};
use crate::runtime::{unix_millis, Clock};
use crate::types::SyncStatus;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

// One cycle runs Idle, Syncing, then back to Idle (with the failure
// message kept on error); the engine never reaches a terminal state.
// Connectivity is a cached boolean seeded at construction and updated
// only through explicit transition signals, never polled. The periodic
// trigger is a deadline against the injected clock; the hosting loop
// drives it via `tick`.
pub struct SyncEngine {
    remote: Arc<dyn RemoteEndpoint>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    max_retries: u32,
    online: bool,
    next_sync_at: Option<SystemTime>,
    status: SyncStatus,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteEndpoint>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        max_retries: u32,
        initially_online: bool,
    ) -> Self {
        let mut engine = Self {
            remote,
            clock,
            interval,
            max_retries,
            online: initially_online,
            next_sync_at: None,
            status: SyncStatus::default(),
        };
        engine.reschedule();
        engine
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn next_sync_at(&self) -> Option<SystemTime> {
        self.next_sync_at
    }

    // Unsynced and still under the manual-retry cap.
    pub fn should_retry(&self, record: &AttendanceRecord) -> bool {
        !record.synced && record.retry_count < self.max_retries
    }

    // A transition reschedules the periodic deadline either way. Going
    // online immediately attempts a sync over the current unsynced set;
    // going offline records the condition without touching the network.
    pub fn set_connectivity(&mut self, store: &mut RecordStore, online: bool) {
        if online == self.online {
            return;
        }
        self.online = online;
        self.reschedule();
        self.status.pending_records = store.unsynced().len();
        append_run_log(
            "info",
            "sync.connectivity",
            json!({ "online": online, "pending": self.status.pending_records }),
        );
        if online {
            let batch = store.unsynced();
            self.sync_batch(store, batch);
        } else {
            self.status.error = Some("offline".to_string());
        }
    }

    // Rescheduling happens on every fire regardless of outcome; the
    // attempt itself is skipped while offline.
    pub fn tick(&mut self, store: &mut RecordStore) {
        let now = self.clock.now();
        let due = match self.next_sync_at {
            Some(deadline) => now >= deadline,
            None => false,
        };
        if !due {
            return;
        }
        self.reschedule();
        if !self.online {
            return;
        }
        let batch = store.unsynced();
        self.sync_batch(store, batch);
    }

    // An empty batch is a no-op: status is left untouched and the
    // network is never called.
    pub fn sync_batch(&mut self, store: &mut RecordStore, batch: Vec<AttendanceRecord>) {
        if batch.is_empty() {
            return;
        }
        self.status.is_syncing = true;
        self.status.error = None;
        self.status.pending_records = store.unsynced().len();
        append_run_log("info", "sync.attempt", json!({ "batch": batch.len() }));

        match self.remote.push_batch(&batch) {
            Ok(()) => {
                for record in &batch {
                    store.update(&record.id, RecordPatch::accepted());
                }
                self.status.is_syncing = false;
                self.status.pending_records = 0;
                self.status.last_sync_time = Some(unix_millis(self.clock.now()));
                append_run_log("info", "sync.success", json!({ "batch": batch.len() }));
            }
            Err(error) => {
                let message = failure_message(&error);
                for record in &batch {
                    store.update(&record.id, RecordPatch::failed(message.clone()));
                }
                self.status.is_syncing = false;
                self.status.error = Some(message.clone());
                append_run_log(
                    "warn",
                    "sync.failed",
                    json!({ "batch": batch.len(), "error": message }),
                );
            }
        }
    }

    pub fn refresh_pending(&mut self, store: &RecordStore) {
        self.status.pending_records = store.unsynced().len();
    }

    pub fn clear_error(&mut self) {
        self.status.error = None;
    }

    fn reschedule(&mut self) {
        self.next_sync_at = Some(self.clock.now() + self.interval);
    }
}
