use crate::logging::append_run_log;
use crate::record_id::{compute_record_id, RecordIdentity};
use crate::record_store::{AttendanceRecord, NewRecord, RecordPatch, RecordStore};
use crate::runtime::{unix_millis, Clock, Notifier};
use crate::sync_engine::SyncEngine;
use crate::types::{Notification, SyncStatus};
use serde_json::json;
use std::sync::Arc;

// Public entry point: owns the store and the engine, and serializes
// every mutation through one execution context.
pub struct Recorder {
    store: RecordStore,
    engine: SyncEngine,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl Recorder {
    pub fn new(
        store: RecordStore,
        engine: SyncEngine,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let mut recorder = Self {
            store,
            engine,
            clock,
            notifier,
        };
        recorder.engine.refresh_pending(&recorder.store);
        recorder
    }

    // The local append is synchronous and unconditional, so this cannot
    // fail toward the caller; a later sync failure is absorbed into the
    // sync status.
    pub fn add_record(&mut self, draft: NewRecord) -> AttendanceRecord {
        let timestamp = unix_millis(self.clock.now());
        let id = compute_record_id(RecordIdentity {
            member_id: draft.member_id.clone(),
            service_id: draft.service_id.clone(),
            location: draft.location.clone(),
            timestamp_ms: timestamp,
            seq: self.store.next_seq(),
        });
        let record = AttendanceRecord {
            id,
            member_id: draft.member_id,
            service_id: draft.service_id,
            location: draft.location,
            notes: draft.notes,
            timestamp,
            synced: false,
            sync_error: None,
            retry_count: 0,
        };
        self.store.append(record.clone());
        self.engine.refresh_pending(&self.store);

        let notification = if self.engine.is_online() {
            Notification::Syncing
        } else {
            Notification::Queued
        };
        self.notifier.notify(notification);

        if self.engine.is_online() {
            let batch = self.eligible_batch();
            self.engine.sync_batch(&mut self.store, batch);
        }
        record
    }

    // The only path that advances retry accounting. Eligibility is
    // judged on the pre-retry count; the increment is persisted before
    // the push so the remote sees the attempt number.
    pub fn retry_sync(&mut self) {
        let mut batch = self.eligible_batch();
        if batch.is_empty() {
            return;
        }
        for record in &mut batch {
            record.retry_count += 1;
            self.store
                .update(&record.id, RecordPatch::retried(record.retry_count));
        }
        append_run_log("info", "sync.manual_retry", json!({ "batch": batch.len() }));
        self.engine.sync_batch(&mut self.store, batch);
    }

    pub fn clear_sync_errors(&mut self) {
        self.store.clear_sync_errors();
        self.engine.clear_error();
        self.engine.refresh_pending(&self.store);
    }

    pub fn set_connectivity(&mut self, online: bool) {
        self.engine.set_connectivity(&mut self.store, online);
    }

    pub fn tick(&mut self) {
        self.engine.tick(&mut self.store);
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        self.store.records()
    }

    pub fn sync_status(&self) -> &SyncStatus {
        self.engine.status()
    }

    pub fn next_sync_at(&self) -> Option<std::time::SystemTime> {
        self.engine.next_sync_at()
    }

    fn eligible_batch(&self) -> Vec<AttendanceRecord> {
        self.store
            .unsynced()
            .into_iter()
            .filter(|record| self.engine.should_retry(record))
            .collect()
    }
}
