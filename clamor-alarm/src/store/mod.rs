//! The alarm collection and its persistence.
//!
//! [`AlarmStore`] is the single owner of every [`AlarmRecord`]. Mutations
//! apply to the in-memory copy; callers decide when to [`save`]. The
//! persisted form is a JSON array in one blob slot, rewritten whole on
//! every save.
//!
//! [`save`]: AlarmStore::save

mod blob;

use std::io;

use time::OffsetDateTime;

use crate::alarm::{AlarmDraft, AlarmId, AlarmRecord};
use crate::tracing::prelude::*;

pub use blob::{BlobStore, FileBlobStore, MemoryBlobStore};

/// Blob slot holding the alarm list.
pub const ALARMS_SLOT: &str = "alarms";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Alarm records ordered by scheduled instant.
pub struct AlarmStore {
    blob: Box<dyn BlobStore>,
    records: Vec<AlarmRecord>,
}

impl AlarmStore {
    /// An empty store over `blob`. Call [`load`](Self::load) to read what
    /// was persisted.
    pub fn new(blob: impl BlobStore + 'static) -> Self {
        Self {
            blob: Box::new(blob),
            records: Vec::new(),
        }
    }

    /// Replace the in-memory records with the persisted ones.
    ///
    /// A missing, unreadable or corrupt slot yields an empty collection.
    pub fn load(&mut self) -> &[AlarmRecord] {
        self.records = match self.blob.read(ALARMS_SLOT) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<AlarmRecord>>(&raw) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "Stored alarms are corrupt, starting with none");
                    Vec::new()
                }
            },
            Ok(None) => {
                debug!("No stored alarms yet");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Could not read stored alarms, starting with none");
                Vec::new()
            }
        };
        self.sort();

        info!(count = self.records.len(), "Alarms loaded");
        &self.records
    }

    /// Persist the full current set, overwriting whatever was stored.
    pub fn save(&mut self) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(&self.records)?;
        self.blob.write(ALARMS_SLOT, &encoded)?;
        trace!(count = self.records.len(), "Alarms saved");
        Ok(())
    }

    pub fn records(&self) -> &[AlarmRecord] {
        &self.records
    }

    pub fn get(&self, id: &AlarmId) -> Option<&AlarmRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    /// Insert `record`, or replace the record with the same id.
    pub fn upsert(&mut self, record: AlarmRecord) {
        match self.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
        self.sort();
    }

    pub fn remove(&mut self, id: &AlarmId) -> Option<AlarmRecord> {
        let index = self.records.iter().position(|r| &r.id == id)?;
        Some(self.records.remove(index))
    }

    /// Add a new alarm created at `now`.
    ///
    /// The id comes from the creation time in milliseconds, moved forward
    /// until it is unused so two alarms created in the same millisecond
    /// still get distinct ids.
    pub fn create(&mut self, draft: AlarmDraft, now: OffsetDateTime) -> AlarmRecord {
        let mut millis = now.unix_timestamp_nanos() / 1_000_000;
        let id = loop {
            let candidate = AlarmId::from_creation_millis(millis);
            if self.get(&candidate).is_none() {
                break candidate;
            }
            millis += 1;
        };

        let record = AlarmRecord::new(id, draft);
        self.upsert(record.clone());
        record
    }

    /// Change label and time. Re-arms the alarm.
    pub fn edit(&mut self, id: &AlarmId, draft: AlarmDraft) -> Option<AlarmRecord> {
        let record = self.get_mut(id)?;
        record.apply(draft);
        let updated = record.clone();
        self.sort();
        Some(updated)
    }

    /// Enable or disable. Enabling re-arms the alarm.
    pub fn set_enabled(&mut self, id: &AlarmId, enabled: bool) -> Option<AlarmRecord> {
        let record = self.get_mut(id)?;
        record.set_enabled(enabled);
        Some(record.clone())
    }

    /// Record that the alarm has fired.
    pub fn mark_triggered(&mut self, id: &AlarmId) -> Option<AlarmRecord> {
        let record = self.get_mut(id)?;
        record.triggered = true;
        Some(record.clone())
    }

    /// Disable without re-arming, as done after a successful silence.
    /// Returns false if the alarm no longer exists.
    pub fn disable(&mut self, id: &AlarmId) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.enabled = false;
                true
            }
            None => false,
        }
    }

    fn get_mut(&mut self, id: &AlarmId) -> Option<&mut AlarmRecord> {
        self.records.iter_mut().find(|r| &r.id == id)
    }

    fn sort(&mut self) {
        self.records.sort_by_key(|r| r.time);
    }
}
