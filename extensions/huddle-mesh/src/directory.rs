//! The node's view of who is in the call. Records are kept in insertion order
//! and every mutation is announced to the presentation layer.

use huddle::call::{
    media::MediaStream, CallEventKind, ParticipantRecord, PeerId, LOCAL_ID, UNKNOWN_ORIGIN,
};
use indexmap::IndexMap;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    Unchanged,
    /// the record claimed the local key
    Refused,
}

pub struct Directory {
    records: IndexMap<PeerId, ParticipantRecord>,
    ui_event_ch: broadcast::Sender<CallEventKind>,
}

impl Directory {
    pub fn new(ui_event_ch: broadcast::Sender<CallEventKind>) -> Self {
        Self {
            records: IndexMap::new(),
            ui_event_ch,
        }
    }

    fn emit(&self, event: CallEventKind) {
        // no subscribers is fine
        let _ = self.ui_event_ch.send(event);
    }

    fn presence_changed(&self) {
        self.emit(CallEventKind::PresenceChanged {
            count: self.records.len(),
            ids: self.records.keys().cloned().collect(),
            origins: self.origins(),
        });
    }

    /// Installs the node's own record under the reserved local key, always
    /// first in order.
    pub fn set_local(&mut self, mut record: ParticipantRecord) {
        record.id = PeerId::from(LOCAL_ID);
        let inserted = self.records.shift_remove(&record.id).is_none();
        self.records.shift_insert(0, record.id.clone(), record.clone());
        if inserted {
            self.emit(CallEventKind::ParticipantAdded { record });
        } else {
            self.emit(CallEventKind::ParticipantUpdated { id: record.id });
        }
        self.presence_changed();
    }

    pub fn update_local<F: FnOnce(&mut ParticipantRecord)>(&mut self, f: F) {
        let id = PeerId::from(LOCAL_ID);
        if let Some(record) = self.records.get_mut(&id) {
            f(record);
            self.emit(CallEventKind::ParticipantUpdated { id });
            self.presence_changed();
        }
    }

    /// Inserts or refreshes a remote record. A known media stream is kept
    /// when the incoming record carries none.
    pub fn upsert(&mut self, mut record: ParticipantRecord) -> Upsert {
        if record.id.is_reserved() {
            log::warn!("refusing remote record under the local key");
            return Upsert::Refused;
        }
        let outcome = match self.records.get_mut(&record.id) {
            Some(existing) => {
                if record.media_stream.is_none() {
                    record.media_stream = existing.media_stream.clone();
                }
                record.muted = existing.muted;
                record.video_on = existing.video_on;
                if *existing == record {
                    Upsert::Unchanged
                } else {
                    *existing = record.clone();
                    Upsert::Updated
                }
            }
            None => {
                self.records.insert(record.id.clone(), record.clone());
                Upsert::Inserted
            }
        };
        match outcome {
            Upsert::Inserted => self.emit(CallEventKind::ParticipantAdded { record }),
            Upsert::Updated => self.emit(CallEventKind::ParticipantUpdated { id: record.id }),
            Upsert::Unchanged | Upsert::Refused => return outcome,
        }
        self.presence_changed();
        outcome
    }

    /// Attaches a remote stream, creating a placeholder record for a
    /// participant not heard of yet.
    pub fn attach_stream(&mut self, id: &PeerId, stream: MediaStream, is_host: bool) -> Upsert {
        match self.records.get(id) {
            Some(existing) => {
                let mut record = existing.clone();
                record.media_stream = Some(stream);
                self.upsert(record)
            }
            None => {
                self.upsert(ParticipantRecord::placeholder(id.clone(), stream).with_host(is_host))
            }
        }
    }

    pub fn remove(&mut self, id: &PeerId) -> Option<ParticipantRecord> {
        let record = self.records.shift_remove(id)?;
        self.emit(CallEventKind::ParticipantRemoved { id: id.clone() });
        self.presence_changed();
        Some(record)
    }

    pub fn get(&self, id: &PeerId) -> Option<&ParticipantRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.records.contains_key(id)
    }

    pub fn all(&self) -> Vec<ParticipantRecord> {
        self.records.values().cloned().collect()
    }

    /// Every record other than the local one.
    pub fn remotes(&self) -> impl Iterator<Item = &ParticipantRecord> {
        self.records.values().filter(|r| !r.is_local())
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct known origins, in first-seen order.
    pub fn origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = Vec::new();
        for origin in self.records.values().map(|r| &r.origin_info) {
            if origin.is_empty() || origin == UNKNOWN_ORIGIN || origins.contains(origin) {
                continue;
            }
            origins.push(origin.clone());
        }
        origins
    }

    /// Drops every record without notifying.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}
