//! Authoritative record set rebuilt from the envelope stream.

use serde::Serialize;
use std::collections::VecDeque;

use crate::envelope::Envelope;
use crate::types::{ConsoleLogRecord, RecordKind, RequestRecord, SocketUpdate};

/// What applying one envelope did to the set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Merged,
    Logged,
    /// Update for an id with no creation record; nothing changed
    UnknownRecord,
}

/// Network and socket records, most recent first, plus the console log.
///
/// Updates are merged in the order they are applied. There is no sequence
/// number, so two updates for one record applied out of production order
/// leave the last-applied value of each field.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordSet {
    records: VecDeque<RequestRecord>,
    console: Vec<ConsoleLogRecord>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, envelope: Envelope) -> Applied {
        match envelope {
            Envelope::Network { data } => {
                self.records.push_front(data);
                Applied::Inserted
            }
            Envelope::Console { data } => {
                self.console.push(data);
                Applied::Logged
            }
            Envelope::SocketUpdate { ws_id, data } => {
                if self.merge(&ws_id, data) {
                    Applied::Merged
                } else {
                    Applied::UnknownRecord
                }
            }
        }
    }

    /// Merge a partial update into the socket record with id `id`. Returns
    /// false, leaving the set untouched, when no such socket record exists.
    /// Request records are final once inserted and never take updates.
    pub fn merge(&mut self, id: &str, update: SocketUpdate) -> bool {
        let Some(record) = self
            .records
            .iter_mut()
            .find(|record| record.id == id && record.kind == RecordKind::Socket)
        else {
            return false;
        };

        if let Some(state) = update.state {
            record.socket_state = Some(state);
        }
        if let Some(status) = update.status {
            record.status = status;
        }
        if let Some(elapsed_ms) = update.elapsed_ms {
            record.elapsed_ms = elapsed_ms;
        }
        if let Some(message) = update.message {
            record.messages.get_or_insert_with(Vec::new).push(message);
        }
        if let Some(error) = update.error {
            record.summary = Some(format!("Error: {}", error));
        }
        if let Some(reason) = update.close_reason {
            record.summary = Some(format!("Closed: {}", reason));
        }
        true
    }

    pub fn get(&self, id: &str) -> Option<&RequestRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    /// Records, most recent first
    pub fn records(&self) -> impl Iterator<Item = &RequestRecord> {
        self.records.iter()
    }

    pub fn console_logs(&self) -> &[ConsoleLogRecord] {
        &self.console
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.console.clear();
    }
}
