//! In-memory entity snapshots shared between the reader and the controller.
//!
//! Each entity type has its own lock. A fetch and a name-based control on the
//! same type run one after the other, so a control always resolves names
//! against a snapshot no older than the last completed fetch. Different types
//! never contend.

use crate::error::Result;
use crate::response::Document;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// The latest copy of one entity type's collection
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub document: Document,
    /// When the document was stored or last patched
    pub updated_at: DateTime<Utc>,
}

impl SnapshotEntry {
    pub fn new(document: Document) -> Self {
        SnapshotEntry {
            document,
            updated_at: Utc::now(),
        }
    }
}

type Slot = Arc<Mutex<Option<SnapshotEntry>>>;

/// Snapshot store keyed by entity type, one lock per type
#[derive(Debug, Default)]
pub struct SnapshotStore {
    entries: DashMap<String, Slot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, entity_type: &str) -> Slot {
        // Clone the Arc out so the map shard is released before locking
        self.entries
            .entry(entity_type.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Run `f` with exclusive access to the entry of `entity_type`.
    /// Other callers touching the same type wait until `f` returns.
    pub fn with_entry<R>(
        &self,
        entity_type: &str,
        f: impl FnOnce(&mut Option<SnapshotEntry>) -> R,
    ) -> R {
        let slot = self.slot(entity_type);
        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut entry)
    }

    /// Copy of the entry of `entity_type`
    pub fn entry(&self, entity_type: &str) -> Option<SnapshotEntry> {
        let slot = self.entries.get(entity_type).map(|s| Arc::clone(s.value()))?;
        let entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        entry.clone()
    }

    /// Copy of the document stored for `entity_type`
    pub fn get(&self, entity_type: &str) -> Option<Document> {
        self.entry(entity_type).map(|e| e.document)
    }

    /// Replace the entry of `entity_type` wholesale
    pub fn insert(&self, entity_type: &str, document: Document) {
        self.with_entry(entity_type, |entry| *entry = Some(SnapshotEntry::new(document)));
    }

    /// Drop the entry of `entity_type`, returning its document
    pub fn clear(&self, entity_type: &str) -> Option<Document> {
        self.with_entry(entity_type, |entry| entry.take().map(|e| e.document))
    }

    /// Entity types that currently hold a snapshot, in name order
    pub fn entity_types(&self) -> Vec<String> {
        let slots: Vec<(String, Slot)> = self
            .entries
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();

        let mut types: Vec<String> = slots
            .into_iter()
            .filter(|(_, slot)| slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .map(|(entity_type, _)| entity_type)
            .collect();
        types.sort();
        types
    }

    /// Capture every stored document into a snapshot file
    pub fn to_file(&self) -> SnapshotFile {
        let data = self
            .entity_types()
            .into_iter()
            .filter_map(|t| self.get(&t).map(|doc| (t, doc)))
            .collect();

        SnapshotFile {
            creation_time: Utc::now(),
            data,
        }
    }

    /// Replace the stored documents with the contents of a snapshot file.
    /// Types absent from the file are cleared.
    pub fn restore(&self, file: SnapshotFile) {
        for entity_type in self.entity_types() {
            if !file.data.contains_key(&entity_type) {
                self.clear(&entity_type);
            }
        }
        for (entity_type, document) in file.data {
            self.insert(&entity_type, document);
        }
    }
}

/// Fold a PATCH response into an entry. A single updated resource replaces its
/// counterpart in a stored collection, or joins it when the collection has no
/// member with that id, so the other members stay addressable by name.
/// Anything else replaces the entry.
pub(crate) fn apply_update(entry: &mut Option<SnapshotEntry>, response: &Document) {
    if let Some(current) = entry.as_mut() {
        if response.data.is_object() && current.document.upsert_resource(&response.data) {
            current.updated_at = Utc::now();
            return;
        }
    }
    *entry = Some(SnapshotEntry::new(response.clone()));
}

/// On-disk form of a snapshot store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub creation_time: DateTime<Utc>,
    /// Raw documents keyed by entity type
    pub data: BTreeMap<String, Document>,
}

impl SnapshotFile {
    /// Write the whole snapshot as pretty-printed JSON, replacing any existing file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            warn!(path = %path.display(), "snapshot file already exists, overwriting");
        }

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self).map_err(std::io::Error::from)?;
        writer.flush()?;

        debug!(path = %path.display(), entity_types = self.data.len(), "saved snapshot");
        Ok(())
    }

    /// Read a whole snapshot file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }
}
