//! Identity map of hydrated records.
//!
//! The store holds weak references only. A record lives as long as somebody
//! outside the store holds a handle to it; dead entries are pruned lazily.

use crate::record::{Record, WeakRecord};
use rustc_hash::FxHashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Store key: the model and the record id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub model: String,
    pub id: String,
}

impl RecordKey {
    /// Creates a key.
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }
}

/// Per-client identity map from `(model, id)` to a live record.
#[derive(Default)]
pub struct RecordStore {
    records: RwLock<FxHashMap<RecordKey, WeakRecord>>,
}

impl RecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a live record.
    pub fn get(&self, model: &str, id: &str) -> Option<Record> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(&RecordKey::new(model, id))
            .and_then(WeakRecord::upgrade)
    }

    /// Registers a record under its model and id.
    ///
    /// Records without an id are not tracked. Returns false in that case.
    pub fn insert(&self, record: &Record) -> bool {
        let Some(id) = record.id() else {
            return false;
        };
        let key = RecordKey::new(record.model(), id);
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(key, record.downgrade());
        true
    }

    /// Returns the live record for `(model, id)`, or registers the one made
    /// by `create`. Lookup and registration happen under one write lock, so
    /// concurrent callers for the same key get the same record.
    pub fn get_or_insert_with(
        &self,
        model: &str,
        id: &str,
        create: impl FnOnce() -> Record,
    ) -> Record {
        let key = RecordKey::new(model, id);
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = records.get(&key).and_then(WeakRecord::upgrade) {
            return record;
        }
        let record = create();
        records.insert(key, record.downgrade());
        record
    }

    /// Removes a record from the identity map.
    pub fn remove(&self, model: &str, id: &str) -> Option<Record> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records
            .remove(&RecordKey::new(model, id))
            .and_then(|weak| weak.upgrade())
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.values().filter(|weak| weak.is_alive()).count()
    }

    /// Returns true if no live record is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops entries whose records are gone. Returns how many were dropped.
    pub fn prune(&self) -> usize {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|_, weak| weak.is_alive());
        let pruned = before - records.len();
        if pruned > 0 {
            debug!(pruned, remaining = records.len(), "pruned dead records");
        }
        pruned
    }

    /// Forgets every record. Existing handles keep working but are no longer
    /// updated by hydration.
    pub fn clear(&self) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore").field("live", &self.len()).finish()
    }
}
