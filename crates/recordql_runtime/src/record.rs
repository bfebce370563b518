//! Hydrated records.
//!
//! A [`Record`] is a cheap, clonable handle. Every clone points at the same
//! underlying state, so a later hydration of the same id is visible to every
//! holder. The state itself is an immutable [`RecordState`] that is swapped
//! wholesale on each write; readers always see a complete state.

use crate::error::{HydrateError, HydrateResult, RecordError};
use indexmap::{IndexMap, IndexSet};
use recordql_syntax::{FieldSelection, Selected};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Field values and bookkeeping of a record at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordState {
    fields: Map<String, Value>,
    persisted: Map<String, Value>,
    pending: IndexSet<String>,
    error: Option<RecordError>,
}

impl RecordState {
    /// Creates a state whose fields are all considered persisted.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            persisted: fields.clone(),
            fields,
            pending: IndexSet::new(),
            error: None,
        }
    }

    /// Current field values.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Gets a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Fields that were selected but not resolved yet.
    pub fn pending(&self) -> &IndexSet<String> {
        &self.pending
    }

    /// The error attached by the last hydration, if any.
    pub fn error(&self) -> Option<&RecordError> {
        self.error.as_ref()
    }

    /// Returns a copy with server values merged in.
    ///
    /// Fields in `raw` overwrite current and persisted values. An object
    /// with a sub-selection is merged key by key, so sub-fields outside the
    /// new selection are kept. Fields named in `selection` but missing from
    /// `raw` become pending unless a value is already known; nested pending
    /// fields are tracked by dotted path (`profile.avatar`). The error is
    /// replaced by `error`.
    pub(crate) fn merged(
        &self,
        raw: &Map<String, Value>,
        selection: &FieldSelection,
        error: Option<RecordError>,
    ) -> Self {
        let mut next = self.clone();
        for (name, value) in raw {
            let nested = subselection(Some(selection), name);
            let current = merge_value(next.fields.get(name), value, nested);
            let persisted = merge_value(next.persisted.get(name), value, nested);
            next.fields.insert(name.clone(), current);
            next.persisted.insert(name.clone(), persisted);
        }
        track_pending(&mut next.pending, "", raw, &next.fields, Some(selection));
        next.error = error;
        next
    }
}

fn subselection<'s>(selection: Option<&'s FieldSelection>, name: &str) -> Option<&'s FieldSelection> {
    selection
        .and_then(|selection| selection.get(name))
        .and_then(Selected::subselection)
}

fn merge_value(known: Option<&Value>, incoming: &Value, selection: Option<&FieldSelection>) -> Value {
    match (known, incoming) {
        (Some(Value::Object(known)), Value::Object(incoming)) if selection.is_some() => {
            let mut merged = known.clone();
            for (name, value) in incoming {
                let nested = subselection(selection, name);
                let value = merge_value(merged.get(name), value, nested);
                merged.insert(name.clone(), value);
            }
            Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}

fn track_pending(
    pending: &mut IndexSet<String>,
    prefix: &str,
    raw: &Map<String, Value>,
    known: &Map<String, Value>,
    selection: Option<&FieldSelection>,
) {
    let path = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        }
    };

    for (name, value) in raw {
        let field = path(name);
        pending.shift_remove(&field);
        match (value, subselection(selection, name), known.get(name)) {
            (Value::Object(inner), Some(nested), Some(Value::Object(known))) => {
                track_pending(pending, &field, inner, known, Some(nested));
            }
            _ => {
                let children = format!("{field}.");
                pending.retain(|pending| !pending.starts_with(&children));
            }
        }
    }

    let Some(selection) = selection else {
        return;
    };
    for name in selection.selected_fields() {
        if name.starts_with("...") || raw.contains_key(name) || known.contains_key(name) {
            continue;
        }
        pending.insert(path(name));
    }
}

/// A field whose current value differs from the last persisted one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub current: Option<Value>,
    pub previous: Option<Value>,
}

struct RecordInner {
    model: String,
    state: RwLock<Arc<RecordState>>,
}

/// A non-owning record handle, used by the store.
pub(crate) struct WeakRecord {
    inner: Weak<RecordInner>,
}

impl WeakRecord {
    pub(crate) fn upgrade(&self) -> Option<Record> {
        self.inner.upgrade().map(|inner| Record { inner })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

/// A handle to a hydrated record.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

impl Record {
    /// Creates a record of `model` from known field values.
    pub fn new(model: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self::from_state(model, RecordState::new(fields))
    }

    pub(crate) fn from_state(model: impl Into<String>, state: RecordState) -> Self {
        Self {
            inner: Arc::new(RecordInner {
                model: model.into(),
                state: RwLock::new(Arc::new(state)),
            }),
        }
    }

    /// The model this record belongs to.
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    /// The record id, normalized to a string.
    pub fn id(&self) -> Option<String> {
        self.snapshot().get("id").and_then(id_string)
    }

    pub(crate) fn downgrade(&self) -> WeakRecord {
        WeakRecord {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns true if both handles point at the same record.
    pub fn ptr_eq(a: &Record, b: &Record) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Returns the current state.
    ///
    /// The snapshot does not change when the record is updated later.
    pub fn snapshot(&self) -> Arc<RecordState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the state with one computed from the current state.
    ///
    /// The write lock is held while `update` runs, so concurrent updates
    /// apply one after the other and readers never see a partial write.
    pub(crate) fn replace(&self, update: impl FnOnce(&RecordState) -> RecordState) {
        let mut guard = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let next = update(&**guard);
        *guard = Arc::new(next);
    }

    /// Gets a field value.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.snapshot().get(name).cloned()
    }

    /// Gets a field value deserialized into `T`.
    ///
    /// Returns `Ok(None)` if the field is absent or null.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> HydrateResult<Option<T>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                HydrateError::Deserialize {
                    field: name.to_string(),
                    message: e.to_string(),
                }
            }),
        }
    }

    /// Reads the whole record as a typed view.
    pub fn view<T: DeserializeOwned>(&self) -> HydrateResult<T> {
        serde_json::from_value(self.to_json()).map_err(|e| HydrateError::Deserialize {
            field: self.inner.model.clone(),
            message: e.to_string(),
        })
    }

    /// Sets a field locally. The change is tracked until flushed or reverted.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        self.replace(|state| {
            let mut next = state.clone();
            next.pending.shift_remove(&name);
            next.fields.insert(name, value);
            next
        });
    }

    /// Returns true if the field is pending.
    pub fn is_pending(&self, name: &str) -> bool {
        self.snapshot().pending.contains(name)
    }

    /// Names of pending fields.
    pub fn pending_fields(&self) -> Vec<String> {
        self.snapshot().pending.iter().cloned().collect()
    }

    /// The error attached by the last hydration.
    pub fn error(&self) -> Option<RecordError> {
        self.snapshot().error.clone()
    }

    /// Returns true if no field is pending and no error is attached.
    pub fn is_fully_hydrated(&self) -> bool {
        let state = self.snapshot();
        state.pending.is_empty() && state.error.is_none()
    }

    /// Plain field mapping without pending or error bookkeeping.
    pub fn to_json(&self) -> Value {
        Value::Object(self.snapshot().fields.clone())
    }

    /// Returns true if `name` differs from its persisted value.
    pub fn changed(&self, name: &str) -> bool {
        let state = self.snapshot();
        state.fields.get(name) != state.persisted.get(name)
    }

    /// Returns true if any field differs from its persisted value.
    pub fn has_changes(&self) -> bool {
        !self.changes().is_empty()
    }

    /// All fields that differ from their persisted values.
    pub fn changes(&self) -> IndexMap<String, Change> {
        let state = self.snapshot();
        let mut changes = IndexMap::new();
        for (name, current) in &state.fields {
            let previous = state.persisted.get(name);
            if previous != Some(current) {
                changes.insert(
                    name.clone(),
                    Change {
                        current: Some(current.clone()),
                        previous: previous.cloned(),
                    },
                );
            }
        }
        for (name, previous) in &state.persisted {
            if !state.fields.contains_key(name) {
                changes.insert(
                    name.clone(),
                    Change {
                        current: None,
                        previous: Some(previous.clone()),
                    },
                );
            }
        }
        changes
    }

    /// Changed fields with their current values.
    pub fn to_changed_json(&self) -> Value {
        let changed = self
            .changes()
            .into_iter()
            .filter_map(|(name, change)| change.current.map(|v| (name, v)))
            .collect();
        Value::Object(changed)
    }

    /// Discards local changes.
    pub fn revert_changes(&self) {
        self.replace(|state| {
            let mut next = state.clone();
            next.fields = state.persisted.clone();
            next
        });
    }

    /// Accepts local changes as persisted.
    pub fn flush_changes(&self) {
        self.replace(|state| {
            let mut next = state.clone();
            next.persisted = state.fields.clone();
            next
        });
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.snapshot();
        f.debug_struct("Record")
            .field("model", &self.inner.model)
            .field("fields", &state.fields)
            .field("pending", &state.pending)
            .field("error", &state.error)
            .finish()
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.snapshot().fields.serialize(serializer)
    }
}

/// Normalizes an id value. Ids arrive as strings but numbers are accepted.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
