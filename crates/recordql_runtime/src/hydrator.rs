//! Response hydration.
//!
//! The hydrator turns raw response objects into [`Record`] handles. When a
//! record with the same model and id is already alive in the store, the new
//! values are merged into it instead of creating a second record, so every
//! holder of the old handle sees the update.
//!
//! Merging follows these rules:
//! - fields present in the payload overwrite known values
//! - nested objects are merged key by key along the sub-selection
//! - known fields missing from the payload are kept
//! - selected fields that are neither known nor in the payload are pending
//! - an `errors` array reported with the record is attached to it

use crate::error::{json_kind, HydrateError, HydrateResult, RecordError};
use crate::list::{PageInfo, RecordList};
use crate::record::{id_string, Record, RecordState};
use crate::store::RecordStore;
use recordql_syntax::FieldSelection;
use serde_json::{Map, Value};
use tracing::debug;

/// The hydrated form of a mutation result object.
#[derive(Debug, Clone, Default)]
pub struct HydratedResult {
    /// The `success` flag. Defaults to true when not selected.
    pub success: bool,
    /// Records returned under the model selection field.
    pub records: Vec<Record>,
    /// Raw `result`/`results` value for actions with a return type.
    pub result: Option<Value>,
    /// Errors reported alongside the result.
    pub error: Option<RecordError>,
}

impl HydratedResult {
    /// The first returned record.
    pub fn record(&self) -> Option<&Record> {
        self.records.first()
    }
}

/// Hydrates response data into records backed by a store.
#[derive(Debug, Clone, Copy)]
pub struct Hydrator<'a> {
    store: &'a RecordStore,
}

impl<'a> Hydrator<'a> {
    /// Creates a hydrator over `store`.
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    /// Hydrates one record object.
    ///
    /// `existing` is reused when its id matches the payload's. Otherwise the
    /// store is consulted, and a new record is created as a last resort.
    pub fn hydrate(
        &self,
        existing: Option<&Record>,
        model: &str,
        raw: &Value,
        selection: &FieldSelection,
    ) -> HydrateResult<Record> {
        let map = as_object(raw, model)?;
        self.hydrate_object(existing, model, map, selection, None)
    }

    /// Hydrates a list of record objects. `null` yields an empty list.
    pub fn hydrate_array(
        &self,
        model: &str,
        raw: &Value,
        selection: &FieldSelection,
    ) -> HydrateResult<Vec<Record>> {
        match raw {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .iter()
                .map(|item| self.hydrate(None, model, item, selection))
                .collect(),
            other => Err(HydrateError::NotAList {
                path: model.to_string(),
                found: json_kind(other),
            }),
        }
    }

    /// Hydrates a connection (`edges { node }`, `pageInfo`, `totalCount`).
    pub fn hydrate_connection(
        &self,
        model: &str,
        raw: &Value,
        node_selection: &FieldSelection,
    ) -> HydrateResult<RecordList> {
        let connection = as_object(raw, model)?;

        let mut nodes = Vec::new();
        match connection.get("edges") {
            None | Some(Value::Null) => {}
            Some(Value::Array(edges)) => {
                for edge in edges {
                    let edge = as_object(edge, "edges")?;
                    if let Some(node) = edge.get("node") {
                        nodes.push(self.hydrate(None, model, node, node_selection)?);
                    }
                }
            }
            Some(other) => {
                return Err(HydrateError::NotAList {
                    path: format!("{model}.edges"),
                    found: json_kind(other),
                })
            }
        }

        let page_info = match connection.get("pageInfo") {
            None | Some(Value::Null) => PageInfo::default(),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                HydrateError::Deserialize {
                    field: "pageInfo".into(),
                    message: e.to_string(),
                }
            })?,
        };
        let total_count = connection.get("totalCount").and_then(Value::as_u64);

        debug!(model, count = nodes.len(), "hydrated connection");
        Ok(RecordList::new(nodes, page_info).with_total_count(total_count))
    }

    /// Hydrates a mutation result object.
    ///
    /// Reads `success`, `errors` and `result`/`results`. Records found under
    /// `record_field` (an object or a list of objects) are hydrated and carry
    /// the reported error, if any.
    pub fn hydrate_result(
        &self,
        model: &str,
        raw: &Value,
        record_field: Option<&str>,
        selection: &FieldSelection,
    ) -> HydrateResult<HydratedResult> {
        let result = as_object(raw, model)?;

        let error = match result.get("errors") {
            None | Some(Value::Null) => None,
            Some(Value::Array(errors)) => RecordError::from_payload(errors)?,
            Some(other) => {
                return Err(HydrateError::NotAList {
                    path: "errors".into(),
                    found: json_kind(other),
                })
            }
        };
        let success = result
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(error.is_none());

        let mut records = Vec::new();
        if let Some(field) = record_field {
            match result.get(field) {
                None | Some(Value::Null) => {}
                Some(Value::Object(map)) => {
                    records.push(self.hydrate_object(None, model, map, selection, error.clone())?);
                }
                Some(Value::Array(items)) => {
                    for item in items {
                        let map = as_object(item, field)?;
                        records.push(self.hydrate_object(
                            None,
                            model,
                            map,
                            selection,
                            error.clone(),
                        )?);
                    }
                }
                Some(other) => {
                    return Err(HydrateError::NotAnObject {
                        path: field.to_string(),
                        found: json_kind(other),
                    })
                }
            }
        }

        let returned = result
            .get("result")
            .or_else(|| result.get("results"))
            .cloned();

        Ok(HydratedResult {
            success,
            records,
            result: returned,
            error,
        })
    }

    fn hydrate_object(
        &self,
        existing: Option<&Record>,
        model: &str,
        raw: &Map<String, Value>,
        selection: &FieldSelection,
        error: Option<RecordError>,
    ) -> HydrateResult<Record> {
        let raw_id = raw.get("id").and_then(id_string);

        let record = match (existing, raw_id.as_deref()) {
            (Some(record), id) if id.is_none() || record.id().as_deref() == id => {
                let record = record.clone();
                self.store.insert(&record);
                record
            }
            (_, Some(id)) => self
                .store
                .get_or_insert_with(model, id, || Record::from_state(model, RecordState::default())),
            (_, None) => Record::from_state(model, RecordState::default()),
        };
        record.replace(|state| state.merged(raw, selection, error));
        debug!(model, id = ?raw_id, "hydrated record");
        Ok(record)
    }
}

fn as_object<'v>(value: &'v Value, path: &str) -> HydrateResult<&'v Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(HydrateError::NotAnObject {
            path: path.to_string(),
            found: json_kind(other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn selection(fields: &[&str]) -> FieldSelection {
        fields.iter().fold(FieldSelection::new(), |s, f| s.field(*f))
    }

    #[test]
    fn test_fresh_hydration_marks_missing_fields_pending() {
        let store = RecordStore::new();
        let hydrator = Hydrator::new(&store);

        let record = hydrator
            .hydrate(
                None,
                "user",
                &json!({ "id": "1", "name": "Bob", "bio": null }),
                &selection(&["id", "name", "bio", "avatar"]),
            )
            .unwrap();

        assert_eq!(record.get("bio"), Some(Value::Null));
        assert!(!record.is_pending("bio"));
        assert!(record.is_pending("avatar"));
        assert_eq!(record.to_json(), json!({ "id": "1", "name": "Bob", "bio": null }));
    }

    #[test]
    fn test_rehydration_merges_into_same_record() {
        let store = RecordStore::new();
        let hydrator = Hydrator::new(&store);

        let first = hydrator
            .hydrate(
                None,
                "user",
                &json!({ "id": "1", "name": "Bob", "email": "bob@x.io" }),
                &selection(&["id", "name", "email", "avatar"]),
            )
            .unwrap();
        assert!(first.is_pending("avatar"));

        let second = hydrator
            .hydrate(
                None,
                "user",
                &json!({ "id": "1", "name": "Robert", "avatar": "a.png" }),
                &selection(&["id", "name", "avatar"]),
            )
            .unwrap();

        assert!(Record::ptr_eq(&first, &second));
        assert_eq!(
            first.to_json(),
            json!({ "id": "1", "name": "Robert", "email": "bob@x.io", "avatar": "a.png" })
        );
        assert!(first.pending_fields().is_empty());
    }

    #[test]
    fn test_explicit_existing_record() {
        let store = RecordStore::new();
        let hydrator = Hydrator::new(&store);
        let existing = Record::new("user", Map::new());

        let record = hydrator
            .hydrate(Some(&existing), "user", &json!({ "name": "Bob" }), &selection(&["name"]))
            .unwrap();
        assert!(Record::ptr_eq(&existing, &record));

        let other = hydrator
            .hydrate(Some(&existing), "user", &json!({ "id": "2" }), &selection(&["id"]))
            .unwrap();
        assert!(!Record::ptr_eq(&existing, &other));
    }

    #[test]
    fn test_models_do_not_share_ids() {
        let store = RecordStore::new();
        let hydrator = Hydrator::new(&store);
        let sel = selection(&["id"]);

        let user = hydrator.hydrate(None, "user", &json!({ "id": "1" }), &sel).unwrap();
        let post = hydrator.hydrate(None, "post", &json!({ "id": "1" }), &sel).unwrap();
        assert!(!Record::ptr_eq(&user, &post));
    }

    #[test]
    fn test_connection() {
        let store = RecordStore::new();
        let hydrator = Hydrator::new(&store);

        let list = hydrator
            .hydrate_connection(
                "user",
                &json!({
                    "edges": [
                        { "cursor": "a", "node": { "id": "1", "name": "Bob" } },
                        { "cursor": "b", "node": { "id": "2", "name": "Alice" } }
                    ],
                    "pageInfo": {
                        "hasNextPage": true,
                        "hasPreviousPage": false,
                        "startCursor": "a",
                        "endCursor": "b"
                    },
                    "totalCount": 12
                }),
                &selection(&["id", "name"]),
            )
            .unwrap();

        assert_eq!(list.len(), 2);
        assert!(list.has_next_page());
        assert_eq!(list.page_info().end_cursor.as_deref(), Some("b"));
        assert_eq!(list.total_count(), Some(12));
        assert!(Record::ptr_eq(
            list.get("2").unwrap(),
            &store.get("user", "2").unwrap()
        ));
    }

    #[test]
    fn test_result_with_errors() {
        let store = RecordStore::new();
        let hydrator = Hydrator::new(&store);

        let hydrated = hydrator
            .hydrate_result(
                "user",
                &json!({
                    "success": false,
                    "errors": [{
                        "code": "GGT_INVALID_RECORD",
                        "message": "invalid",
                        "validationErrors": [{ "apiIdentifier": "email", "message": "is taken" }]
                    }],
                    "user": { "id": "1", "name": "Bob" }
                }),
                Some("user"),
                &selection(&["id", "name", "email"]),
            )
            .unwrap();

        assert!(!hydrated.success);
        let record = hydrated.record().unwrap();
        assert_eq!(record.error().unwrap().invalid_fields(), ["email"]);
        assert!(!record.is_fully_hydrated());
    }

    #[test]
    fn test_result_without_errors() {
        let store = RecordStore::new();
        let hydrator = Hydrator::new(&store);

        let hydrated = hydrator
            .hydrate_result(
                "user",
                &json!({ "success": true, "errors": null, "users": [{ "id": "1" }, { "id": "2" }] }),
                Some("users"),
                &selection(&["id"]),
            )
            .unwrap();

        assert!(hydrated.success);
        assert!(hydrated.error.is_none());
        assert_eq!(hydrated.records.len(), 2);
        assert!(hydrated.records.iter().all(Record::is_fully_hydrated));
    }

    #[test]
    fn test_shape_errors() {
        let store = RecordStore::new();
        let hydrator = Hydrator::new(&store);
        let sel = selection(&["id"]);

        assert_eq!(
            hydrator.hydrate(None, "user", &json!("1"), &sel).unwrap_err(),
            HydrateError::NotAnObject {
                path: "user".into(),
                found: "a string"
            }
        );
        assert!(hydrator.hydrate_array("user", &json!({}), &sel).is_err());
        assert!(hydrator.hydrate_array("user", &Value::Null, &sel).unwrap().is_empty());
        assert!(hydrator
            .hydrate_connection("user", &json!({ "edges": 3 }), &sel)
            .is_err());
    }
}
