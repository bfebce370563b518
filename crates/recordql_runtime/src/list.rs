//! Paginated record lists.

use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cursor-based page info, as returned in a connection's `pageInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub has_previous_page: bool,
    #[serde(default)]
    pub start_cursor: Option<String>,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

/// An ordered list of records, unique by id.
#[derive(Debug, Clone, Default)]
pub struct RecordList {
    records: Vec<Record>,
    page_info: PageInfo,
    total_count: Option<u64>,
}

impl RecordList {
    /// Creates a list. Records sharing an id collapse to the last one, kept
    /// at the position of the first.
    pub fn new(records: impl IntoIterator<Item = Record>, page_info: PageInfo) -> Self {
        let mut list = Self {
            records: Vec::new(),
            page_info,
            total_count: None,
        };
        for record in records {
            list.add_or_update(record);
        }
        list
    }

    /// Sets the total count hint.
    #[must_use]
    pub fn with_total_count(mut self, total_count: Option<u64>) -> Self {
        self.total_count = total_count;
        self
    }

    /// Pagination metadata.
    pub fn page_info(&self) -> &PageInfo {
        &self.page_info
    }

    /// Total number of matching records, when the backend reported it.
    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    pub fn has_next_page(&self) -> bool {
        self.page_info.has_next_page
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_info.has_previous_page
    }

    /// The records in order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    pub fn last(&self) -> Option<&Record> {
        self.records.last()
    }

    /// Finds a record by id.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.position(id).map(|index| &self.records[index])
    }

    /// Index of the record with the given id.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.id().as_deref() == Some(id))
    }

    /// Replaces the record with the same id in place, or appends it.
    ///
    /// Returns the index the record ended up at. Records without an id are
    /// always appended.
    pub fn add_or_update(&mut self, record: Record) -> usize {
        if let Some(index) = record.id().and_then(|id| self.position(&id)) {
            self.records[index] = record;
            index
        } else {
            self.records.push(record);
            self.records.len() - 1
        }
    }

    /// Removes the record with the given id, keeping the order of the rest.
    ///
    /// Does nothing if no record has that id.
    pub fn delete(&mut self, id: &str) -> Option<Record> {
        self.position(id).map(|index| self.records.remove(index))
    }

    /// JSON projection of every record.
    pub fn to_json(&self) -> Value {
        Value::Array(self.records.iter().map(Record::to_json).collect())
    }
}

impl<'a> IntoIterator for &'a RecordList {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for RecordList {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl Serialize for RecordList {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.records.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, name: &str) -> Record {
        let Value::Object(fields) = json!({ "id": id, "name": name }) else {
            unreachable!()
        };
        Record::new("user", fields)
    }

    fn ids(list: &RecordList) -> Vec<String> {
        list.iter().filter_map(Record::id).collect()
    }

    #[test]
    fn test_add_or_update_replaces_in_place() {
        let mut list = RecordList::new(
            [record("1", "a"), record("2", "b"), record("3", "c")],
            PageInfo::default(),
        );

        let index = list.add_or_update(record("2", "B"));
        assert_eq!(index, 1);
        assert_eq!(ids(&list), ["1", "2", "3"]);
        assert_eq!(list.get("2").unwrap().get("name"), Some(json!("B")));

        let index = list.add_or_update(record("4", "d"));
        assert_eq!(index, 3);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_delete() {
        let mut list = RecordList::new(
            [record("1", "a"), record("2", "b"), record("3", "c")],
            PageInfo::default(),
        );

        assert!(list.delete("2").is_some());
        assert_eq!(ids(&list), ["1", "3"]);

        assert!(list.delete("9").is_none());
        assert_eq!(ids(&list), ["1", "3"]);
    }

    #[test]
    fn test_constructor_dedupes_by_id() {
        let list = RecordList::new(
            [record("1", "a"), record("2", "b"), record("1", "z")],
            PageInfo::default(),
        );
        assert_eq!(ids(&list), ["1", "2"]);
        assert_eq!(list.first().unwrap().get("name"), Some(json!("z")));
        assert_eq!(list.last().unwrap().id().as_deref(), Some("2"));
    }

    #[test]
    fn test_page_info_and_projection() {
        let page_info: PageInfo = serde_json::from_value(json!({
            "hasNextPage": true,
            "endCursor": "abc"
        }))
        .unwrap();
        let list = RecordList::new([record("1", "a")], page_info).with_total_count(Some(10));

        assert!(list.has_next_page());
        assert!(!list.has_previous_page());
        assert_eq!(list.page_info().end_cursor.as_deref(), Some("abc"));
        assert_eq!(list.total_count(), Some(10));
        assert_eq!(list.to_json(), json!([{ "id": "1", "name": "a" }]));
        assert_eq!(serde_json::to_value(&list).unwrap(), list.to_json());
    }
}
