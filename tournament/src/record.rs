//! Generic record value shared by every collection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::schema::{Collection, Field};

const ID_LENGTH: usize = 15;
const ID_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a new record id: 15 lowercase alphanumeric characters.
pub fn generate_record_id() -> String {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    bytes[..ID_LENGTH]
        .iter()
        .map(|b| ID_ALPHABET[(*b as usize) % ID_ALPHABET.len()] as char)
        .collect()
}

/// Related records loaded into a record's expansion cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expanded {
    One(Box<Record>),
    Many(Vec<Record>),
}

impl Expanded {
    pub fn records(&self) -> &[Record] {
        match self {
            Expanded::One(r) => std::slice::from_ref(r.as_ref()),
            Expanded::Many(rs) => rs,
        }
    }
}

/// A record of some collection: an id plus a JSON object of field values.
///
/// Getters never fail: a missing or mistyped value reads as the zero value
/// of the requested type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(rename = "collectionName")]
    pub collection: Collection,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub updated: i64,
    #[serde(flatten)]
    data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    expand: BTreeMap<String, Expanded>,
    #[serde(skip)]
    is_new: bool,
}

impl Record {
    /// Create a blank, not yet persisted record with a fresh id.
    pub fn new(collection: Collection) -> Self {
        Self::with_data(collection, Map::new())
    }

    /// Create a not yet persisted record from initial field values.
    pub fn with_data(collection: Collection, data: Map<String, Value>) -> Self {
        Self {
            id: generate_record_id(),
            collection,
            created: 0,
            updated: 0,
            data,
            expand: BTreeMap::new(),
            is_new: true,
        }
    }

    /// Rebuild a record that was loaded from storage.
    pub fn from_stored(
        collection: Collection,
        id: String,
        data: Map<String, Value>,
        created: i64,
        updated: i64,
    ) -> Self {
        Self {
            id,
            collection,
            created,
            updated,
            data,
            expand: BTreeMap::new(),
            is_new: false,
        }
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn mark_persisted(&mut self) {
        self.is_new = false;
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    fn value(&self, field: Field) -> Option<&Value> {
        debug_assert_eq!(field.collection(), self.collection, "{field} read on {}", self.collection);
        self.data.get(field.name())
    }

    pub fn get_str(&self, field: Field) -> &str {
        self.value(field).and_then(Value::as_str).unwrap_or("")
    }

    /// Non-empty string value, typically a single relation id.
    pub fn get_id(&self, field: Field) -> Option<&str> {
        Some(self.get_str(field)).filter(|s| !s.is_empty())
    }

    pub fn get_bool(&self, field: Field) -> bool {
        self.value(field).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_int(&self, field: Field) -> i64 {
        match self.value(field) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Read a list of ids. A single non-empty string reads as a one-element list.
    pub fn get_string_list(&self, field: Field) -> Vec<String> {
        match self.value(field) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn set(&mut self, field: Field, value: impl Into<Value>) {
        debug_assert_eq!(field.collection(), self.collection, "{field} written on {}", self.collection);
        self.data.insert(field.name().to_string(), value.into());
    }

    pub fn set_ids<I, S>(&mut self, field: Field, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<Value> = ids.into_iter().map(|id| Value::String(id.into())).collect();
        self.set(field, Value::Array(values));
    }

    /// Clear a field. Single relations become the empty id, like the store does.
    pub fn clear(&mut self, field: Field) {
        self.set(field, "");
    }

    /// Overwrite fields from an arbitrary JSON object (used for request patches).
    ///
    /// System keys (`id`, `collectionName`, `created`, `updated`, `expand`) are ignored.
    pub fn merge_data(&mut self, patch: Map<String, Value>) {
        for (key, value) in patch {
            if matches!(
                key.as_str(),
                "id" | "collectionName" | "created" | "updated" | "expand"
            ) {
                continue;
            }
            self.data.insert(key, value);
        }
    }

    /// Remove `id` from a relation field. Returns whether the value changed.
    pub fn remove_relation_id(&mut self, field: Field, id: &str) -> bool {
        if matches!(self.value(field), Some(Value::Array(_))) {
            let before = self.get_string_list(field);
            let after: Vec<String> = before.iter().filter(|v| *v != id).cloned().collect();
            if after.len() == before.len() {
                return false;
            }
            self.set_ids(field, after);
            true
        } else if self.get_id(field) == Some(id) {
            self.clear(field);
            true
        } else {
            false
        }
    }

    // ── Expansion cache ────────────────────────────────────────────────

    pub fn set_expand(&mut self, field: Field, expanded: Expanded) {
        self.expand.insert(field.name().to_string(), expanded);
    }

    pub fn has_expansions(&self) -> bool {
        !self.expand.is_empty()
    }

    /// First expanded record under `field`, if any.
    pub fn expanded_one(&self, field: Field) -> Option<&Record> {
        self.expand.get(field.name()).and_then(|e| e.records().first())
    }

    /// All expanded records under `field`.
    pub fn expanded_all(&self, field: Field) -> &[Record] {
        self.expand
            .get(field.name())
            .map(Expanded::records)
            .unwrap_or(&[])
    }
}
