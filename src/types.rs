//! Core types for the table store.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Name of the field every record is keyed by.
pub const ID_FIELD: &str = "id";

/// The whole database: table name to ordered records.
pub type Tables = BTreeMap<String, Vec<Record>>;

/// A single record: an ordered mapping of field name to JSON value.
///
/// Stored records always carry a string `id`; patches passed to
/// [`TableStore::update`](crate::TableStore::update) need not.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a record from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::InvalidRecord(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Serialize any `Serialize` type into a record.
    pub fn from_serialize(value: &impl Serialize) -> Result<Self> {
        Self::from_value(serde_json::to_value(value)?)
    }

    /// The record's `id`, if present and a string.
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Add a field, builder style.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Field names in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Merge `patch` into a copy of this record.
    ///
    /// Every field of `self` takes the patch value when the patch has one.
    /// Under [`MergePolicy::ExistingFields`] patch-only fields are dropped;
    /// under [`MergePolicy::AddNewFields`] they are appended. The `id` field
    /// is never taken from the patch.
    pub fn merge(&self, patch: &Record, policy: MergePolicy) -> Record {
        let mut merged = Map::with_capacity(self.0.len());

        for (field, value) in &self.0 {
            let value = match patch.0.get(field) {
                Some(new_value) if field != ID_FIELD => new_value.clone(),
                _ => value.clone(),
            };
            merged.insert(field.clone(), value);
        }

        if policy == MergePolicy::AddNewFields {
            for (field, value) in &patch.0 {
                if field != ID_FIELD && !merged.contains_key(field) {
                    merged.insert(field.clone(), value.clone());
                }
            }
        }

        Record(merged)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// How [`Record::merge`] treats patch fields the stored record lacks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Only overwrite fields already on the stored record.
    #[default]
    ExistingFields,
    /// Also add fields that only the patch has.
    AddNewFields,
}

/// How multiple search terms combine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Match {
    /// A record matches when at least one term matches.
    #[default]
    Any,
    /// A record matches only when every term matches.
    All,
}

/// Case-insensitive substring filter over record fields.
///
/// A term never matches a record that lacks the field or whose value for it
/// is not a string.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    terms: Vec<(String, String)>,
    mode: Match,
}

impl SearchCriteria {
    /// Empty criteria combined with [`Match::Any`].
    pub fn any() -> Self {
        Self::default()
    }

    /// Empty criteria combined with [`Match::All`].
    pub fn all() -> Self {
        Self {
            terms: Vec::new(),
            mode: Match::All,
        }
    }

    /// Add a `field contains needle` term.
    pub fn field(mut self, field: impl Into<String>, needle: impl AsRef<str>) -> Self {
        self.terms
            .push((field.into(), needle.as_ref().to_lowercase()));
        self
    }

    /// Whether `record` satisfies the criteria.
    pub fn matches(&self, record: &Record) -> bool {
        let mut terms = self.terms.iter().map(|(field, needle)| {
            record
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|value| value.to_lowercase().contains(needle.as_str()))
        });

        match self.mode {
            Match::Any => terms.any(|hit| hit),
            Match::All => terms.all(|hit| hit),
        }
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub table_count: u64,
    pub record_count: u64,
    pub file_size_bytes: u64,
}
