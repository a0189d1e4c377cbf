//! Scalar values and records exchanged between the client and the engines.

use crate::schema::{ModelMeta, ScalarKind};
use bounty_store_api::{TaskStatus, TransactionStatus, TransactionType};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ValueError(pub String);

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Json(Json),
    List(Vec<Value>),
    Record(Record),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "Boolean",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::DateTime(_) => "DateTime",
            Value::Json(_) => "Json",
            Value::List(_) => "List",
            Value::Record(_) => "Record",
        }
    }

    /// Decodes a JSON value for a column of the given kind.
    pub fn from_json(kind: ScalarKind, json: &Json) -> Result<Value, ValueError> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        match kind {
            ScalarKind::Json => Ok(Value::Json(json.clone())),
            ScalarKind::String => json
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(|| mismatch(kind, json)),
            ScalarKind::Int => json.as_i64().map(Value::Int).ok_or_else(|| mismatch(kind, json)),
            ScalarKind::Boolean => json
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| mismatch(kind, json)),
            ScalarKind::DateTime => json
                .as_str()
                .ok_or_else(|| mismatch(kind, json))
                .and_then(parse_datetime),
            ScalarKind::Enum(literals) => match json.as_str() {
                Some(s) if literals.contains(&s) => Ok(Value::String(s.to_string())),
                Some(s) => Err(ValueError(format!(
                    "'{s}' is not one of {}",
                    literals.join(", ")
                ))),
                None => Err(mismatch(kind, json)),
            },
        }
    }

    /// Converts a caller-supplied value to the representation used for a
    /// column of `kind`, rejecting values that cannot be stored there.
    pub fn coerce(self, kind: ScalarKind) -> Result<Value, ValueError> {
        match (kind, self) {
            (_, Value::Null) => Ok(Value::Null),
            (ScalarKind::String, v @ Value::String(_))
            | (ScalarKind::Int, v @ Value::Int(_))
            | (ScalarKind::Boolean, v @ Value::Bool(_))
            | (ScalarKind::DateTime, v @ Value::DateTime(_))
            | (ScalarKind::Json, v @ Value::Json(_)) => Ok(v),
            (ScalarKind::DateTime, Value::String(s)) => parse_datetime(&s),
            (ScalarKind::Json, other) => Ok(Value::Json(other.to_json())),
            (ScalarKind::Enum(literals), Value::String(s)) => {
                if literals.contains(&s.as_str()) {
                    Ok(Value::String(s))
                } else {
                    Err(ValueError(format!(
                        "'{s}' is not one of {}",
                        literals.join(", ")
                    )))
                }
            }
            (kind, other) => Err(ValueError(format!(
                "expected {}, got {}",
                kind.name(),
                other.kind_name()
            ))),
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::String(s) => Json::String(s.clone()),
            Value::DateTime(d) => Json::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Json(j) => j.clone(),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(record) => record.to_json(),
        }
    }

    /// Natural ordering between two non-null values of compatible kinds.
    /// Returns `None` when the values cannot be compared.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn mismatch(kind: ScalarKind, json: &Json) -> ValueError {
    ValueError(format!("expected {}, got {json}", kind.name()))
}

fn parse_datetime(s: &str) -> Result<Value, ValueError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| Value::DateTime(d.with_timezone(&Utc)))
        .map_err(|e| ValueError(format!("invalid DateTime '{s}': {e}")))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "'{s}'"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

// === Conversions depuis les types Rust ===

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::String(v.clone())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Json> for Value {
    fn from(v: Json) -> Self {
        Value::Json(v)
    }
}

impl From<TaskStatus> for Value {
    fn from(v: TaskStatus) -> Self {
        Value::String(v.as_str().to_string())
    }
}

impl From<TransactionType> for Value {
    fn from(v: TransactionType) -> Self {
        Value::String(v.as_str().to_string())
    }
}

impl From<TransactionStatus> for Value {
    fn from(v: TransactionStatus) -> Self {
        Value::String(v.as_str().to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A row: field name → value. Included relations appear as nested
/// `Value::Record` / `Value::List` entries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Value of a field, `Null` when absent.
    pub fn value(&self, field: &str) -> &Value {
        self.0.get(field).unwrap_or(&Value::Null)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|k, _| keep(k));
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Decodes a JSON object row using the model's field kinds.
    /// Keys that are not fields of the model are rejected.
    pub fn from_json(meta: &ModelMeta, json: &Json) -> Result<Record, ValueError> {
        let object = json
            .as_object()
            .ok_or_else(|| ValueError(format!("expected an object for {}", meta.name)))?;

        let mut record = Record::new();
        for (key, raw) in object {
            let field = meta
                .field(key)
                .ok_or_else(|| ValueError(format!("unknown field {}.{key}", meta.name)))?;
            let value = Value::from_json(field.kind, raw)
                .map_err(|e| ValueError(format!("{}.{key}: {e}", meta.name)))?;
            record.insert(key.clone(), value);
        }
        Ok(record)
    }

    pub fn to_json(&self) -> Json {
        Json::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Deserializes the record into a typed model.
    pub fn into_model<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_json())
    }

    /// Serializes a typed value and decodes it against the model.
    pub fn from_serializable<T: Serialize>(meta: &ModelMeta, value: &T) -> Result<Record, ValueError> {
        let json = serde_json::to_value(value)
            .map_err(|e| ValueError(format!("cannot serialize {} payload: {e}", meta.name)))?;
        Record::from_json(meta, &json)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Record(iter.into_iter().collect())
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TASK;
    use bounty_store_api::Task;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn postgres_timestamps_decode() {
        let value = Value::from_json(
            ScalarKind::DateTime,
            &json!("2025-03-01T10:15:30.123456+00:00"),
        )
        .unwrap();
        let Value::DateTime(dt) = value else {
            panic!("expected DateTime");
        };
        assert_eq!(dt.timestamp(), 1_740_824_130);
    }

    #[test]
    fn enum_literal_outside_schema_is_rejected() {
        let kind = ScalarKind::Enum(TaskStatus::LITERALS);
        assert!(Value::from_json(kind, &json!("IN_PROGRESS")).is_ok());
        let err = Value::from_json(kind, &json!("ARCHIVED")).unwrap_err();
        assert!(err.0.contains("ARCHIVED"));
    }

    #[test]
    fn coerce_parses_datetime_strings() {
        let coerced = Value::from("2025-01-01T00:00:00Z")
            .coerce(ScalarKind::DateTime)
            .unwrap();
        assert_eq!(
            coerced,
            Value::DateTime(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn coerce_rejects_kind_mismatch() {
        let err = Value::from(true).coerce(ScalarKind::Int).unwrap_err();
        assert_eq!(err.0, "expected Int, got Boolean");
    }

    #[test]
    fn int_and_float_compare() {
        assert_eq!(
            Value::Int(2).compare(&Value::Float(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Int(1).compare(&Value::from("1")), None);
    }

    #[test]
    fn record_round_trips_into_typed_model() {
        let row = json!({
            "id": "task-1",
            "title": "Audit contract",
            "description": "Review escrow",
            "requirements": null,
            "links": ["https://example.com"],
            "attachments": null,
            "value_in_wei": "250000000000000000",
            "deadline": "2025-06-01T00:00:00+00:00",
            "allow_overdue": false,
            "status": "OPEN",
            "contract_task_id": null,
            "creator_id": "user-1",
            "created_at": "2025-05-01T00:00:00+00:00",
            "updated_at": "2025-05-01T00:00:00+00:00",
            "deleted_at": null
        });

        let record = Record::from_json(&TASK, &row).unwrap();
        assert_eq!(record.value("links"), &Value::Json(json!(["https://example.com"])));

        let task: Task = record.into_model().unwrap();
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(task.value_in_wei, "250000000000000000");
    }

    #[test]
    fn record_rejects_unknown_fields() {
        let err = Record::from_json(&TASK, &json!({ "budget": 3 })).unwrap_err();
        assert_eq!(err.0, "unknown field Task.budget");
    }
}
