//! Records held by a store.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the primary key property when a record is viewed as an object.
pub const ID_FIELD: &str = "id";

/// A single stored record.
///
/// The primary key is kept apart from the remaining properties so that the
/// id can never drift from the key it is stored under. Viewed as a JSON
/// object (see [`Record::to_value`]) the id appears as the `id` property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stringified primary key.
    pub id: String,
    /// All other properties.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Creates an empty record with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Sets a property, returning the record.
    ///
    /// Setting `id` is ignored; the primary key is fixed at construction.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a property in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        if name != ID_FIELD {
            self.fields.insert(name, value.into());
        }
    }

    /// Returns a property by name. The `id` property is returned as a string.
    pub fn field(&self, name: &str) -> Option<Value> {
        if name == ID_FIELD {
            Some(Value::String(self.id.clone()))
        } else {
            self.fields.get(name).cloned()
        }
    }

    /// Returns the record as a JSON object including its id.
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        Value::Object(object)
    }

    /// Builds a record from a JSON object carrying an `id` property.
    ///
    /// Numeric ids are stringified.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidRecord`] if the value is not an object
    /// or has no usable id.
    pub fn from_value(value: Value) -> StorageResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(StorageError::invalid_record("record must be an object"));
        };

        let id = match fields.remove(ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(StorageError::invalid_record(format!(
                    "unsupported id value: {other}"
                )))
            }
            None => return Err(StorageError::invalid_record("record has no id")),
        };

        Ok(Self { id, fields })
    }

    /// Builds a record from any serializable value carrying an `id` property.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the result has no id.
    pub fn from_serialize<T: Serialize>(value: &T) -> StorageResult<Self> {
        Self::from_value(serde_json::to_value(value)?)
    }

    /// Deserializes the record (id included) into a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not match the target shape.
    pub fn deserialize_into<T: for<'de> Deserialize<'de>>(&self) -> StorageResult<T> {
        Ok(serde_json::from_value(self.to_value())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_is_exposed_as_field() {
        let record = Record::new("7").with_field("name", "seven");
        assert_eq!(record.field("id"), Some(json!("7")));
        assert_eq!(record.field("name"), Some(json!("seven")));
        assert_eq!(record.field("missing"), None);
    }

    #[test]
    fn setting_id_is_ignored() {
        let record = Record::new("a").with_field("id", "b");
        assert_eq!(record.id, "a");
        assert!(record.fields.is_empty());
    }

    #[test]
    fn from_value_accepts_numeric_id() {
        let record = Record::from_value(json!({"id": 42, "done": false})).unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(record.fields.get("done"), Some(&json!(false)));
        assert!(!record.fields.contains_key("id"));
    }

    #[test]
    fn from_value_rejects_missing_id() {
        assert!(matches!(
            Record::from_value(json!({"title": "x"})),
            Err(StorageError::InvalidRecord(_))
        ));
        assert!(Record::from_value(json!([1, 2])).is_err());
        assert!(Record::from_value(json!({"id": ""})).is_err());
    }

    #[test]
    fn to_value_includes_id() {
        let record = Record::new("x").with_field("n", 1);
        assert_eq!(record.to_value(), json!({"id": "x", "n": 1}));
    }

    #[test]
    fn typed_roundtrip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Todo {
            id: String,
            title: String,
        }

        let todo = Todo {
            id: "1".into(),
            title: "write tests".into(),
        };
        let record = Record::from_serialize(&todo).unwrap();
        assert_eq!(record.id, "1");
        let back: Todo = record.deserialize_into().unwrap();
        assert_eq!(back, todo);
    }
}
