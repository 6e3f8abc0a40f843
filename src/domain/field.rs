//! Presence-tracking fields and update payloads
//!
//! A desired-state field is either unknown (not configured or not yet
//! computed), explicitly null, or set. Only set fields reach the appliance;
//! unset fields are left untouched remotely.

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Field<T> {
    #[default]
    Unknown,
    Null,
    Value(T),
}

impl<T> Field<T> {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Field::Unknown)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl Field<bool> {
    /// Boolean value, treating unknown and null as false
    pub fn is_true(&self) -> bool {
        matches!(self, Field::Value(true))
    }
}

impl Field<String> {
    /// Set and non-empty
    pub fn is_present(&self) -> bool {
        self.value().map(|s| !s.is_empty()).unwrap_or(false)
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Value(value)
    }
}

// Missing keys stay `Unknown` via `#[serde(default)]`; explicit null is `Null`
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Field::Value(value),
            None => Field::Null,
        })
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Value(v) => serializer.serialize_some(v),
            _ => serializer.serialize_none(),
        }
    }
}

impl<T: JsonSchema> JsonSchema for Field<T> {
    fn is_referenceable() -> bool {
        false
    }

    fn schema_name() -> String {
        Option::<T>::schema_name()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        Option::<T>::json_schema(gen)
    }
}

// =============================================================================
// Update Payload
// =============================================================================

/// Object passed to `<resource>.update`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: Map<String, Value>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include `key` only when the field is set
    pub fn set<T: Serialize>(&mut self, key: &str, field: &Field<T>) -> &mut Self {
        if let Field::Value(v) = field {
            match serde_json::to_value(v) {
                Ok(value) => {
                    self.fields.insert(key.to_string(), value);
                }
                Err(e) => warn!("Omitting {} from update payload: {}", key, e),
            }
        }
        self
    }

    /// Explicitly clear `key` on the appliance
    pub fn clear(&mut self, key: &str) -> &mut Self {
        self.fields.insert(key.to_string(), Value::Null);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether any key in this patch carries a value different from `prior`
    pub fn differs_from(&self, prior: &Patch) -> bool {
        self.fields
            .iter()
            .any(|(key, value)| prior.fields.get(key) != Some(value))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}
