use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Ordered collection of datasets under active transformation
pub type Batch = Vec<Dataset>;

/// Read access to the named attributes of a record, used for identity hashing
/// and rule matching without caring whether the record is a dataset or an
/// exchange.
pub trait Fields {
    fn field(&self, key: &str) -> Option<&Value>;

    fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }
}

/// A reserved attribute was given a value of the wrong shape
#[derive(Error, Debug)]
#[error("invalid value for `{key}`: {source}")]
pub struct FieldError {
    key: String,
    #[source]
    source: serde_json::Error,
}

/// One inventory dataset. Only `exchanges` is interpreted here; every other
/// attribute passes through untouched.
///
/// A dataset read without an `exchanges` key is written back without one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exchanges: Option<Vec<Exchange>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Dataset {
    pub fn new(fields: Map<String, Value>, exchanges: Vec<Exchange>) -> Self {
        Self {
            exchanges: Some(exchanges),
            fields,
        }
    }

    pub fn exchanges(&self) -> &[Exchange] {
        self.exchanges.as_deref().unwrap_or(&[])
    }

    pub fn exchanges_mut(&mut self) -> &mut [Exchange] {
        self.exchanges.as_deref_mut().unwrap_or(&mut [])
    }

    /// Set an attribute. `exchanges` replaces the typed exchange list and
    /// must hold a list of exchange objects (or null).
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<(), FieldError> {
        let key = key.into();
        if key == EXCHANGES_KEY {
            self.exchanges =
                serde_json::from_value(value).map_err(|source| FieldError { key, source })?;
        } else {
            self.fields.insert(key, value);
        }
        Ok(())
    }

    /// Exchanges whose `input` is missing or falsy
    pub fn unlinked_exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges().iter().filter(|exc| exc.is_unlinked())
    }
}

impl Fields for Dataset {
    fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

const EXCHANGES_KEY: &str = "exchanges";
const INPUT_KEY: &str = "input";

// Keeps an explicit `"input": null` as `Some(Value::Null)` so it survives a
// write and read back; only a missing key becomes `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// A reference from a dataset to another entity, resolved through `input`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub input: Option<Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Exchange {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            input: None,
            fields,
        }
    }

    /// Set an attribute; `input` goes to the typed link field.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if key == INPUT_KEY {
            self.input = Some(value);
        } else {
            self.fields.insert(key, value);
        }
    }

    /// An exchange is unlinked iff `input` is absent or falsy.
    pub fn is_unlinked(&self) -> bool {
        match &self.input {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => !b,
            Some(Value::Number(n)) => n.as_f64() == Some(0.0),
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Array(a)) => a.is_empty(),
            Some(Value::Object(o)) => o.is_empty(),
        }
    }
}

impl Fields for Exchange {
    fn field(&self, key: &str) -> Option<&Value> {
        if key == INPUT_KEY {
            return self.input.as_ref();
        }
        self.fields.get(key)
    }
}

/// Counts reported by an import session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStatistics {
    pub datasets: usize,
    pub exchanges: usize,
    pub unlinked: usize,
}
