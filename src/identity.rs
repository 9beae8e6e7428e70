use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::Fields;

/// Fields that make up an activity's identity, in hashing order
pub const ACTIVITY_HASH_FIELDS: [&str; 5] =
    ["name", "categories", "unit", "reference product", "location"];

/// Maps a record's salient attributes to a stable identity key.
pub trait IdentityHasher: Send + Sync {
    fn identity_key(&self, record: &dyn Fields) -> String;
}

/// Default identity: sha256 over the lower-cased activity fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityHasher;

impl IdentityHasher for ActivityHasher {
    fn identity_key(&self, record: &dyn Fields) -> String {
        activity_hash(record)
    }
}

pub fn activity_hash(record: &dyn Fields) -> String {
    // Simple canonical string; fields separated so "ab"+"c" != "a"+"bc"
    let mut s = String::new();
    for (i, key) in ACTIVITY_HASH_FIELDS.iter().enumerate() {
        if i > 0 {
            s.push('|');
        }
        s.push_str(&field_text(record.field(key)).to_lowercase());
    }

    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items.iter().map(|v| field_text(Some(v))).collect(),
        Some(other) => other.to_string(),
    }
}
