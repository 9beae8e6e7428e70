use std::fs;
use std::path::Path;

use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::info;

use super::Importer;
use crate::error::{ImportError, Result};
use crate::pipeline::Strategy;
use crate::strategies::default_strategies;
use crate::types::Batch;

const BATCH_SCHEMA_SOURCE: &str = include_str!("../../schemas/batch.v1.json");

static BATCH_SCHEMA: Lazy<std::result::Result<JSONSchema, String>> = Lazy::new(|| {
    let schema: Value = serde_json::from_str(BATCH_SCHEMA_SOURCE).map_err(|e| e.to_string())?;
    // jsonschema 0.17 expects a schema with 'static lifetime
    let schema: &'static Value = Box::leak(Box::new(schema));
    JSONSchema::options()
        .compile(schema)
        .map_err(|e| e.to_string())
});

/// Check `value` against the bundled batch schema
pub fn validate_batch(value: &Value) -> Result<()> {
    let schema = BATCH_SCHEMA
        .as_ref()
        .map_err(|e| ImportError::Config(format!("bundled batch schema is invalid: {}", e)))?;
    if let Err(errors) = schema.validate(value) {
        return Err(ImportError::Schema(
            errors
                .map(|error| format!("{} at {}", error, error.instance_path))
                .collect(),
        ));
    }
    Ok(())
}

/// Adapter for batches already in the common shape, stored as a JSON array
pub struct JsonImporter {
    database: String,
    data: Batch,
}

impl JsonImporter {
    pub const KIND: &'static str = "JsonImporter";

    /// Read and validate a batch file
    pub fn from_path<P: AsRef<Path>>(path: P, database: &str) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ImportError::Config(format!("Failed to read batch {}: {}", path.display(), e))
        })?;
        let importer = Self::from_value(serde_json::from_str(&content)?, database)?;
        info!(
            "Read {} datasets from {}",
            importer.data.len(),
            path.display()
        );
        Ok(importer)
    }

    pub fn from_value(value: Value, database: &str) -> Result<Self> {
        validate_batch(&value)?;
        Ok(Self {
            database: database.to_string(),
            data: serde_json::from_value(value)?,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

impl Importer for JsonImporter {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn default_strategies(&self) -> Result<Vec<Strategy>> {
        default_strategies(&self.database)
    }

    fn into_batch(self) -> Batch {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bundled_schema_compiles() {
        assert!(BATCH_SCHEMA.is_ok());
    }

    #[test]
    fn test_valid_batch_is_accepted() {
        let value = json!([
            {"name": "steel", "unit": "kg", "exchanges": [
                {"name": "coal", "amount": 0.2, "categories": ["fuel"]}
            ]},
            {"name": "no exchanges at all"}
        ]);
        let importer = JsonImporter::from_value(value, "db").unwrap();
        assert_eq!(importer.kind(), "JsonImporter");
        assert_eq!(importer.into_batch().len(), 2);
    }

    #[test]
    fn test_malformed_batch_is_rejected() {
        let value = json!([{"name": "steel", "exchanges": {"not": "a list"}}]);
        match JsonImporter::from_value(value, "db") {
            Err(ImportError::Schema(errors)) => assert!(!errors.is_empty()),
            other => panic!("expected schema error, got {:?}", other.map(|i| i.data.len())),
        }
    }

    #[test]
    fn test_session_gets_default_strategies() {
        let session = JsonImporter::from_value(json!([]), "db")
            .unwrap()
            .into_session()
            .unwrap();
        assert_eq!(session.kind(), "JsonImporter");
        assert_eq!(session.default_strategies().len(), 5);
    }
}
