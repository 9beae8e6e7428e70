use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ImportError, Result};
use crate::types::Fields;

/// One rename rule: records whose `fields` equal `from` get `to` merged in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRule(pub Vec<Value>, pub Map<String, Value>);

/// A named rename/alias rule set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRules {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Attributes compared, in order, against each rule's `from` values
    pub fields: Vec<String>,
    /// `[[from values], {replacement fields}]` pairs
    pub data: Vec<MigrationRule>,
}

impl MigrationRules {
    /// Replacement fields for `record`, if one of the rules matches it
    pub fn replacement_for(&self, record: &dyn Fields) -> Option<&Map<String, Value>> {
        self.data
            .iter()
            .find(|MigrationRule(from, _)| {
                from.len() == self.fields.len()
                    && self
                        .fields
                        .iter()
                        .zip(from)
                        .all(|(field, expected)| {
                            record.field(field).unwrap_or(&Value::Null) == expected
                        })
            })
            .map(|MigrationRule(_, to)| to)
    }
}

/// Registry of migrations by name
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    migrations: BTreeMap<String, MigrationRules>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` rule file in `dir`. A missing directory yields an
    /// empty registry; an unreadable or malformed file is an error.
    pub fn load_from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut registry = Self::new();
        let dir_path = dir.as_ref();
        if !dir_path.exists() {
            debug!("Migrations directory {} does not exist", dir_path.display());
            return Ok(registry);
        }

        let entries = fs::read_dir(dir_path).map_err(|e| {
            ImportError::Config(format!("Failed to read migrations directory: {}", e))
        })?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            let rules: MigrationRules = serde_json::from_str(&content).map_err(|e| {
                ImportError::Config(format!(
                    "Failed to parse migration {}: {}",
                    path.display(),
                    e
                ))
            })?;
            registry.register(rules);
        }

        info!("Loaded {} migrations from {}", registry.len(), dir_path.display());
        Ok(registry)
    }

    /// Add or replace a migration
    pub fn register(&mut self, rules: MigrationRules) {
        self.migrations.insert(rules.name.clone(), rules);
    }

    pub fn get(&self, name: &str) -> Option<&MigrationRules> {
        self.migrations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.migrations.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.migrations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}
