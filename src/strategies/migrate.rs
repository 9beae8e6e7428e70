use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{ImportError, Result, StepFailure};
use crate::migrations::{MigrationRegistry, MigrationRules};
use crate::pipeline::{Strategy, StrategyOutcome};
use crate::types::{Batch, Exchange, Fields};

pub const MIGRATE_DATASETS: &str = "migrate_datasets";
pub const MIGRATE_EXCHANGES: &str = "migrate_exchanges";

/// Numeric exchange fields scaled by a rule's `multiplier`
const SCALED_FIELDS: [&str; 4] = ["amount", "loc", "minimum", "maximum"];

/// Bind dataset-level renaming to the migration `name`.
///
/// Fails right away when the registry has no such migration, so a typo never
/// turns into a silently skipped step.
pub fn bind_dataset_migration(registry: &MigrationRegistry, name: &str) -> Result<Strategy> {
    let rules = lookup(registry, name)?;
    Strategy::bound(MIGRATE_DATASETS, name, move |batch: &Batch| {
        migrate_datasets(batch, &rules)
    })
}

/// Bind exchange-level renaming to the migration `name`.
pub fn bind_exchange_migration(registry: &MigrationRegistry, name: &str) -> Result<Strategy> {
    let rules = lookup(registry, name)?;
    Strategy::bound(MIGRATE_EXCHANGES, name, move |batch: &Batch| {
        migrate_exchanges(batch, &rules)
    })
}

fn lookup(registry: &MigrationRegistry, name: &str) -> Result<Arc<MigrationRules>> {
    registry
        .get(name)
        .cloned()
        .map(Arc::new)
        .ok_or_else(|| ImportError::UnknownMigration(name.to_string()))
}

/// Merge replacement fields into every dataset matched by `rules`
pub fn migrate_datasets(batch: &Batch, rules: &MigrationRules) -> StrategyOutcome {
    let mut out = batch.clone();
    for ds in out.iter_mut() {
        if let Some(to) = rules.replacement_for(&*ds).cloned() {
            for (key, value) in to {
                ds.set(key, value)?;
            }
        }
    }
    Ok(out)
}

/// Rename unlinked exchanges matched by `rules`. Linked exchanges are left
/// alone since they already point at their target.
///
/// Refuses if a `multiplier` would scale a value out of the finite range.
pub fn migrate_exchanges(batch: &Batch, rules: &MigrationRules) -> StrategyOutcome {
    let mut out = batch.clone();
    for ds in out.iter_mut() {
        for exc in ds.exchanges_mut() {
            if !exc.is_unlinked() {
                continue;
            }
            if let Some(to) = rules.replacement_for(&*exc).cloned() {
                apply_replacement(exc, to, &rules.name)?;
            }
        }
    }
    Ok(out)
}

fn apply_replacement(
    exc: &mut Exchange,
    mut to: Map<String, Value>,
    migration: &str,
) -> std::result::Result<(), StepFailure> {
    if let Some(multiplier) = to.remove("multiplier").and_then(|m| m.as_f64()) {
        // Scale everything first so a failure leaves the exchange untouched
        let mut scaled = Vec::with_capacity(SCALED_FIELDS.len());
        for key in SCALED_FIELDS {
            let Some(value) = exc.fields.get(key).and_then(Value::as_f64) else {
                continue;
            };
            let number = serde_json::Number::from_f64(value * multiplier).ok_or_else(|| {
                StepFailure::refused(format!(
                    "migration {}: {} of {:?} scaled by {} is not a finite number",
                    migration,
                    key,
                    exc.str_field("name").unwrap_or("<unnamed>"),
                    multiplier
                ))
            })?;
            scaled.push((key, Value::Number(number)));
        }
        for (key, value) in scaled {
            exc.set(key, value);
        }
    }
    for (key, value) in to {
        exc.set(key, value);
    }
    Ok(())
}
