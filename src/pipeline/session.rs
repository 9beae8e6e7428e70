use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::strategy::Strategy;
use super::unlinked::Unlinked;
use crate::error::{ImportError, Result, StepFailure, StrategyError};
use crate::identity::{ActivityHasher, IdentityHasher};
use crate::metrics::StrategyMetrics;
use crate::migrations::MigrationRegistry;
use crate::storage::{StoreError, UnlinkedDataStore, UnlinkedMetadata};
use crate::strategies::{bind_dataset_migration, bind_exchange_migration};
use crate::types::{Batch, Dataset, ImportStatistics};

/// What happened to one strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepReport {
    Applied,
    Refused(StrategyError),
}

/// Summary of one `apply_strategies` call
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub applied: usize,
    pub refused: usize,
    pub elapsed: Duration,
}

/// A batch under transformation, plus the record of what was done to it.
///
/// Strategies run strictly one after the other. After each one that succeeds
/// the session's batch is replaced by the strategy's output and the strategy
/// name is appended to the applied-strategies log; a refusing strategy leaves
/// both untouched.
pub struct ImportSession {
    id: Uuid,
    kind: String,
    data: Batch,
    applied_strategies: Option<Vec<String>>,
    // Log entries with their bindings, kept in step with `applied_strategies`
    applied_steps: Vec<String>,
    default_strategies: Arc<[Strategy]>,
    hasher: Arc<dyn IdentityHasher>,
}

impl ImportSession {
    /// `kind` names the adapter that produced the batch, e.g. `JsonImporter`.
    pub fn new(kind: impl Into<String>, data: Batch) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            data,
            applied_strategies: None,
            applied_steps: Vec::new(),
            default_strategies: Arc::from(Vec::new()),
            hasher: Arc::new(ActivityHasher),
        }
    }

    pub fn with_default_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.default_strategies = Arc::from(strategies);
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn IdentityHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Pick up a batch saved with [`write_unlinked`](Self::write_unlinked),
    /// including the strategies that had already been applied to it.
    pub fn resume(
        store: &dyn UnlinkedDataStore,
        slot: &str,
        kind: impl Into<String>,
    ) -> Result<Self> {
        let snapshot = store
            .load(slot)?
            .ok_or_else(|| StoreError::NotRegistered(slot.to_string()))?;

        let metadata = snapshot.metadata;
        let mut session = Self::new(kind, snapshot.data);
        // Metadata without bound forms only has bare names to go on; bound
        // steps then never match and run again.
        session.applied_steps = if metadata.applied.len() == metadata.strategies.len() {
            metadata.applied
        } else {
            metadata.strategies.clone()
        };
        if !metadata.strategies.is_empty() {
            session.applied_strategies = Some(metadata.strategies);
        }
        info!(
            "Resumed {} datasets from {} ({} strategies already applied)",
            session.data.len(),
            slot,
            session.applied_strategies().len()
        );
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn data(&self) -> &Batch {
        &self.data
    }

    pub fn into_data(self) -> Batch {
        self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dataset> {
        self.data.iter()
    }

    pub fn default_strategies(&self) -> &[Strategy] {
        &self.default_strategies
    }

    /// Names of strategies applied so far, in order
    pub fn applied_strategies(&self) -> &[String] {
        self.applied_strategies.as_deref().unwrap_or(&[])
    }

    /// Like [`applied_strategies`](Self::applied_strategies), with each bound
    /// step shown with its argument, e.g. `migrate_exchanges(unit-aliases)`
    pub fn applied_steps(&self) -> &[String] {
        &self.applied_steps
    }

    /// Apply one strategy to the batch.
    ///
    /// A contained refusal is logged and reported as [`StepReport::Refused`];
    /// anything else the strategy fails with is returned as an error.
    pub fn apply_strategy(&mut self, strategy: &Strategy) -> Result<StepReport> {
        let name = strategy.name();
        info!(strategy = %name, binding = ?strategy.binding(), "Applying strategy: {}", name);

        let start = Instant::now();
        match strategy.run(&self.data) {
            Ok(data) => {
                self.data = data;
                self.applied_strategies
                    .get_or_insert_with(Vec::new)
                    .push(name.to_string());
                self.applied_steps.push(strategy.to_string());
                StrategyMetrics::record_applied(name, start.elapsed().as_secs_f64());
                Ok(StepReport::Applied)
            }
            Err(StepFailure::Refused(err)) => {
                warn!(strategy = %name, "Couldn't apply strategy {}:\n\t{}", name, err);
                StrategyMetrics::record_refused(name);
                Ok(StepReport::Refused(err))
            }
            Err(StepFailure::Fatal(source)) => {
                error!(strategy = %name, "Strategy {} failed: {:#}", name, source);
                StrategyMetrics::record_failed(name);
                Err(ImportError::StrategyFailed {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }

    /// Apply `strategies` in order, or the session's default list when `None`.
    ///
    /// A fatal failure stops the run; strategies applied before it stay
    /// applied and logged.
    pub fn apply_strategies(&mut self, strategies: Option<&[Strategy]>) -> Result<RunSummary> {
        let defaults = Arc::clone(&self.default_strategies);
        let strategies = strategies.unwrap_or(&defaults[..]);
        self.run(strategies.iter())
    }

    /// Like [`apply_strategies`](Self::apply_strategies), but skips strategies
    /// already in the applied log. A bound step only matches an entry with
    /// the same binding. Repeats are matched by count: if the log holds a
    /// step twice, its first two occurrences in the list are skipped.
    pub fn apply_pending_strategies(
        &mut self,
        strategies: Option<&[Strategy]>,
    ) -> Result<RunSummary> {
        let defaults = Arc::clone(&self.default_strategies);
        let strategies = strategies.unwrap_or(&defaults[..]);

        let mut done: HashMap<String, usize> = HashMap::new();
        for step in &self.applied_steps {
            *done.entry(step.clone()).or_default() += 1;
        }
        let pending: Vec<&Strategy> = strategies
            .iter()
            .filter(|strategy| match done.get_mut(&strategy.to_string()) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    debug!("Skipping already applied strategy: {}", strategy);
                    false
                }
                _ => true,
            })
            .collect();

        self.run(pending.into_iter())
    }

    fn run<'s>(
        &mut self,
        strategies: impl ExactSizeIterator<Item = &'s Strategy>,
    ) -> Result<RunSummary> {
        let span = info_span!("apply_strategies", session = %self.id, kind = %self.kind);
        let _enter = span.enter();

        let start = Instant::now();
        let mut summary = RunSummary {
            steps: strategies.len(),
            applied: 0,
            refused: 0,
            elapsed: Duration::ZERO,
        };
        for strategy in strategies {
            match self.apply_strategy(strategy)? {
                StepReport::Applied => summary.applied += 1,
                StepReport::Refused(_) => summary.refused += 1,
            }
        }
        summary.elapsed = start.elapsed();

        StrategyMetrics::record_run(summary.steps, summary.elapsed.as_secs_f64());
        info!(
            count = summary.steps,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "Applied {} strategies in {:.2} seconds",
            summary.steps,
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }

    /// Rename datasets with the registered migration `name`.
    ///
    /// An unknown migration fails before anything runs.
    pub fn migrate_datasets(
        &mut self,
        registry: &MigrationRegistry,
        name: &str,
    ) -> Result<RunSummary> {
        let strategies = [bind_dataset_migration(registry, name)?];
        self.apply_strategies(Some(&strategies[..]))
    }

    /// Rename unlinked exchanges with the registered migration `name`.
    pub fn migrate_exchanges(
        &mut self,
        registry: &MigrationRegistry,
        name: &str,
    ) -> Result<RunSummary> {
        let strategies = [bind_exchange_migration(registry, name)?];
        self.apply_strategies(Some(&strategies[..]))
    }

    /// Unique unlinked exchanges across the whole batch
    pub fn unlinked(&self) -> Unlinked<'_> {
        Unlinked::new(&self.data, self.hasher.as_ref())
    }

    pub fn statistics(&self) -> ImportStatistics {
        let stats = ImportStatistics {
            datasets: self.data.len(),
            exchanges: self.data.iter().map(|ds| ds.exchanges().len()).sum(),
            unlinked: self.unlinked().count(),
        };
        info!(
            "{} datasets\n{} exchanges\n{} unlinked exchanges",
            stats.datasets, stats.exchanges, stats.unlinked
        );
        stats
    }

    /// Save the batch and its applied-strategies log under
    /// `"{name} {kind}"`, registering the slot first if needed. Returns the
    /// slot name.
    pub fn write_unlinked(&self, store: &dyn UnlinkedDataStore, name: &str) -> Result<String> {
        let span = info_span!("write_unlinked", session = %self.id);
        let _enter = span.enter();

        let slot = format!("{} {}", name, self.kind);
        if !store.contains(&slot) {
            match store.register(&slot) {
                Ok(()) => {}
                Err(StoreError::AlreadyRegistered(_)) => {
                    debug!("Slot {} was registered concurrently", slot);
                }
                Err(e) => return Err(e.into()),
            }
        }

        store.set_metadata(
            &slot,
            UnlinkedMetadata::now(self.applied_strategies().to_vec())
                .with_applied(self.applied_steps.clone()),
        )?;
        store.flush()?;
        store.write(&slot, &self.data)?;

        StrategyMetrics::record_unlinked_write();
        info!(slot = %slot, "Saved unlinked data: {}", slot);
        Ok(slot)
    }
}

impl<'a> IntoIterator for &'a ImportSession {
    type Item = &'a Dataset;
    type IntoIter = std::slice::Iter<'a, Dataset>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::MigrationRules;
    use crate::storage::InMemoryUnlinkedStore;
    use crate::types::Fields;
    use serde_json::{json, Value};

    fn batch(value: Value) -> Batch {
        serde_json::from_value(value).unwrap()
    }

    fn tag(name: &'static str) -> Strategy {
        Strategy::new(name, move |batch: &Batch| {
            let mut out = batch.clone();
            for ds in out.iter_mut() {
                let mut tags = ds.fields.get("tags").cloned().unwrap_or_else(|| json!([]));
                if let Some(list) = tags.as_array_mut() {
                    list.push(json!(name));
                }
                ds.set("tags", tags).unwrap();
            }
            Ok(out)
        })
        .unwrap()
    }

    fn refusing(name: &'static str) -> Strategy {
        Strategy::new(name, |_: &Batch| Err(StepFailure::refused("precondition not met"))).unwrap()
    }

    fn broken(name: &'static str) -> Strategy {
        Strategy::new(name, |_: &Batch| Err(anyhow::anyhow!("disk on fire").into())).unwrap()
    }

    fn session() -> ImportSession {
        ImportSession::new("TestImporter", batch(json!([{"name": "a"}, {"name": "b"}])))
    }

    #[test]
    fn test_refused_step_is_skipped_and_not_logged() {
        let mut session = session();
        let steps = [tag("okStep"), refusing("failingStep"), tag("okStep2")];
        let summary = session.apply_strategies(Some(&steps[..])).unwrap();

        assert_eq!(session.applied_strategies(), ["okStep", "okStep2"]);
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.applied, 2);
        assert_eq!(summary.refused, 1);
        for ds in session.iter() {
            assert_eq!(ds.fields["tags"], json!(["okStep", "okStep2"]));
        }
    }

    #[test]
    fn test_refusing_last_step_leaves_batch_unchanged() {
        let mut session = session();
        session.apply_strategies(Some(&[tag("okStep")][..])).unwrap();
        let before = session.data().clone();

        let report = session.apply_strategy(&refusing("failingStep")).unwrap();
        assert_eq!(
            report,
            StepReport::Refused(StrategyError::new("precondition not met"))
        );
        assert_eq!(session.data(), &before);
        assert_eq!(session.applied_strategies(), ["okStep"]);
    }

    #[test]
    fn test_fatal_step_aborts_remaining() {
        let mut session = session();
        let steps = [tag("first"), broken("explodes"), tag("never")];
        let err = session.apply_strategies(Some(&steps[..])).unwrap_err();

        assert!(matches!(err, ImportError::StrategyFailed { ref name, .. } if name == "explodes"));
        assert_eq!(session.applied_strategies(), ["first"]);
        assert_eq!(session.data()[0].fields["tags"], json!(["first"]));
    }

    #[test]
    fn test_log_is_created_lazily() {
        let mut session = session();
        assert!(session.applied_strategies.is_none());
        session.apply_strategy(&refusing("nope")).unwrap();
        assert!(session.applied_strategies.is_none());
        session.apply_strategy(&tag("yes")).unwrap();
        assert_eq!(session.applied_strategies(), ["yes"]);
    }

    #[test]
    fn test_none_falls_back_to_defaults() {
        let mut session = session().with_default_strategies(vec![tag("d1"), tag("d2")]);
        let summary = session.apply_strategies(None).unwrap();
        assert_eq!(summary.steps, 2);
        assert_eq!(session.applied_strategies(), ["d1", "d2"]);

        let none: [Strategy; 0] = [];
        session.apply_strategies(Some(&none[..])).unwrap();
        assert_eq!(session.applied_strategies().len(), 2);
    }

    #[test]
    fn test_unknown_migration_touches_nothing() {
        let mut session = session();
        session.apply_strategy(&tag("okStep")).unwrap();
        let before = session.data().clone();

        let err = session
            .migrate_datasets(&MigrationRegistry::new(), "missing")
            .unwrap_err();
        assert!(matches!(err, ImportError::UnknownMigration(_)));
        assert_eq!(session.data(), &before);
        assert_eq!(session.applied_strategies(), ["okStep"]);
    }

    #[test]
    fn test_migration_logs_wrapped_name() {
        let mut registry = MigrationRegistry::new();
        registry.register(MigrationRules {
            name: "rename-a".to_string(),
            description: String::new(),
            fields: vec!["name".to_string()],
            data: vec![serde_json::from_value(json!([["a"], {"name": "alpha"}])).unwrap()],
        });

        let mut session = session();
        session.migrate_datasets(&registry, "rename-a").unwrap();
        assert_eq!(session.applied_strategies(), ["migrate_datasets"]);
        assert_eq!(session.data()[0].str_field("name"), Some("alpha"));
    }

    #[test]
    fn test_write_unlinked_registers_once_and_flushes() {
        let store = InMemoryUnlinkedStore::new();
        let mut session = session();
        session.apply_strategy(&tag("okStep")).unwrap();

        let slot = session.write_unlinked(&store, "review").unwrap();
        assert_eq!(slot, "review TestImporter");
        assert_eq!(store.register_calls(), 1);
        assert_eq!(store.flush_calls(), 1);

        let metadata = store.flushed_metadata(&slot).unwrap();
        assert_eq!(metadata.strategies, session.applied_strategies());
        assert_eq!(metadata.kind, "database");

        session.apply_strategy(&tag("again")).unwrap();
        session.write_unlinked(&store, "review").unwrap();
        assert_eq!(store.register_calls(), 1);
        assert_eq!(
            store.flushed_metadata(&slot).unwrap().strategies,
            ["okStep", "again"]
        );
    }

    #[test]
    fn test_write_unlinked_without_strategies_stores_empty_log() {
        let store = InMemoryUnlinkedStore::new();
        let slot = session().write_unlinked(&store, "raw").unwrap();
        assert!(store.metadata(&slot).unwrap().strategies.is_empty());
    }

    #[test]
    fn test_resume_skips_applied_strategies() {
        let store = InMemoryUnlinkedStore::new();
        let mut first = session();
        first.apply_strategies(Some(&[tag("s1"), tag("s2")][..])).unwrap();
        let slot = first.write_unlinked(&store, "wip").unwrap();

        let mut resumed = ImportSession::resume(&store, &slot, "TestImporter").unwrap();
        assert_eq!(resumed.applied_strategies(), ["s1", "s2"]);

        let summary = resumed
            .apply_pending_strategies(Some(&[tag("s1"), tag("s2"), tag("s3")][..]))
            .unwrap();
        assert_eq!(summary.steps, 1);
        assert_eq!(resumed.applied_strategies(), ["s1", "s2", "s3"]);
        assert_eq!(resumed.data()[0].fields["tags"], json!(["s1", "s2", "s3"]));
    }

    fn unit_registry() -> MigrationRegistry {
        let mut registry = MigrationRegistry::new();
        for (name, from, to) in [("a", "t", "ton"), ("b", "kwh", "kilowatt hour")] {
            registry.register(MigrationRules {
                name: name.to_string(),
                description: String::new(),
                fields: vec!["unit".to_string()],
                data: vec![serde_json::from_value(json!([[from], {"unit": to}])).unwrap()],
            });
        }
        registry
    }

    #[test]
    fn test_resume_runs_same_step_with_other_binding() {
        let registry = unit_registry();
        let store = InMemoryUnlinkedStore::new();
        let mut first = ImportSession::new(
            "TestImporter",
            batch(json!([{"exchanges": [{"unit": "t"}, {"unit": "kwh"}]}])),
        );
        first.migrate_exchanges(&registry, "a").unwrap();
        assert_eq!(first.applied_steps(), ["migrate_exchanges(a)"]);
        let slot = first.write_unlinked(&store, "wip").unwrap();
        assert_eq!(
            store.flushed_metadata(&slot).unwrap().applied,
            ["migrate_exchanges(a)"]
        );

        let mut resumed = ImportSession::resume(&store, &slot, "TestImporter").unwrap();
        let steps = [
            bind_exchange_migration(&registry, "a").unwrap(),
            bind_exchange_migration(&registry, "b").unwrap(),
        ];
        let summary = resumed.apply_pending_strategies(Some(&steps[..])).unwrap();

        assert_eq!(summary.steps, 1);
        assert_eq!(
            resumed.applied_strategies(),
            ["migrate_exchanges", "migrate_exchanges"]
        );
        let exchanges = resumed.data()[0].exchanges();
        assert_eq!(exchanges[0].str_field("unit"), Some("ton"));
        assert_eq!(exchanges[1].str_field("unit"), Some("kilowatt hour"));
    }

    #[test]
    fn test_resume_without_bound_forms_reruns_bound_steps() {
        let registry = unit_registry();
        let store = InMemoryUnlinkedStore::new();
        store.register("old TestImporter").unwrap();
        store
            .set_metadata(
                "old TestImporter",
                UnlinkedMetadata::now(vec!["s1".to_string(), "migrate_exchanges".to_string()]),
            )
            .unwrap();
        store
            .write("old TestImporter", &batch(json!([{"exchanges": [{"unit": "t"}]}])))
            .unwrap();

        let mut resumed = ImportSession::resume(&store, "old TestImporter", "TestImporter").unwrap();
        let steps = [tag("s1"), bind_exchange_migration(&registry, "a").unwrap()];
        let summary = resumed.apply_pending_strategies(Some(&steps[..])).unwrap();
        assert_eq!(summary.steps, 1);
        assert_eq!(resumed.data()[0].exchanges()[0].str_field("unit"), Some("ton"));
    }

    #[test]
    fn test_resume_unknown_slot_fails() {
        let store = InMemoryUnlinkedStore::new();
        assert!(matches!(
            ImportSession::resume(&store, "nothing here", "TestImporter"),
            Err(ImportError::Store(StoreError::NotRegistered(_)))
        ));
    }

    #[test]
    fn test_statistics_counts_unique_unlinked() {
        let session = ImportSession::new(
            "TestImporter",
            batch(json!([
                {"exchanges": [{"input": null, "name": "X"}, {"name": "Y", "input": ["db", "y"]}]},
                {"exchanges": [{"input": null, "name": "X"}]}
            ])),
        );
        let stats = session.statistics();
        assert_eq!(stats.datasets, 2);
        assert_eq!(stats.exchanges, 3);
        assert_eq!(stats.unlinked, 1);

        let unlinked: Vec<_> = session.unlinked().collect();
        assert_eq!(unlinked.len(), 1);
        assert_eq!(unlinked[0].str_field("name"), Some("X"));
    }
}
