use std::fmt;
use std::sync::Arc;

use crate::error::{ImportError, Result, StepFailure};
use crate::types::Batch;

/// What a strategy hands back to the runner
pub type StrategyOutcome = std::result::Result<Batch, StepFailure>;

type StrategyFn = dyn Fn(&Batch) -> StrategyOutcome + Send + Sync;

/// A named transformation over a whole batch.
///
/// The function only ever sees the batch by shared reference, so a strategy
/// that refuses cannot have modified what it was given.
#[derive(Clone)]
pub struct Strategy {
    name: String,
    binding: Option<String>,
    func: Arc<StrategyFn>,
}

impl Strategy {
    /// Create a strategy from a plain function. Blank names are rejected.
    pub fn new<F>(name: impl Into<String>, func: F) -> Result<Self>
    where
        F: Fn(&Batch) -> StrategyOutcome + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ImportError::InvalidStrategy(
                "strategy has no name".to_string(),
            ));
        }
        Ok(Self {
            name,
            binding: None,
            func: Arc::new(func),
        })
    }

    /// Create a strategy that wraps `name` with one argument fixed, e.g. a
    /// migration rename bound to a migration. The strategy is still reported
    /// under the wrapped function's name.
    pub fn bound<F>(name: impl Into<String>, binding: impl Into<String>, func: F) -> Result<Self>
    where
        F: Fn(&Batch) -> StrategyOutcome + Send + Sync + 'static,
    {
        let mut strategy = Self::new(name, func)?;
        strategy.binding = Some(binding.into());
        Ok(strategy)
    }

    pub(crate) fn builtin(name: &'static str, func: fn(&Batch) -> StrategyOutcome) -> Self {
        Self {
            name: name.to_string(),
            binding: None,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binding(&self) -> Option<&str> {
        self.binding.as_deref()
    }

    pub fn run(&self, batch: &Batch) -> StrategyOutcome {
        (self.func)(batch)
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("name", &self.name)
            .field("binding", &self.binding)
            .finish()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Some(binding) => write!(f, "{}({})", self.name, binding),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_name_is_rejected() {
        let result = Strategy::new("  ", |batch: &Batch| Ok(batch.clone()));
        assert!(matches!(result, Err(ImportError::InvalidStrategy(_))));
    }

    #[test]
    fn test_bound_strategy_keeps_wrapped_name() {
        let strategy =
            Strategy::bound("migrate_datasets", "unit-fix", |batch: &Batch| Ok(batch.clone()))
                .unwrap();
        assert_eq!(strategy.name(), "migrate_datasets");
        assert_eq!(strategy.binding(), Some("unit-fix"));
        assert_eq!(strategy.to_string(), "migrate_datasets(unit-fix)");
    }
}
