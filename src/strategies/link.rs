use serde_json::json;
use std::collections::HashMap;

use crate::error::{Result, StepFailure};
use crate::identity::activity_hash;
use crate::pipeline::{Strategy, StrategyOutcome};
use crate::types::{Batch, Fields};

pub const LINK_INTERNAL: &str = "link_internal_by_activity_hash";

/// Bind internal linking to the database name the batch will be written as.
pub fn link_internal(database: &str) -> Result<Strategy> {
    let database = database.to_string();
    Strategy::bound(LINK_INTERNAL, database.clone(), move |batch: &Batch| {
        link_internal_by_activity_hash(batch, &database)
    })
}

/// Link unlinked exchanges to datasets of the same batch with an equal
/// activity hash, setting `input` to `[database, code]`.
///
/// Refuses when the datasets cannot be told apart (two share a hash) or when
/// a dataset has no `code` to link to. Both checks run before anything is
/// linked.
pub fn link_internal_by_activity_hash(batch: &Batch, database: &str) -> StrategyOutcome {
    let mut candidates: HashMap<String, &str> = HashMap::with_capacity(batch.len());
    for ds in batch {
        let code = ds
            .str_field("code")
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                StepFailure::refused(format!(
                    "dataset {:?} has no code; apply set_code_by_activity_hash first",
                    ds.str_field("name").unwrap_or("<unnamed>")
                ))
            })?;
        if candidates.insert(activity_hash(ds), code).is_some() {
            return Err(StepFailure::refused(format!(
                "Not each object in database is unique: {:?} appears twice",
                ds.str_field("name").unwrap_or("<unnamed>")
            )));
        }
    }

    let mut out = batch.clone();
    for exc in out.iter_mut().flat_map(|ds| ds.exchanges_mut().iter_mut()) {
        if !exc.is_unlinked() {
            continue;
        }
        if let Some(code) = candidates.get(&activity_hash(&*exc)) {
            exc.input = Some(json!([database, code]));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Exchange;
    use serde_json::Value;

    fn linked_target(value: &Value) -> Option<(&str, &str)> {
        match value.as_array()?.as_slice() {
            [db, code] => Some((db.as_str()?, code.as_str()?)),
            _ => None,
        }
    }

    fn batch(value: Value) -> Batch {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_links_matching_exchange() {
        let data = batch(json!([
            {"name": "steel", "unit": "kilogram", "code": "s1", "exchanges": [
                {"name": "coal", "unit": "kilogram"},
                {"name": "ore", "unit": "kilogram"}
            ]},
            {"name": "coal", "unit": "kilogram", "code": "c1"}
        ]));
        let out = link_internal_by_activity_hash(&data, "db").unwrap();
        let excs: &[Exchange] = out[0].exchanges();
        assert_eq!(linked_target(excs[0].input.as_ref().unwrap()), Some(("db", "c1")));
        assert!(excs[1].is_unlinked());
    }

    #[test]
    fn test_duplicate_datasets_refuse() {
        let data = batch(json!([
            {"name": "steel", "code": "a"},
            {"name": "Steel", "code": "b"}
        ]));
        match link_internal_by_activity_hash(&data, "db") {
            Err(StepFailure::Refused(err)) => assert!(err.message().contains("unique")),
            other => panic!("expected refusal, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_missing_code_refuses() {
        let data = batch(json!([{"name": "steel"}]));
        assert!(matches!(
            link_internal_by_activity_hash(&data, "db"),
            Err(StepFailure::Refused(_))
        ));
    }
}
