use std::collections::HashSet;
use std::slice;

use crate::identity::IdentityHasher;
use crate::types::{Dataset, Exchange};

/// Unique unlinked exchanges of a batch, in (dataset, exchange) order.
///
/// Uniqueness is decided by the identity key alone, so two exchanges that
/// differ only in fields outside the key collapse to the first one seen.
/// The iterator is single-pass: ask the session for a new one to start over.
pub struct Unlinked<'a> {
    datasets: slice::Iter<'a, Dataset>,
    exchanges: slice::Iter<'a, Exchange>,
    hasher: &'a dyn IdentityHasher,
    seen: HashSet<String>,
}

impl<'a> Unlinked<'a> {
    pub fn new(datasets: &'a [Dataset], hasher: &'a dyn IdentityHasher) -> Self {
        Self {
            datasets: datasets.iter(),
            exchanges: Default::default(),
            hasher,
            seen: HashSet::new(),
        }
    }
}

impl<'a> Iterator for Unlinked<'a> {
    type Item = &'a Exchange;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            for exc in self.exchanges.by_ref() {
                if !exc.is_unlinked() {
                    continue;
                }
                if self.seen.insert(self.hasher.identity_key(exc)) {
                    return Some(exc);
                }
            }
            self.exchanges = self.datasets.next()?.exchanges().iter();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ActivityHasher;
    use crate::types::Fields;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn batch(value: Value) -> Vec<Dataset> {
        serde_json::from_value(value).unwrap()
    }

    struct CountingHasher(AtomicUsize);

    impl IdentityHasher for CountingHasher {
        fn identity_key(&self, record: &dyn Fields) -> String {
            self.0.fetch_add(1, Ordering::SeqCst);
            ActivityHasher.identity_key(record)
        }
    }

    #[test]
    fn test_duplicates_across_datasets_collapse() {
        let data = batch(json!([
            {"exchanges": [{"input": null, "name": "X"}]},
            {"exchanges": [{"input": null, "name": "X"}]}
        ]));
        let found: Vec<_> = Unlinked::new(&data, &ActivityHasher).collect();
        assert_eq!(found.len(), 1);
        assert!(std::ptr::eq(found[0], &data[0].exchanges()[0]));
        assert_eq!(
            serde_json::to_value(found[0]).unwrap(),
            json!({"input": null, "name": "X"})
        );
    }

    #[test]
    fn test_first_occurrence_wins() {
        let data = batch(json!([
            {"exchanges": [
                {"name": "steel", "amount": 1, "comment": "first"},
                {"name": "coal", "input": ["db", "coal"]}
            ]},
            {"exchanges": [
                {"name": "Steel", "amount": 2, "comment": "second"},
                {"name": "water"}
            ]}
        ]));
        let found: Vec<_> = Unlinked::new(&data, &ActivityHasher)
            .map(|exc| exc.str_field("comment").unwrap_or("-"))
            .collect();
        assert_eq!(found, vec!["first", "-"]);
    }

    #[test]
    fn test_linked_exchanges_are_never_hashed() {
        let data = batch(json!([
            {"exchanges": [
                {"name": "a", "input": ["db", "a"]},
                {"name": "b"},
                {"name": "c", "input": ["db", "c"]}
            ]},
            {"name": "no exchanges"}
        ]));
        let hasher = CountingHasher(AtomicUsize::new(0));
        let found = Unlinked::new(&data, &hasher).count();
        assert_eq!(found, 1);
        assert_eq!(hasher.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_batch_yields_nothing() {
        assert_eq!(Unlinked::new(&[], &ActivityHasher).count(), 0);
    }
}
