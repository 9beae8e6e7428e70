//! Built-in strategies.
//!
//! Each one takes the batch by reference and returns a new batch, which is
//! what lets the runner keep the old batch when a strategy refuses.

pub mod generic;
pub mod link;
pub mod migrate;

pub use generic::{
    drop_unspecified_subcategories, normalize_units, normalize_whitespace,
    set_code_by_activity_hash,
};
pub use link::{link_internal, link_internal_by_activity_hash, LINK_INTERNAL};
pub use migrate::{
    bind_dataset_migration, bind_exchange_migration, migrate_datasets, migrate_exchanges,
    MIGRATE_DATASETS, MIGRATE_EXCHANGES,
};

use crate::error::Result;
use crate::pipeline::Strategy;

/// Names accepted by [`by_name`]
pub const BUILTIN_STRATEGIES: [&str; 5] = [
    "normalize_whitespace",
    "normalize_units",
    "drop_unspecified_subcategories",
    "set_code_by_activity_hash",
    LINK_INTERNAL,
];

/// Look up a built-in strategy. `database` is only used by strategies that
/// need to know the name the batch will be written as.
pub fn by_name(name: &str, database: &str) -> Option<Result<Strategy>> {
    let strategy = match name {
        "normalize_whitespace" => Strategy::builtin("normalize_whitespace", normalize_whitespace),
        "normalize_units" => Strategy::builtin("normalize_units", normalize_units),
        "drop_unspecified_subcategories" => Strategy::builtin(
            "drop_unspecified_subcategories",
            drop_unspecified_subcategories,
        ),
        "set_code_by_activity_hash" => {
            Strategy::builtin("set_code_by_activity_hash", set_code_by_activity_hash)
        }
        LINK_INTERNAL => return Some(link_internal(database)),
        _ => return None,
    };
    Some(Ok(strategy))
}

/// Default list for adapters producing generic inventory batches
pub fn default_strategies(database: &str) -> Result<Vec<Strategy>> {
    BUILTIN_STRATEGIES
        .iter()
        .filter_map(|name| by_name(name, database))
        .collect()
}
