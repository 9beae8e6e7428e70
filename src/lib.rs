pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod importers;
pub mod logging;
pub mod metrics;
pub mod migrations;
pub mod pipeline;
pub mod storage;
pub mod strategies;
pub mod types;

pub use error::{ImportError, Result, StepFailure, StrategyError};
pub use importers::{Importer, JsonImporter};
pub use pipeline::{ImportSession, RunSummary, StepReport, Strategy};
pub use storage::{FsUnlinkedStore, InMemoryUnlinkedStore, UnlinkedDataStore};
pub use types::{Batch, Dataset, Exchange};
