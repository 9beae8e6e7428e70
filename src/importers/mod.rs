pub mod json;

pub use json::JsonImporter;

use crate::error::Result;
use crate::pipeline::{ImportSession, Strategy};
use crate::types::Batch;

/// Core trait that every format adapter implements
pub trait Importer {
    /// Adapter name; also disambiguates unlinked-data slots
    fn kind(&self) -> &str;

    /// Strategies run when the caller does not pass its own list
    fn default_strategies(&self) -> Result<Vec<Strategy>>;

    /// Hand over the parsed batch
    fn into_batch(self) -> Batch;

    /// Start a session over this adapter's batch with its default strategies
    fn into_session(self) -> Result<ImportSession>
    where
        Self: Sized,
    {
        let kind = self.kind().to_string();
        let defaults = self.default_strategies()?;
        Ok(ImportSession::new(kind, self.into_batch()).with_default_strategies(defaults))
    }
}
