// Strategy pipeline: named steps, the session that runs them, and the
// unlinked-exchange view over the session's batch

pub mod session;
pub mod strategy;
pub mod unlinked;

pub use session::{ImportSession, RunSummary, StepReport};
pub use strategy::{Strategy, StrategyOutcome};
pub use unlinked::Unlinked;
