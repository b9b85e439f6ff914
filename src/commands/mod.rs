//! Command implementations for the schemapull CLI.

mod pull;

pub use pull::{db_pull, PullOptions, PullOutcome};
