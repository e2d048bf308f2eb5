//! Error types callers are expected to branch on.
//!
//! Transport problems during a dispatch run are not errors at this level: they
//! are classified into [`crate::models::AttemptOutcome`] and end up in the
//! session report instead.

use thiserror::Error;

/// Reasons a winner draw is refused before any randomness is consumed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// The candidate pool had no eligible entries.
    #[error("candidate pool is empty")]
    EmptyPool,

    /// Requested winner count is outside `1..=available`.
    #[error("invalid number of winners: {requested} (choose between 1 and {available})")]
    InvalidSelectionCount { requested: usize, available: usize },

    /// Two candidates in one pool share an id.
    #[error("duplicate candidate id {0} in pool")]
    DuplicateCandidate(u64),
}

/// Failures of the page adapters that turn forum markup into core inputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A required element is missing from the page.
    #[error("required element not found: {0}")]
    ElementNotFound(String),

    /// A CSS selector could not be parsed.
    #[error("invalid selector {selector}: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

/// Malformed configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}
