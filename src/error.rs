//! Failure taxonomy of the game engine.
//!
//! Only configuration defects and exhausted decision services are fatal. An unparsable action
//! response is *not* an error: it is resolved in [`crate::response_parser`] and logged.

use thiserror::Error;

/// Errors raised while building or running a [`FairGame`](crate::session::FairGame).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    /// The joint action tuple is not one of the payoff model combinations.
    #[error("combination {actions:?} not found in payoff model")]
    UnknownCombination {
        /// The positional strategy keys that were looked up.
        actions: Vec<String>,
    },

    /// A joint-outcome tag has no payoff row.
    #[error("joint-outcome tag '{0}' not found in payoff matrix")]
    UnknownTag(String),

    /// A `{slot}` was still present after template substitution.
    #[error("template field '{{{0}}}' has no value in the prompt context")]
    TemplateFieldMissing(String),

    /// The decision service kept failing after every retry.
    #[error("decision service of '{agent}' failed {attempts} times, last error: {last_error}")]
    DecisionServiceExhausted {
        /// Participant whose service failed.
        agent: String,
        /// Number of attempts made.
        attempts: u32,
        /// Display form of the final failure.
        last_error: String,
    },

    /// The payoff table is inconsistent (key sets differ, gaps, duplicates, ...).
    #[error("invalid payoff model: {0}")]
    InvalidPayoffModel(String),

    /// The session settings or participant set cannot be used.
    #[error("invalid game settings: {0}")]
    InvalidSettings(String),

    /// No decision service is registered under this identifier.
    #[error("unsupported model '{requested}', available: {available:?}")]
    UnknownProvider {
        /// Requested provider identifier.
        requested: String,
        /// Registered identifiers.
        available: Vec<String>,
    },

    /// A write targeted a round that is already closed, or not the open one.
    #[error("round {0} is not open for writing")]
    RoundClosed(u32),

    /// Cancellation was requested between two decision-service calls.
    #[error("session cancelled")]
    Cancelled,
}

impl GameError {
    /// True for errors caused by the configuration rather than by the run itself.
    pub fn is_configuration_defect(&self) -> bool {
        matches!(
            self,
            GameError::UnknownCombination { .. }
                | GameError::UnknownTag(_)
                | GameError::TemplateFieldMissing(_)
                | GameError::InvalidPayoffModel(_)
                | GameError::InvalidSettings(_)
                | GameError::UnknownProvider { .. }
        )
    }
}
