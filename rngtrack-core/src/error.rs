//! Error taxonomy shared by the engine, the cache and every data source.

use crate::ledger::{GameId, OutcomeId};

/// Every failure a tracker operation can report.
///
/// None of these are fatal. Callers surface the user-visible ones and return
/// to an interactive state.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Request failed or timed out. Only retried on an explicit user action.
    #[error("Network error: {0}")]
    Network(String),
    /// Bad input, either caught before dispatch or the backend detail verbatim.
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// A log references an outcome that is not part of the event.
    #[error("{count} logged attempt(s) reference unknown outcome {outcome_id}")]
    OrphanData { outcome_id: OutcomeId, count: u64 },
    /// A response arrived for navigation state that has since moved on.
    #[error("Discarded stale response for game {game} (generation {generation})")]
    StaleResponse { game: GameId, generation: u64 },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl TrackerError {
    /// Build a validation error from anything displayable.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether this error should ever reach the user.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        !matches!(self, Self::StaleResponse { .. })
    }
}

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_responses_stay_internal() {
        let stale = TrackerError::StaleResponse {
            game: GameId(4),
            generation: 2,
        };
        assert!(!stale.is_user_visible());
        assert!(TrackerError::Network("offline".into()).is_user_visible());
        assert!(TrackerError::validation("count must be at least 1").is_user_visible());
    }

    #[test]
    fn orphan_message_names_outcome() {
        let err = TrackerError::OrphanData {
            outcome_id: OutcomeId(77),
            count: 3,
        };
        assert_eq!(
            err.to_string(),
            "3 logged attempt(s) reference unknown outcome 77"
        );
    }
}
