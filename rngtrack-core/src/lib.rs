//! RNG Track Engine
//!
//! Platform-agnostic core for recording outcomes of repeated random events and
//! comparing observed frequencies with their declared probabilities.
//! This crate provides the ledger model, the statistics engine, the view cache
//! and the import coordinator without UI or platform-specific dependencies.

pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod memory;
pub mod merge;
pub mod numbers;
pub mod session;
pub mod stats;
pub mod tracker;

// Re-export commonly used types
pub use cache::{LoadTicket, ViewCache};
pub use config::{DeviationThresholds, EngineConfig, ImportPolicy, ReplayMode};
pub use error::{Result, TrackerError};
pub use identity::{CONTRIBUTOR_KEY, IdentityStore, MemoryIdentity, load_or_create};
pub use ledger::{
    Backup, ContributorId, Event, EventDraft, EventId, EventShape, Game, GameDraft, GameId,
    LogEntry, LogEntryId, LogRecord, LogRef, LogRequest, Outcome, OutcomeDraft, OutcomeId,
    OutcomeTally, probability_from_percent,
};
pub use memory::MemoryBackend;
pub use merge::{
    IdentityChange, ImportPayload, MergeDecisions, MergePlan, MergeResult, ReplayFailure,
    plan_import,
};
pub use session::SessionContext;
pub use stats::{
    CountSource, Deviation, DeviationBand, HitDeviation, OutcomeStats, PointDeviation, Rate,
    RemoteStats, Scope, StatsQuery, StatsReport, compute_stats,
};
pub use tracker::{Refresh, Tracker};

/// Trait for abstracting the backend that owns the ledger.
/// Platform-specific implementations should provide this
///
/// Every call is a suspension point; nothing else in the engine awaits.
#[async_trait::async_trait(?Send)]
pub trait DataSource {
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn list_games(&self) -> Result<Vec<Game>>;

    /// Games the contributor has logged at least one outcome for.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn my_games(&self, contributor: &ContributorId) -> Result<Vec<Game>>;

    /// Search the external game catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn search_games(&self, query: &str) -> Result<Vec<Game>>;

    /// Create a game, or return the existing one with the same name.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank name, or a network error.
    async fn create_game(&self, draft: &GameDraft) -> Result<Game>;

    /// Events of a game with global and (given a contributor) personal tallies
    /// for every outcome, in a single response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the game does not exist.
    async fn list_events(
        &self,
        game: GameId,
        contributor: Option<&ContributorId>,
    ) -> Result<Vec<Event>>;

    /// # Errors
    ///
    /// Returns a validation error for a malformed draft, or a network error.
    async fn create_event(&self, game: GameId, draft: &EventDraft) -> Result<Event>;

    /// Append one log entry.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the count is below 1 or above the
    /// backend's bulk limit, or a network error.
    async fn log_outcome(&self, request: &LogRequest) -> Result<()>;

    /// Server-side aggregation for one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the event does not exist.
    async fn get_stats(
        &self,
        event: EventId,
        contributor: Option<&ContributorId>,
    ) -> Result<RemoteStats>;

    /// Every log row attributed to the contributor, for backup.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn export_logs(&self, contributor: &ContributorId) -> Result<Vec<LogRecord>>;
}
