//! In-process backend implementing [`DataSource`].
//!
//! Holds the same ledger the remote backend would, with call counters and
//! failure injection for tests and the scenario runner. Clones share state.
use chrono::Utc;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::DataSource;
use crate::error::{Result, TrackerError};
use crate::ledger::{
    ContributorId, Event, EventDraft, EventId, Game, GameDraft, GameId, LogEntry, LogEntryId,
    LogRecord, LogRequest, Outcome, OutcomeId, OutcomeTally,
};
use crate::stats::{CountSource, Deviation, RemoteStats, StatsQuery, compute_stats};

/// Number of calls per backend operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_games: usize,
    pub my_games: usize,
    pub search_games: usize,
    pub create_game: usize,
    pub list_events: usize,
    pub create_event: usize,
    pub log_outcome: usize,
    pub get_stats: usize,
    pub export_logs: usize,
}

impl CallCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.list_games
            + self.my_games
            + self.search_games
            + self.create_game
            + self.list_events
            + self.create_event
            + self.log_outcome
            + self.get_stats
            + self.export_logs
    }
}

#[derive(Debug)]
struct BackendState {
    games: Vec<Game>,
    events: Vec<Event>,
    logs: Vec<LogEntry>,
    catalog: Vec<Game>,
    next_id: u64,
    bulk_limit: u32,
    calls: CallCounts,
    offline: bool,
    event_lists_down: bool,
    rejected_outcomes: BTreeSet<OutcomeId>,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            games: Vec::new(),
            events: Vec::new(),
            logs: Vec::new(),
            catalog: Vec::new(),
            next_id: 1,
            bulk_limit: 1000,
            calls: CallCounts::default(),
            offline: false,
            event_lists_down: false,
            rejected_outcomes: BTreeSet::new(),
        }
    }
}

impl BackendState {
    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_online(&self) -> Result<()> {
        if self.offline {
            Err(TrackerError::Network("backend unreachable".to_string()))
        } else {
            Ok(())
        }
    }

    fn tally_for(&self, outcome_id: OutcomeId, contributor: Option<&ContributorId>) -> OutcomeTally {
        let mut tally = OutcomeTally {
            personal: contributor.map(|_| 0),
            ..OutcomeTally::default()
        };
        for entry in self.logs.iter().filter(|entry| entry.outcome_id == outcome_id) {
            let count = u64::from(entry.count);
            tally.global += count;
            if entry.is_imported {
                tally.global_imported += count;
            }
            if contributor == Some(&entry.contributor_id) {
                tally.personal = tally.personal.map(|personal| personal + count);
                if entry.is_imported {
                    tally.personal_imported += count;
                }
            }
        }
        tally
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Rc<RefCell<BackendState>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject bulk logs above `limit`.
    #[must_use]
    pub fn with_bulk_limit(self, limit: u32) -> Self {
        self.state.borrow_mut().bulk_limit = limit;
        self
    }

    /// Entries returned by catalog search.
    #[must_use]
    pub fn with_catalog(self, catalog: Vec<Game>) -> Self {
        self.state.borrow_mut().catalog = catalog;
        self
    }

    /// Make every subsequent call fail with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.state.borrow_mut().offline = offline;
    }

    /// Fail event-list reads with a network error while writes keep working.
    pub fn set_event_lists_down(&self, down: bool) {
        self.state.borrow_mut().event_lists_down = down;
    }

    /// Fail writes for one outcome with a network error.
    pub fn reject_outcome(&self, outcome_id: OutcomeId) {
        self.state.borrow_mut().rejected_outcomes.insert(outcome_id);
    }

    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.state.borrow().calls
    }

    /// Snapshot of every stored log row.
    #[must_use]
    pub fn logs(&self) -> Vec<LogEntry> {
        self.state.borrow().logs.clone()
    }

    fn record_call(&self, counter: fn(&mut CallCounts) -> &mut usize) -> Result<()> {
        let mut state = self.state.borrow_mut();
        *counter(&mut state.calls) += 1;
        state.check_online()
    }
}

#[async_trait::async_trait(?Send)]
impl DataSource for MemoryBackend {
    async fn list_games(&self) -> Result<Vec<Game>> {
        self.record_call(|calls| &mut calls.list_games)?;
        Ok(self.state.borrow().games.clone())
    }

    async fn my_games(&self, contributor: &ContributorId) -> Result<Vec<Game>> {
        self.record_call(|calls| &mut calls.my_games)?;
        let state = self.state.borrow();
        let played: BTreeSet<GameId> = state
            .logs
            .iter()
            .filter(|entry| &entry.contributor_id == contributor)
            .filter_map(|entry| {
                state
                    .events
                    .iter()
                    .find(|event| event.id == entry.event_id)
                    .map(|event| event.game_id)
            })
            .collect();
        Ok(state
            .games
            .iter()
            .filter(|game| played.contains(&game.id))
            .cloned()
            .collect())
    }

    async fn search_games(&self, query: &str) -> Result<Vec<Game>> {
        self.record_call(|calls| &mut calls.search_games)?;
        let needle = query.trim().to_lowercase();
        Ok(self
            .state
            .borrow()
            .catalog
            .iter()
            .filter(|game| game.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn create_game(&self, draft: &GameDraft) -> Result<Game> {
        self.record_call(|calls| &mut calls.create_game)?;
        let draft = draft.clone().validated()?;
        let mut state = self.state.borrow_mut();
        if let Some(existing) = state.games.iter().find(|game| game.name == draft.name) {
            return Ok(existing.clone());
        }
        let game = Game {
            id: GameId(state.allocate()),
            name: draft.name,
            image_url: draft.image_url,
        };
        state.games.push(game.clone());
        Ok(game)
    }

    async fn list_events(
        &self,
        game: GameId,
        contributor: Option<&ContributorId>,
    ) -> Result<Vec<Event>> {
        self.record_call(|calls| &mut calls.list_events)?;
        let state = self.state.borrow();
        if state.event_lists_down {
            return Err(TrackerError::Network("event list unavailable".to_string()));
        }
        if !state.games.iter().any(|candidate| candidate.id == game) {
            return Err(TrackerError::NotFound(format!("game {game}")));
        }
        Ok(state
            .events
            .iter()
            .filter(|event| event.game_id == game)
            .map(|event| {
                let mut event = event.clone();
                for outcome in &mut event.outcomes {
                    outcome.tally = state.tally_for(outcome.id, contributor);
                }
                event
            })
            .collect())
    }

    async fn create_event(&self, game: GameId, draft: &EventDraft) -> Result<Event> {
        self.record_call(|calls| &mut calls.create_event)?;
        let draft = draft.clone().validated()?;
        let mut state = self.state.borrow_mut();
        if !state.games.iter().any(|candidate| candidate.id == game) {
            return Err(TrackerError::NotFound(format!("game {game}")));
        }
        let event_id = EventId(state.allocate());
        let mut outcomes = Vec::with_capacity(draft.outcomes.len());
        for outcome in draft.outcomes {
            outcomes.push(Outcome {
                id: OutcomeId(state.allocate()),
                event_id,
                name: outcome.name,
                expected_probability: outcome.expected_probability,
                is_success: outcome.is_success,
                tally: OutcomeTally::default(),
            });
        }
        let event = Event {
            id: event_id,
            game_id: game,
            name: draft.name,
            description: draft.description,
            shape: draft.shape,
            outcomes,
        };
        state.events.push(event.clone());
        Ok(event)
    }

    async fn log_outcome(&self, request: &LogRequest) -> Result<()> {
        self.record_call(|calls| &mut calls.log_outcome)?;
        let mut state = self.state.borrow_mut();
        request.validate(state.bulk_limit)?;
        let event = state
            .events
            .iter()
            .find(|event| event.id == request.event_id)
            .ok_or_else(|| TrackerError::NotFound(format!("event {}", request.event_id)))?;
        if event.outcome(request.outcome_id).is_none() {
            return Err(TrackerError::validation(format!(
                "outcome {} does not belong to event {}",
                request.outcome_id, request.event_id
            )));
        }
        if state.rejected_outcomes.contains(&request.outcome_id) {
            return Err(TrackerError::Network("connection reset".to_string()));
        }
        let entry = LogEntry {
            id: LogEntryId(state.allocate()),
            event_id: request.event_id,
            outcome_id: request.outcome_id,
            contributor_id: request.contributor_id.clone(),
            count: request.count,
            is_imported: request.is_imported,
            created_at: Utc::now(),
        };
        state.logs.push(entry);
        Ok(())
    }

    async fn get_stats(
        &self,
        event_id: EventId,
        contributor: Option<&ContributorId>,
    ) -> Result<RemoteStats> {
        self.record_call(|calls| &mut calls.get_stats)?;
        let state = self.state.borrow();
        let event = state
            .events
            .iter()
            .find(|event| event.id == event_id)
            .ok_or_else(|| TrackerError::NotFound(format!("event {event_id}")))?;
        let entries: Vec<LogEntry> = state
            .logs
            .iter()
            .filter(|entry| entry.event_id == event_id)
            .cloned()
            .collect();

        let mut remote = RemoteStats {
            event_id: Some(event_id),
            ..RemoteStats::default()
        };
        for entry in &entries {
            let count = u64::from(entry.count);
            remote.total_attempts += count;
            *remote.outcomes.entry(entry.outcome_id).or_insert(0) += count;
            if entry.is_imported {
                *remote.imported_outcomes.entry(entry.outcome_id).or_insert(0) += count;
            }
        }
        if let Some(contributor) = contributor {
            let mut user_outcomes = BTreeMap::new();
            let mut user_total = 0;
            for entry in entries.iter().filter(|entry| &entry.contributor_id == contributor) {
                let count = u64::from(entry.count);
                user_total += count;
                *user_outcomes.entry(entry.outcome_id).or_insert(0) += count;
                if entry.is_imported {
                    *remote
                        .user_imported_outcomes
                        .entry(entry.outcome_id)
                        .or_insert(0) += count;
                }
            }
            remote.user_total_attempts = Some(user_total);
            remote.user_outcomes = Some(user_outcomes);
        }

        let global = compute_stats(event, CountSource::Entries(&entries), &StatsQuery::global())?;
        for stats in &global.outcomes {
            remote.expected_rates.insert(stats.outcome_id, stats.expected_rate);
            if let Some(percent) = stats.actual_rate.percent() {
                remote.actual_rates.insert(stats.outcome_id, percent);
            }
        }
        if let Deviation::AbsoluteCount(hits) = &global.deviation {
            remote.deviation = hits.deviation;
        }
        Ok(remote)
    }

    async fn export_logs(&self, contributor: &ContributorId) -> Result<Vec<LogRecord>> {
        self.record_call(|calls| &mut calls.export_logs)?;
        Ok(self
            .state
            .borrow()
            .logs
            .iter()
            .filter(|entry| &entry.contributor_id == contributor)
            .map(|entry| LogRecord {
                event_id: entry.event_id,
                outcome_id: entry.outcome_id,
                contributor_id: entry.contributor_id.clone(),
                count: entry.count,
                is_imported: entry.is_imported,
                created_at: Some(entry.created_at),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn me() -> ContributorId {
        ContributorId::parse("me").unwrap()
    }

    fn draft(name: &str) -> GameDraft {
        GameDraft {
            name: name.to_string(),
            image_url: None,
        }
    }

    fn request(event: &Event, outcome: usize, count: u32) -> LogRequest {
        LogRequest {
            event_id: event.id,
            outcome_id: event.outcomes[outcome].id,
            contributor_id: me(),
            count,
            is_imported: false,
        }
    }

    #[test]
    fn creating_a_game_twice_returns_the_existing_one() {
        let backend = MemoryBackend::new();
        let first = block_on(backend.create_game(&draft("Hades"))).unwrap();
        let second = block_on(backend.create_game(&draft(" Hades "))).unwrap();
        assert_eq!(first, second);
        assert_eq!(block_on(backend.list_games()).unwrap().len(), 1);
    }

    #[test]
    fn event_lists_carry_global_and_personal_tallies() {
        let backend = MemoryBackend::new();
        let game = block_on(backend.create_game(&draft("Hades"))).unwrap();
        let event = block_on(
            backend.create_event(game.id, &EventDraft::multi_outcome("Boon", &[("Zeus", 0.25)])),
        )
        .unwrap();
        block_on(backend.log_outcome(&request(&event, 0, 3))).unwrap();
        let mut other = request(&event, 0, 2);
        other.contributor_id = ContributorId::parse("someone-else").unwrap();
        block_on(backend.log_outcome(&other)).unwrap();

        let events = block_on(backend.list_events(game.id, Some(&me()))).unwrap();
        let tally = events[0].outcomes[0].tally;
        assert_eq!(tally.global, 5);
        assert_eq!(tally.personal, Some(3));

        let anonymous = block_on(backend.list_events(game.id, None)).unwrap();
        assert_eq!(anonymous[0].outcomes[0].tally.personal, None);
    }

    #[test]
    fn writes_are_validated() {
        let backend = MemoryBackend::new().with_bulk_limit(10);
        let game = block_on(backend.create_game(&draft("Hades"))).unwrap();
        let event = block_on(
            backend.create_event(game.id, &EventDraft::multi_outcome("Boon", &[("Zeus", 0.25)])),
        )
        .unwrap();

        assert!(block_on(backend.log_outcome(&request(&event, 0, 11))).is_err());
        let mut foreign = request(&event, 0, 1);
        foreign.outcome_id = OutcomeId(999);
        assert!(matches!(
            block_on(backend.log_outcome(&foreign)),
            Err(TrackerError::Validation(_))
        ));
        assert!(backend.logs().is_empty());
    }

    #[test]
    fn offline_backend_counts_the_call_and_fails() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);
        assert!(matches!(
            block_on(backend.list_games()),
            Err(TrackerError::Network(_))
        ));
        assert_eq!(backend.calls().list_games, 1);
        assert_eq!(backend.calls().total(), 1);
    }

    #[test]
    fn server_stats_and_export_reflect_the_log() {
        let backend = MemoryBackend::new();
        let game = block_on(backend.create_game(&draft("Diablo"))).unwrap();
        let event = block_on(backend.create_event(game.id, &EventDraft::binary("Crit", 0.2))).unwrap();
        block_on(backend.log_outcome(&request(&event, 0, 4))).unwrap();
        block_on(backend.log_outcome(&request(&event, 1, 6))).unwrap();

        let remote = block_on(backend.get_stats(event.id, Some(&me()))).unwrap();
        assert_eq!(remote.total_attempts, 10);
        assert_eq!(remote.user_total_attempts, Some(10));
        assert!((remote.deviation.unwrap() - 2.0).abs() < 1e-9);

        let exported = block_on(backend.export_logs(&me())).unwrap();
        assert_eq!(exported.iter().map(|record| record.count).sum::<u32>(), 10);
        assert_eq!(block_on(backend.my_games(&me())).unwrap(), vec![game]);
    }
}
