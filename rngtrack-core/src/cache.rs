//! View cache for the active game: events with their tallies and derived stats.
//!
//! The cache never fetches by itself. The controller takes a [`LoadTicket`]
//! before a request and hands the response back through [`ViewCache::apply`],
//! which drops responses whose ticket has been superseded.
use std::collections::BTreeMap;

use crate::config::ImportPolicy;
use crate::error::{Result, TrackerError};
use crate::ledger::{Event, EventId, GameId};
use crate::session::SessionContext;
use crate::stats::{CountSource, StatsReport, compute_stats};

/// Identifies one in-flight event-list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    pub game: GameId,
    pub generation: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ViewCache {
    loaded_game: Option<GameId>,
    generation: u64,
    events: Vec<Event>,
    stats_by_event: BTreeMap<EventId, StatsReport>,
}

impl ViewCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Game whose events are currently held, if any.
    #[must_use]
    pub const fn loaded_game(&self) -> Option<GameId> {
        self.loaded_game
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[must_use]
    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.events.iter().find(|event| event.id == id)
    }

    #[must_use]
    pub fn stats(&self, id: EventId) -> Option<&StatsReport> {
        self.stats_by_event.get(&id)
    }

    #[must_use]
    pub const fn stats_by_event(&self) -> &BTreeMap<EventId, StatsReport> {
        &self.stats_by_event
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Issue a ticket for a fresh event list, invalidating earlier tickets.
    ///
    /// Data for a different game is dropped immediately; a reload of the
    /// loaded game keeps showing the old events until the response lands.
    pub fn begin_load(&mut self, game: GameId) -> LoadTicket {
        if self.loaded_game == Some(game) {
            self.generation = self.generation.wrapping_add(1);
        } else {
            self.discard();
        }
        LoadTicket {
            game,
            generation: self.generation,
        }
    }

    #[must_use]
    pub fn is_current(&self, ticket: LoadTicket, session: &SessionContext) -> bool {
        ticket.generation == self.generation && session.active_game_id == Some(ticket.game)
    }

    /// Store a fetched event list and derive stats for the session's scope.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::StaleResponse`] and leaves the cache untouched
    /// when the ticket no longer matches the latest load or the active game.
    pub fn apply(
        &mut self,
        ticket: LoadTicket,
        events: Vec<Event>,
        session: &SessionContext,
        import_policy: ImportPolicy,
    ) -> Result<()> {
        if !self.is_current(ticket, session) {
            return Err(TrackerError::StaleResponse {
                game: ticket.game,
                generation: ticket.generation,
            });
        }
        log::debug!(
            "caching {} event(s) for game {} (generation {})",
            events.len(),
            ticket.game,
            ticket.generation
        );
        self.loaded_game = Some(ticket.game);
        self.events = events;
        self.rederive(session, import_policy);
        Ok(())
    }

    /// Recompute every report from the cached tallies. No I/O.
    pub fn rederive(&mut self, session: &SessionContext, import_policy: ImportPolicy) {
        let query = session.query(import_policy);
        self.stats_by_event = self
            .events
            .iter()
            .filter_map(
                |event| match compute_stats(event, CountSource::EventTallies, &query) {
                    Ok(report) => Some((event.id, report)),
                    Err(err) => {
                        log::warn!("event {}: statistics unavailable: {err}", event.id);
                        None
                    }
                },
            )
            .collect();
    }

    /// Drop everything and invalidate outstanding tickets.
    pub fn discard(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.loaded_game = None;
        self.events.clear();
        self.stats_by_event.clear();
    }
}
