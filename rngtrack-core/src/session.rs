//! Explicit session context owned by the controller and passed to the cache.
use serde::{Deserialize, Serialize};

use crate::config::ImportPolicy;
use crate::ledger::{ContributorId, EventId, GameId};
use crate::stats::{Scope, StatsQuery};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub contributor_id: ContributorId,
    #[serde(default)]
    pub active_game_id: Option<GameId>,
    #[serde(default)]
    pub active_event_id: Option<EventId>,
    #[serde(default)]
    pub scope: Scope,
}

impl SessionContext {
    #[must_use]
    pub const fn new(contributor_id: ContributorId) -> Self {
        Self {
            contributor_id,
            active_game_id: None,
            active_event_id: None,
            scope: Scope::Global,
        }
    }

    /// Query for the current scope; personal queries use this session's contributor.
    #[must_use]
    pub fn query(&self, import_policy: ImportPolicy) -> StatsQuery<'_> {
        let query = match self.scope {
            Scope::Global => StatsQuery::global(),
            Scope::Personal => StatsQuery::personal(&self.contributor_id),
        };
        query.with_import_policy(import_policy)
    }

    /// Point the session at a game, forgetting any selected event.
    pub fn select_game(&mut self, game_id: GameId) {
        self.active_game_id = Some(game_id);
        self.active_event_id = None;
    }

    pub fn clear_navigation(&mut self) {
        self.active_game_id = None;
        self.active_event_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_round_trips_through_json() {
        let mut session = SessionContext::new(ContributorId::parse("device-1").unwrap());
        session.select_game(GameId(3));
        session.active_event_id = Some(EventId(9));
        session.scope = Scope::Personal;

        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"scope\":\"personal\""));
        let restored: SessionContext = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn selecting_a_game_clears_the_event() {
        let mut session = SessionContext::new(ContributorId::parse("device-1").unwrap());
        session.active_event_id = Some(EventId(2));
        session.select_game(GameId(1));
        assert_eq!(session.active_event_id, None);

        let query = session.query(ImportPolicy::Include);
        assert_eq!(query.scope, Scope::Global);
        session.scope = Scope::Personal;
        assert_eq!(
            session.query(ImportPolicy::Include).contributor,
            Some(&session.contributor_id)
        );
    }
}
