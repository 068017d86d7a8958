//! Controller tying the data source, identity store, session and view cache together.
//!
//! All methods take `&self`; state lives in `RefCell`s and no borrow is held
//! across an await, so overlapping calls from one thread are safe.
use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::cache::ViewCache;
use crate::config::EngineConfig;
use crate::error::{Result, TrackerError};
use crate::identity::{IdentityStore, load_or_create, storage_error};
use crate::ledger::{
    Backup, ContributorId, Event, EventDraft, EventId, Game, GameDraft, GameId, LogRequest,
    OutcomeId,
};
use crate::merge::{ImportPayload, MergeDecisions, MergePlan, MergeResult, plan_import, replay_logs};
use crate::session::SessionContext;
use crate::stats::{Scope, StatsReport};
use crate::DataSource;

/// Fate of an event-list response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    /// The response populated the cache.
    Applied,
    /// A newer navigation superseded the request; the response was dropped.
    Discarded,
    /// The preceding write was stored but the reload failed. The cache still
    /// shows the state from before the write; do not repeat the write.
    Failed(String),
}

impl Refresh {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

pub struct Tracker<D, I>
where
    D: DataSource,
    I: IdentityStore,
{
    source: D,
    identity: I,
    config: EngineConfig,
    session: RefCell<SessionContext>,
    cache: RefCell<ViewCache>,
}

impl<D, I> Tracker<D, I>
where
    D: DataSource,
    I: IdentityStore,
{
    /// Create a tracker, loading or creating the contributor identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Storage`] when the identity store fails.
    pub fn new(source: D, identity: I, config: EngineConfig) -> Result<Self> {
        let contributor = load_or_create(&identity)?;
        log::info!("tracker ready for contributor {contributor}");
        Ok(Self {
            source,
            identity,
            config,
            session: RefCell::new(SessionContext::new(contributor)),
            cache: RefCell::new(ViewCache::new()),
        })
    }

    pub const fn source(&self) -> &D {
        &self.source
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> SessionContext {
        self.session.borrow().clone()
    }

    pub fn contributor_id(&self) -> ContributorId {
        self.session.borrow().contributor_id.clone()
    }

    pub fn scope(&self) -> Scope {
        self.session.borrow().scope
    }

    /// Run `f` against the view cache.
    pub fn with_cache<R>(&self, f: impl FnOnce(&ViewCache) -> R) -> R {
        f(&self.cache.borrow())
    }

    pub fn events(&self) -> Vec<Event> {
        self.cache.borrow().events().to_vec()
    }

    /// Cached report for `event_id` in the current scope.
    pub fn event_stats(&self, event_id: EventId) -> Option<StatsReport> {
        self.cache.borrow().stats(event_id).cloned()
    }

    pub fn all_stats(&self) -> BTreeMap<EventId, StatsReport> {
        self.cache.borrow().stats_by_event().clone()
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_games(&self) -> Result<Vec<Game>> {
        self.source.list_games().await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn my_games(&self) -> Result<Vec<Game>> {
        let contributor = self.contributor_id();
        self.source.my_games(&contributor).await
    }

    /// Catalog search; queries shorter than the configured minimum return
    /// nothing without a request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn search_games(&self, query: &str) -> Result<Vec<Game>> {
        let query = query.trim();
        if query.chars().count() < self.config.min_search_len {
            return Ok(Vec::new());
        }
        self.source.search_games(query).await
    }

    /// # Errors
    ///
    /// Returns a validation error for a blank name, or the source's error.
    pub async fn create_game(&self, draft: GameDraft) -> Result<Game> {
        let draft = draft.validated()?;
        let game = self.source.create_game(&draft).await?;
        log::info!("game {} ({}) ready", game.id, game.name);
        Ok(game)
    }

    /// Make `game` active and load its events.
    ///
    /// Cached events are dropped before the request goes out, even when `game`
    /// is already loaded, and a slow response for an earlier selection is
    /// discarded on arrival.
    ///
    /// # Errors
    ///
    /// Returns the source's error when the load for the still-active game fails.
    pub async fn set_active_game(&self, game: GameId) -> Result<Refresh> {
        self.session.borrow_mut().select_game(game);
        self.cache.borrow_mut().discard();
        self.refresh(game).await
    }

    /// Select one of the cached events.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::NotFound`] when the event is not loaded.
    pub fn select_event(&self, event_id: EventId) -> Result<()> {
        if self.cache.borrow().event(event_id).is_none() {
            return Err(TrackerError::NotFound(format!("event {event_id}")));
        }
        self.session.borrow_mut().active_event_id = Some(event_id);
        Ok(())
    }

    /// Switch scope by re-deriving from cached tallies. Never fetches.
    pub fn toggle_scope(&self, scope: Scope) {
        let mut session = self.session.borrow_mut();
        if session.scope == scope {
            return;
        }
        session.scope = scope;
        self.cache
            .borrow_mut()
            .rederive(&session, self.config.import_policy);
        log::debug!("scope switched to {scope}");
    }

    /// Create an event in the active game and reload the game's events.
    ///
    /// A failed reload is logged; the created event is still returned.
    ///
    /// # Errors
    ///
    /// Returns a validation error when no game is active or the draft is
    /// malformed, or the source's error.
    pub async fn create_event(&self, draft: EventDraft) -> Result<Event> {
        let game = self.active_game()?;
        let draft = draft.validated()?;
        let event = self.source.create_event(game, &draft).await?;
        log::info!("event {} ({}) created in game {game}", event.id, event.name);
        self.reload_after_write(game).await;
        Ok(event)
    }

    /// Log `count` occurrences of an outcome, then reload so the cache shows
    /// the backend's counts.
    ///
    /// A failed write leaves the cache exactly as it was. Once the write is
    /// stored this returns `Ok`; a reload that fails afterwards is reported as
    /// [`Refresh::Failed`] so the caller does not log the outcome twice.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown event or outcome or a count
    /// outside `1..=bulk_limit`; otherwise the source's error for the write.
    pub async fn record_outcome(
        &self,
        event_id: EventId,
        outcome_id: OutcomeId,
        count: u32,
    ) -> Result<Refresh> {
        let game = self.active_game()?;
        let known = self
            .cache
            .borrow()
            .event(event_id)
            .map(|event| event.outcome(outcome_id).is_some());
        match known {
            None => return Err(TrackerError::validation(format!("unknown event {event_id}"))),
            Some(false) => {
                return Err(TrackerError::validation(format!(
                    "outcome {outcome_id} does not belong to event {event_id}"
                )));
            }
            Some(true) => {}
        }
        let request = LogRequest {
            event_id,
            outcome_id,
            contributor_id: self.contributor_id(),
            count,
            is_imported: false,
        };
        request.validate(self.config.bulk_limit)?;
        self.source.log_outcome(&request).await?;
        log::debug!("logged {count} x outcome {outcome_id} for event {event_id}");
        Ok(self.reload_after_write(game).await)
    }

    /// Derive a report from the backend's aggregated counts for one cached event.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::NotFound`] when the event is not loaded, or the
    /// source's error.
    pub async fn remote_stats(&self, event_id: EventId) -> Result<StatsReport> {
        let event = self
            .cache
            .borrow()
            .event(event_id)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("event {event_id}")))?;
        let contributor = self.contributor_id();
        let remote = self.source.get_stats(event_id, Some(&contributor)).await?;
        let session = self.session();
        remote.report(&event, &session.query(self.config.import_policy))
    }

    /// Fetch every log attributed to the current contributor as a backup.
    ///
    /// # Errors
    ///
    /// Returns the source's error.
    pub async fn export_backup(&self) -> Result<Backup> {
        let contributor = self.contributor_id();
        let logs = self.source.export_logs(&contributor).await?;
        log::info!("exported {} log row(s)", logs.len());
        Ok(Backup {
            contributor_id: Some(contributor),
            logs,
        })
    }

    /// Plan an import against the identity currently in use. No side effects.
    pub fn plan_import(&self, payload: ImportPayload) -> MergePlan {
        plan_import(payload, &self.contributor_id())
    }

    /// Plan the import of a backup, refusing records above the bulk limit.
    pub fn plan_backup(&self, backup: Backup) -> MergePlan {
        self.plan_import(ImportPayload::from_backup(backup, self.config.bulk_limit))
    }

    /// Carry out an import plan according to the user's decisions.
    ///
    /// Identity adoption persists the new identifier and drops the cache.
    /// Replay is best-effort; individual failures are reported in the result.
    /// The active game is reloaded afterwards when anything changed.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the plan was made for a different
    /// identity than the current one, or [`TrackerError::Storage`] when the
    /// new identity cannot be persisted.
    pub async fn apply_import(&self, plan: MergePlan, decisions: MergeDecisions) -> Result<MergeResult> {
        let mut result = MergeResult::default();
        if decisions.adopt_identity
            && let Some(change) = plan.identity_change
        {
            if change.from != self.contributor_id() {
                return Err(TrackerError::validation(
                    "import plan was made for a different identity",
                ));
            }
            self.adopt_identity(change.to)?;
            result.identity_adopted = true;
        }

        if decisions.replay_logs && !plan.replay.is_empty() {
            let contributor = self.contributor_id();
            let replayed = replay_logs(
                &self.source,
                &plan.replay,
                &contributor,
                self.config.replay_width(),
            )
            .await;
            result.attempted = replayed.attempted;
            result.succeeded = replayed.succeeded;
            result.failures = replayed.failures;
        }
        if decisions.replay_logs && !plan.rejected.is_empty() {
            result.attempted += plan.rejected.len();
            result.failures.extend(plan.rejected);
        }

        let active = self.session.borrow().active_game_id;
        if result.changed_anything()
            && let Some(game) = active
            && let Err(err) = self.refresh(game).await
        {
            log::warn!("reload after import failed: {err}");
        }
        Ok(result)
    }

    /// Forget navigation and cached data. The identity is kept.
    pub fn log_out(&self) {
        self.session.borrow_mut().clear_navigation();
        self.cache.borrow_mut().discard();
        log::debug!("session cleared");
    }

    fn active_game(&self) -> Result<GameId> {
        self.session
            .borrow()
            .active_game_id
            .ok_or_else(|| TrackerError::validation("no game selected"))
    }

    fn adopt_identity(&self, contributor: ContributorId) -> Result<()> {
        self.identity.save(&contributor).map_err(storage_error)?;
        log::info!("adopted contributor id {contributor}");
        self.session.borrow_mut().contributor_id = contributor;
        self.cache.borrow_mut().discard();
        Ok(())
    }

    /// Reload after a stored write. Errors become [`Refresh::Failed`].
    async fn reload_after_write(&self, game: GameId) -> Refresh {
        match self.refresh(game).await {
            Ok(refresh) => refresh,
            Err(err) => {
                log::warn!("write stored but reloading game {game} failed: {err}");
                Refresh::Failed(err.to_string())
            }
        }
    }

    async fn refresh(&self, game: GameId) -> Result<Refresh> {
        if self.session.borrow().active_game_id != Some(game) {
            log::debug!("game {game} is no longer active; skipping reload");
            return Ok(Refresh::Discarded);
        }
        let ticket = self.cache.borrow_mut().begin_load(game);
        let contributor = self.contributor_id();
        let fetched = self.source.list_events(game, Some(&contributor)).await;

        let session = self.session.borrow();
        let mut cache = self.cache.borrow_mut();
        if !cache.is_current(ticket, &session) {
            log::debug!(
                "dropping event list for game {game} (generation {})",
                ticket.generation
            );
            return Ok(Refresh::Discarded);
        }
        cache.apply(ticket, fetched?, &session, self.config.import_policy)?;
        Ok(Refresh::Applied)
    }
}
