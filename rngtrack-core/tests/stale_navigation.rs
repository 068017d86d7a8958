use std::cell::RefCell;

use futures::channel::oneshot;
use futures::executor::block_on;
use rngtrack_core::{
    ContributorId, DataSource, EngineConfig, Event, EventDraft, EventId, Game, GameDraft, GameId,
    LogRecord, LogRequest, MemoryBackend, MemoryIdentity, Refresh, RemoteStats, Result, Tracker,
};

/// Delegates to a [`MemoryBackend`] but can hold one game's event list, or
/// the next write, until released.
struct GatedSource {
    inner: MemoryBackend,
    gated_game: GameId,
    gate: RefCell<Option<oneshot::Receiver<()>>>,
    write_gate: RefCell<Option<oneshot::Receiver<()>>>,
}

impl GatedSource {
    fn new(inner: MemoryBackend, gated_game: GameId) -> Self {
        Self {
            inner,
            gated_game,
            gate: RefCell::new(None),
            write_gate: RefCell::new(None),
        }
    }

    fn hold_events(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *self.gate.borrow_mut() = Some(gate);
        release
    }

    fn hold_next_write(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *self.write_gate.borrow_mut() = Some(gate);
        release
    }
}

#[async_trait::async_trait(?Send)]
impl DataSource for GatedSource {
    async fn list_games(&self) -> Result<Vec<Game>> {
        self.inner.list_games().await
    }

    async fn my_games(&self, contributor: &ContributorId) -> Result<Vec<Game>> {
        self.inner.my_games(contributor).await
    }

    async fn search_games(&self, query: &str) -> Result<Vec<Game>> {
        self.inner.search_games(query).await
    }

    async fn create_game(&self, draft: &GameDraft) -> Result<Game> {
        self.inner.create_game(draft).await
    }

    async fn list_events(
        &self,
        game: GameId,
        contributor: Option<&ContributorId>,
    ) -> Result<Vec<Event>> {
        if game == self.gated_game {
            let gate = self.gate.borrow_mut().take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
        }
        self.inner.list_events(game, contributor).await
    }

    async fn create_event(&self, game: GameId, draft: &EventDraft) -> Result<Event> {
        self.inner.create_event(game, draft).await
    }

    async fn log_outcome(&self, request: &LogRequest) -> Result<()> {
        let gate = self.write_gate.borrow_mut().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.inner.log_outcome(request).await
    }

    async fn get_stats(
        &self,
        event: EventId,
        contributor: Option<&ContributorId>,
    ) -> Result<RemoteStats> {
        self.inner.get_stats(event, contributor).await
    }

    async fn export_logs(&self, contributor: &ContributorId) -> Result<Vec<LogRecord>> {
        self.inner.export_logs(contributor).await
    }
}

fn game_with_event(backend: &MemoryBackend, name: &str) -> (GameId, EventId) {
    let game = block_on(backend.create_game(&GameDraft {
        name: name.to_string(),
        image_url: None,
    }))
    .unwrap();
    let event = block_on(backend.create_event(
        game.id,
        &EventDraft::multi_outcome(format!("{name} loot"), &[("Gem", 0.1)]),
    ))
    .unwrap();
    (game.id, event.id)
}

#[test]
fn late_response_for_previous_game_is_discarded() {
    let backend = MemoryBackend::new();
    let (game_a, event_a) = game_with_event(&backend, "Alpha");
    let (game_b, event_b) = game_with_event(&backend, "Beta");

    let source = GatedSource::new(backend, game_a);
    let release = source.hold_events();
    let identity = MemoryIdentity::with_id(ContributorId::parse("me").unwrap());
    let tracker = Tracker::new(source, identity, EngineConfig::default()).unwrap();

    let (slow, fast) = block_on(async {
        let slow = tracker.set_active_game(game_a);
        let fast = async {
            let refreshed = tracker.set_active_game(game_b).await;
            release.send(()).unwrap();
            refreshed
        };
        futures::join!(slow, fast)
    });

    assert_eq!(slow.unwrap(), Refresh::Discarded);
    assert_eq!(fast.unwrap(), Refresh::Applied);
    assert_eq!(tracker.session().active_game_id, Some(game_b));
    assert!(tracker.event_stats(event_b).is_some());
    assert!(tracker.event_stats(event_a).is_none());
    assert_eq!(tracker.with_cache(|cache| cache.loaded_game()), Some(game_b));
}

#[test]
fn errors_for_superseded_loads_are_swallowed() {
    let backend = MemoryBackend::new();
    let (game_b, _) = game_with_event(&backend, "Beta");
    let missing = GameId(9_999);

    let source = GatedSource::new(backend, missing);
    let release = source.hold_events();
    let identity = MemoryIdentity::with_id(ContributorId::parse("me").unwrap());
    let tracker = Tracker::new(source, identity, EngineConfig::default()).unwrap();

    let (slow, fast) = block_on(async {
        let slow = tracker.set_active_game(missing);
        let fast = async {
            let refreshed = tracker.set_active_game(game_b).await;
            release.send(()).unwrap();
            refreshed
        };
        futures::join!(slow, fast)
    });

    assert_eq!(slow.unwrap(), Refresh::Discarded);
    assert_eq!(fast.unwrap(), Refresh::Applied);
}

#[test]
fn reload_after_a_write_never_clears_a_newer_game() {
    let backend = MemoryBackend::new();
    let (game_a, event_a) = game_with_event(&backend, "Alpha");
    let (game_b, event_b) = game_with_event(&backend, "Beta");

    let source = GatedSource::new(backend.clone(), game_a);
    let identity = MemoryIdentity::with_id(ContributorId::parse("me").unwrap());
    let tracker = Tracker::new(source, identity, EngineConfig::default()).unwrap();
    block_on(tracker.set_active_game(game_a)).unwrap();
    let gem = tracker.events()[0].outcomes[0].id;

    let release = tracker.source().hold_next_write();
    let (write, switch) = block_on(async {
        let write = tracker.record_outcome(event_a, gem, 1);
        let switch = async {
            let refreshed = tracker.set_active_game(game_b).await;
            release.send(()).unwrap();
            refreshed
        };
        futures::join!(write, switch)
    });

    assert_eq!(write.unwrap(), Refresh::Discarded);
    assert_eq!(switch.unwrap(), Refresh::Applied);
    assert_eq!(backend.logs().len(), 1);
    assert_eq!(tracker.session().active_game_id, Some(game_b));
    assert_eq!(tracker.with_cache(|cache| cache.loaded_game()), Some(game_b));
    assert!(tracker.event_stats(event_b).is_some());
}

#[test]
fn reselecting_the_loaded_game_clears_it_until_the_reload_lands() {
    let backend = MemoryBackend::new();
    let (game_a, event_a) = game_with_event(&backend, "Alpha");

    let source = GatedSource::new(backend, game_a);
    let identity = MemoryIdentity::with_id(ContributorId::parse("me").unwrap());
    let tracker = Tracker::new(source, identity, EngineConfig::default()).unwrap();
    block_on(tracker.set_active_game(game_a)).unwrap();
    assert!(tracker.event_stats(event_a).is_some());

    let release = tracker.source().hold_events();
    let (reload, cleared) = block_on(async {
        let reload = tracker.set_active_game(game_a);
        let observe = async {
            let cleared = tracker.events().is_empty();
            release.send(()).unwrap();
            cleared
        };
        futures::join!(reload, observe)
    });

    assert!(cleared);
    assert_eq!(reload.unwrap(), Refresh::Applied);
    assert!(tracker.event_stats(event_a).is_some());
}
