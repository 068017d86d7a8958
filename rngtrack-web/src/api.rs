//! [`DataSource`] over the browser `fetch` API.
use rngtrack_core::{
    ContributorId, DataSource, Event, EventDraft, EventId, Game, GameDraft, GameId, LogRecord,
    LogRequest, RemoteStats, Result, TrackerError,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::dom;
use crate::endpoints::Endpoints;
use crate::errors::error_for_status;

#[derive(Debug, Clone, Default)]
pub struct FetchDataSource {
    endpoints: Endpoints,
}

impl FetchDataSource {
    #[must_use]
    pub const fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }

    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    #[allow(clippy::future_not_send)]
    async fn request(&self, method: &str, url: &str, body: Option<String>) -> Result<String> {
        log::debug!("{method} {url}");
        let reply = dom::fetch_text(method, url, body.as_deref())
            .await
            .map_err(|err| TrackerError::Network(dom::js_error_message(&err)))?;
        if reply.is_success() {
            Ok(reply.body)
        } else {
            let err = error_for_status(reply.status, &reply.body);
            log::warn!("{method} {url} failed: {err}");
            Err(err)
        }
    }

    #[allow(clippy::future_not_send)]
    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.request("GET", url, None).await?;
        decode(&body)
    }

    #[allow(clippy::future_not_send)]
    async fn post<B: Serialize + ?Sized>(&self, url: &str, payload: &B) -> Result<String> {
        let json = serde_json::to_string(payload)
            .map_err(|err| TrackerError::validation(format!("cannot encode request: {err}")))?;
        self.request("POST", url, Some(json)).await
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|err| TrackerError::Network(format!("unexpected response body: {err}")))
}

#[async_trait::async_trait(?Send)]
impl DataSource for FetchDataSource {
    async fn list_games(&self) -> Result<Vec<Game>> {
        self.get(&self.endpoints.games()).await
    }

    async fn my_games(&self, contributor: &ContributorId) -> Result<Vec<Game>> {
        self.get(&self.endpoints.my_games(contributor)).await
    }

    async fn search_games(&self, query: &str) -> Result<Vec<Game>> {
        self.get(&self.endpoints.search_games(query)).await
    }

    async fn create_game(&self, draft: &GameDraft) -> Result<Game> {
        let body = self.post(&self.endpoints.games(), draft).await?;
        decode(&body)
    }

    async fn list_events(
        &self,
        game: GameId,
        contributor: Option<&ContributorId>,
    ) -> Result<Vec<Event>> {
        self.get(&self.endpoints.events(game, contributor)).await
    }

    async fn create_event(&self, game: GameId, draft: &EventDraft) -> Result<Event> {
        let body = self.post(&self.endpoints.events(game, None), draft).await?;
        decode(&body)
    }

    async fn log_outcome(&self, request: &LogRequest) -> Result<()> {
        // The created rows are echoed back; the caller refetches instead.
        self.post(&self.endpoints.logs(), request).await.map(drop)
    }

    async fn get_stats(
        &self,
        event: EventId,
        contributor: Option<&ContributorId>,
    ) -> Result<RemoteStats> {
        self.get(&self.endpoints.stats(event, contributor)).await
    }

    async fn export_logs(&self, contributor: &ContributorId) -> Result<Vec<LogRecord>> {
        self.get(&self.endpoints.export(contributor)).await
    }
}
