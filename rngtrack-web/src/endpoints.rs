//! URL construction for the REST backend.
//!
//! When `RNGTRACK_API_BASE` is set at compile time (e.g. `https://api.example.org`),
//! every URL is prefixed with it. Builds without it talk to `/api` on the
//! page's own origin.
use rngtrack_core::{ContributorId, EventId, GameId};

const DEFAULT_BASE: &str = "/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(option_env!("RNGTRACK_API_BASE").unwrap_or(DEFAULT_BASE))
    }
}

impl Endpoints {
    #[must_use]
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub fn games(&self) -> String {
        self.path("games/")
    }

    #[must_use]
    pub fn my_games(&self, contributor: &ContributorId) -> String {
        format!("{}?user_id={}", self.path("games/my/"), encode_component(contributor.as_str()))
    }

    #[must_use]
    pub fn search_games(&self, query: &str) -> String {
        format!("{}?query={}", self.path("search-games/"), encode_component(query))
    }

    #[must_use]
    pub fn events(&self, game: GameId, contributor: Option<&ContributorId>) -> String {
        let url = self.path(&format!("games/{game}/events/"));
        with_user(url, contributor)
    }

    #[must_use]
    pub fn logs(&self) -> String {
        self.path("logs/")
    }

    #[must_use]
    pub fn stats(&self, event: EventId, contributor: Option<&ContributorId>) -> String {
        with_user(self.path(&format!("stats/{event}")), contributor)
    }

    #[must_use]
    pub fn export(&self, contributor: &ContributorId) -> String {
        with_user(self.path("logs/export/"), Some(contributor))
    }

    fn path(&self, relative: &str) -> String {
        format!("{}/{}", self.base, relative.trim_start_matches('/'))
    }
}

fn with_user(url: String, contributor: Option<&ContributorId>) -> String {
    match contributor {
        Some(id) => format!("{url}?user_id={}", encode_component(id.as_str())),
        None => url,
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
#[must_use]
pub fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> ContributorId {
        ContributorId::parse("5f0c-aa").unwrap()
    }

    #[test]
    fn base_is_normalized() {
        let endpoints = Endpoints::new(" https://api.example.org/ ");
        assert_eq!(endpoints.base(), "https://api.example.org");
        assert_eq!(endpoints.games(), "https://api.example.org/games/");
        assert_eq!(Endpoints::new("/api").logs(), "/api/logs/");
    }

    #[test]
    fn contributor_scoped_urls_carry_user_id() {
        let endpoints = Endpoints::new("/api");
        assert_eq!(endpoints.my_games(&me()), "/api/games/my/?user_id=5f0c-aa");
        assert_eq!(
            endpoints.events(GameId(3), Some(&me())),
            "/api/games/3/events/?user_id=5f0c-aa"
        );
        assert_eq!(endpoints.events(GameId(3), None), "/api/games/3/events/");
        assert_eq!(endpoints.stats(EventId(9), None), "/api/stats/9");
        assert_eq!(endpoints.export(&me()), "/api/logs/export/?user_id=5f0c-aa");
    }

    #[test]
    fn search_queries_are_encoded() {
        let endpoints = Endpoints::new("/api");
        assert_eq!(
            endpoints.search_games("Baldur's Gate 3"),
            "/api/search-games/?query=Baldur%27s%20Gate%203"
        );
        assert_eq!(encode_component("ä&="), "%C3%A4%26%3D");
    }
}
