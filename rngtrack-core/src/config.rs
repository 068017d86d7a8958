//! Engine configuration loaded from JSON with defaults for every field.
use serde::{Deserialize, Serialize};

/// Whether imported (replayed) log entries count toward statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPolicy {
    /// Imported entries count like organic ones.
    #[default]
    Include,
    /// Imported entries are left out of both scopes.
    Exclude,
}

/// How import replays are dispatched to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReplayMode {
    #[default]
    Sequential,
    /// Independent writes with at most `max_in_flight` outstanding.
    Concurrent { max_in_flight: usize },
}

/// Cut-offs for display classification, compared against unrounded deviations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationThresholds {
    /// Percentage points before a multi-outcome deviation is worth highlighting.
    #[serde(default = "default_notable_points")]
    pub notable_points: f64,
    #[serde(default = "default_large_points")]
    pub large_points: f64,
    /// Absolute hits before a binary deviation is worth highlighting.
    #[serde(default = "default_notable_hits")]
    pub notable_hits: f64,
    #[serde(default = "default_large_hits")]
    pub large_hits: f64,
}

impl Default for DeviationThresholds {
    fn default() -> Self {
        Self {
            notable_points: default_notable_points(),
            large_points: default_large_points(),
            notable_hits: default_notable_hits(),
            large_hits: default_large_hits(),
        }
    }
}

fn default_notable_points() -> f64 {
    1.0
}

fn default_large_points() -> f64 {
    10.0
}

fn default_notable_hits() -> f64 {
    1.0
}

fn default_large_hits() -> f64 {
    5.0
}

fn default_bulk_limit() -> u32 {
    1000
}

fn default_min_search_len() -> usize {
    3
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub import_policy: ImportPolicy,
    /// Largest `count` accepted for one bulk log.
    #[serde(default = "default_bulk_limit")]
    pub bulk_limit: u32,
    /// Catalog searches shorter than this return nothing without a request.
    #[serde(default = "default_min_search_len")]
    pub min_search_len: usize,
    #[serde(default)]
    pub replay: ReplayMode,
    #[serde(default)]
    pub thresholds: DeviationThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl EngineConfig {
    #[must_use]
    pub fn default_config() -> Self {
        Self {
            import_policy: ImportPolicy::default(),
            bulk_limit: default_bulk_limit(),
            min_search_len: default_min_search_len(),
            replay: ReplayMode::default(),
            thresholds: DeviationThresholds::default(),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed into a configuration.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Replay concurrency, never below one.
    #[must_use]
    pub fn replay_width(&self) -> usize {
        match self.replay {
            ReplayMode::Sequential => 1,
            ReplayMode::Concurrent { max_in_flight } => max_in_flight.max(1),
        }
    }
}
