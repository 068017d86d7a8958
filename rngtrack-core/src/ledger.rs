//! Outcome ledger model: games, events, outcomes and the append-only log.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TrackerError};

macro_rules! ledger_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

ledger_id!(
    /// Backend identifier of a game.
    GameId
);
ledger_id!(
    /// Backend identifier of a tracked event.
    EventId
);
ledger_id!(
    /// Backend identifier of one outcome of an event.
    OutcomeId
);
ledger_id!(LogEntryId);

/// Opaque per-user or per-device token that partitions personal statistics.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContributorId(String);

impl ContributorId {
    /// Accept a raw identifier, rejecting blank input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<uuid::Uuid> for ContributorId {
    fn from(value: uuid::Uuid) -> Self {
        Self(value.hyphenated().to_string())
    }
}

impl fmt::Display for ContributorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// How an event declares its expected probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventShape {
    /// Legacy shape: one success probability for the whole event.
    Binary { probability: f64 },
    /// Every outcome carries its own expected probability.
    MultiOutcome,
}

impl EventShape {
    #[must_use]
    pub const fn is_binary(self) -> bool {
        matches!(self, Self::Binary { .. })
    }
}

/// Pre-summed counts for one outcome as delivered with the event list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTally {
    #[serde(default)]
    pub global: u64,
    /// Portion of `global` that came from imports.
    #[serde(default)]
    pub global_imported: u64,
    /// Absent when the event list was fetched without a contributor.
    #[serde(default)]
    pub personal: Option<u64>,
    #[serde(default)]
    pub personal_imported: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: OutcomeId,
    pub event_id: EventId,
    pub name: String,
    /// Expected probability in `0.0..=1.0`.
    #[serde(default)]
    pub expected_probability: f64,
    #[serde(default)]
    pub is_success: bool,
    #[serde(default)]
    pub tally: OutcomeTally,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub game_id: GameId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub shape: EventShape,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
}

impl Event {
    #[must_use]
    pub fn outcome(&self, id: OutcomeId) -> Option<&Outcome> {
        self.outcomes.iter().find(|outcome| outcome.id == id)
    }
}

/// One append-only row of the outcome log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: LogEntryId,
    pub event_id: EventId,
    pub outcome_id: OutcomeId,
    pub contributor_id: ContributorId,
    pub count: u32,
    #[serde(default)]
    pub is_imported: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDraft {
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl GameDraft {
    /// Trim the name and drop a blank image URL.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the name is blank.
    pub fn validated(self) -> Result<Self> {
        let name = require_name(&self.name, "game")?;
        let image_url = self
            .image_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        Ok(Self { name, image_url })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeDraft {
    pub name: String,
    #[serde(default)]
    pub expected_probability: f64,
    #[serde(default)]
    pub is_success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub shape: EventShape,
    pub outcomes: Vec<OutcomeDraft>,
}

impl EventDraft {
    /// Multi-outcome event where each outcome declares its own probability.
    #[must_use]
    pub fn multi_outcome(name: impl Into<String>, outcomes: &[(&str, f64)]) -> Self {
        Self {
            name: name.into(),
            description: None,
            shape: EventShape::MultiOutcome,
            outcomes: outcomes
                .iter()
                .map(|(name, probability)| OutcomeDraft {
                    name: (*name).to_string(),
                    expected_probability: *probability,
                    is_success: false,
                })
                .collect(),
        }
    }

    /// Legacy success/failure event with one aggregate probability.
    #[must_use]
    pub fn binary(name: impl Into<String>, probability: f64) -> Self {
        Self {
            name: name.into(),
            description: None,
            shape: EventShape::Binary { probability },
            outcomes: vec![
                OutcomeDraft {
                    name: "Success".to_string(),
                    expected_probability: probability,
                    is_success: true,
                },
                OutcomeDraft {
                    name: "Failure".to_string(),
                    expected_probability: 1.0 - probability,
                    is_success: false,
                },
            ],
        }
    }

    /// Check names and probabilities before dispatch, trimming names.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank names, an empty outcome list,
    /// probabilities outside `0.0..=1.0`, or a binary event without a success outcome.
    pub fn validated(self) -> Result<Self> {
        let name = require_name(&self.name, "event")?;
        if self.outcomes.is_empty() {
            return Err(TrackerError::validation(
                "an event needs at least one outcome",
            ));
        }
        if let EventShape::Binary { probability } = self.shape {
            check_probability(probability)?;
            if !self.outcomes.iter().any(|outcome| outcome.is_success) {
                return Err(TrackerError::validation(
                    "a binary event needs a success outcome",
                ));
            }
        }
        let mut outcomes = Vec::with_capacity(self.outcomes.len());
        for outcome in self.outcomes {
            check_probability(outcome.expected_probability)?;
            outcomes.push(OutcomeDraft {
                name: require_name(&outcome.name, "outcome")?,
                ..outcome
            });
        }
        let description = self
            .description
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        Ok(Self {
            name,
            description,
            shape: self.shape,
            outcomes,
        })
    }
}

/// Write request for one or more identical outcome occurrences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRequest {
    pub event_id: EventId,
    pub outcome_id: OutcomeId,
    #[serde(rename = "user_id")]
    pub contributor_id: ContributorId,
    pub count: u32,
    #[serde(default)]
    pub is_imported: bool,
}

impl LogRequest {
    /// # Errors
    ///
    /// Returns a validation error when `count` is zero or above `bulk_limit`.
    pub fn validate(&self, bulk_limit: u32) -> Result<()> {
        if self.count < 1 {
            return Err(TrackerError::validation("count must be at least 1"));
        }
        if self.count > bulk_limit {
            return Err(TrackerError::validation(format!(
                "count {} exceeds the bulk limit of {bulk_limit}",
                self.count
            )));
        }
        Ok(())
    }
}

/// Exported log row, as returned by the backend's export endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub event_id: EventId,
    pub outcome_id: OutcomeId,
    #[serde(rename = "user_id")]
    pub contributor_id: ContributorId,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub is_imported: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_count() -> u32 {
    1
}

/// Minimal reference to a historical log, replayed as a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRef {
    pub event_id: EventId,
    pub outcome_id: OutcomeId,
}

/// Backup file written by export and read back by import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    #[serde(default)]
    pub contributor_id: Option<ContributorId>,
    #[serde(default)]
    pub logs: Vec<LogRecord>,
}

impl Backup {
    /// # Errors
    ///
    /// Returns an error if the JSON is not a backup document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Convert a user-entered percentage (`0..=100`) into a probability.
///
/// # Errors
///
/// Returns a validation error for non-finite or out-of-range input.
pub fn probability_from_percent(percent: f64) -> Result<f64> {
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return Err(TrackerError::validation(format!(
            "probability must be between 0 and 100 percent, got {percent}"
        )));
    }
    Ok(percent / 100.0)
}

fn check_probability(probability: f64) -> Result<()> {
    if probability.is_finite() && (0.0..=1.0).contains(&probability) {
        Ok(())
    } else {
        Err(TrackerError::validation(format!(
            "expected probability must be within 0.0..=1.0, got {probability}"
        )))
    }
}

fn require_name(raw: &str, what: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(TrackerError::validation(format!("{what} name is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_json_uses_tagged_shape() {
        let json = r#"{
            "id": 3,
            "game_id": 1,
            "name": "Rare Drop",
            "shape": { "kind": "multi_outcome" },
            "outcomes": [
                { "id": 10, "event_id": 3, "name": "Drop", "expected_probability": 0.05,
                  "tally": { "global": 12, "personal": 4 } }
            ]
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.shape, EventShape::MultiOutcome);
        assert_eq!(event.outcomes[0].tally.global, 12);
        assert_eq!(event.outcomes[0].tally.personal, Some(4));
        assert_eq!(event.outcome(OutcomeId(10)).map(|o| o.name.as_str()), Some("Drop"));

        let legacy = r#"{ "id": 4, "game_id": 1, "name": "Crit",
            "shape": { "kind": "binary", "probability": 0.25 } }"#;
        let event: Event = serde_json::from_str(legacy).unwrap();
        assert_eq!(event.shape, EventShape::Binary { probability: 0.25 });
        assert!(event.outcomes.is_empty());
    }

    #[test]
    fn contributor_ids_reject_blank_input() {
        assert!(ContributorId::parse("   ").is_none());
        assert_eq!(
            ContributorId::parse(" abc-123 ").map(|id| id.to_string()),
            Some("abc-123".to_string())
        );
    }

    #[test]
    fn percentages_convert_to_probabilities() {
        assert!((probability_from_percent(42.0).unwrap() - 0.42).abs() < f64::EPSILON);
        assert!((probability_from_percent(0.5).unwrap() - 0.005).abs() < f64::EPSILON);
        assert!(probability_from_percent(101.0).is_err());
        assert!(probability_from_percent(f64::NAN).is_err());
    }

    #[test]
    fn drafts_trim_and_reject_bad_input() {
        let game = GameDraft {
            name: "  Elden Ring ".into(),
            image_url: Some("  ".into()),
        }
        .validated()
        .unwrap();
        assert_eq!(game.name, "Elden Ring");
        assert_eq!(game.image_url, None);

        let blank = GameDraft {
            name: " ".into(),
            image_url: None,
        };
        assert!(matches!(blank.validated(), Err(TrackerError::Validation(_))));

        let bad_probability = EventDraft::multi_outcome("Boss chest", &[("Sword", 1.5)]);
        assert!(bad_probability.validated().is_err());

        let mut no_success = EventDraft::binary("Crit", 0.2);
        for outcome in &mut no_success.outcomes {
            outcome.is_success = false;
        }
        assert!(no_success.validated().is_err());

        let empty = EventDraft::multi_outcome("Nothing", &[]);
        assert!(empty.validated().is_err());
    }

    #[test]
    fn multi_outcome_probabilities_need_not_sum_to_one() {
        let draft = EventDraft::multi_outcome("Chest", &[("Gem", 0.3), ("Key", 0.9)]);
        assert!(draft.validated().is_ok());
    }

    #[test]
    fn log_requests_respect_bulk_limit() {
        let mut request = LogRequest {
            event_id: EventId(1),
            outcome_id: OutcomeId(2),
            contributor_id: ContributorId::parse("me").unwrap(),
            count: 0,
            is_imported: false,
        };
        assert!(request.validate(100).is_err());
        request.count = 100;
        assert!(request.validate(100).is_ok());
        request.count = 101;
        assert!(request.validate(100).is_err());
    }

    #[test]
    fn backup_records_default_to_single_count() {
        let json = r#"{ "contributor_id": "abc",
            "logs": [ { "event_id": 1, "outcome_id": 2, "user_id": "abc" } ] }"#;
        let backup = Backup::from_json(json).unwrap();
        assert_eq!(backup.logs[0].count, 1);
        assert!(!backup.logs[0].is_imported);
    }
}
