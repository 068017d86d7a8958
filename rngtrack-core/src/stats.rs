//! Aggregation engine: counts, rates, expected rates and deviation per scope.
//!
//! Everything here is a pure function of its inputs. Rounding only happens in
//! [`display`]; the numbers stored in a [`StatsReport`] are unrounded.

pub mod display;
pub mod remote;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::config::ImportPolicy;
use crate::error::{Result, TrackerError};
use crate::ledger::{ContributorId, Event, EventId, EventShape, LogEntry, OutcomeId, OutcomeTally};
use crate::numbers::{percent_of, u64_to_f64};

pub use display::{DeviationBand, format_hits, format_points};
pub use remote::RemoteStats;

/// Aggregation partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Every contributor.
    #[default]
    Global,
    /// Only the active contributor.
    Personal,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Personal => write!(f, "personal"),
        }
    }
}

/// Scope selection plus the filters applied while summing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsQuery<'a> {
    pub scope: Scope,
    pub contributor: Option<&'a ContributorId>,
    pub import_policy: ImportPolicy,
}

impl<'a> StatsQuery<'a> {
    #[must_use]
    pub const fn global() -> Self {
        Self {
            scope: Scope::Global,
            contributor: None,
            import_policy: ImportPolicy::Include,
        }
    }

    #[must_use]
    pub const fn personal(contributor: &'a ContributorId) -> Self {
        Self {
            scope: Scope::Personal,
            contributor: Some(contributor),
            import_policy: ImportPolicy::Include,
        }
    }

    #[must_use]
    pub const fn with_import_policy(mut self, import_policy: ImportPolicy) -> Self {
        self.import_policy = import_policy;
        self
    }

    fn admits(&self, entry: &LogEntry) -> bool {
        if entry.is_imported && self.import_policy == ImportPolicy::Exclude {
            return false;
        }
        match self.scope {
            Scope::Global => true,
            Scope::Personal => self
                .contributor
                .is_some_and(|contributor| *contributor == entry.contributor_id),
        }
    }

    fn tally_count(&self, tally: &OutcomeTally) -> u64 {
        let (count, imported) = match self.scope {
            Scope::Global => (tally.global, tally.global_imported),
            Scope::Personal => (tally.personal.unwrap_or(0), tally.personal_imported),
        };
        match self.import_policy {
            ImportPolicy::Include => count,
            ImportPolicy::Exclude => count.saturating_sub(imported),
        }
    }
}

/// Where the per-outcome counts come from.
#[derive(Debug, Clone, Copy)]
pub enum CountSource<'a> {
    /// Raw log rows, summed here.
    Entries(&'a [LogEntry]),
    /// Tallies already attached to the event's outcomes.
    EventTallies,
    /// Tallies supplied separately, keyed by outcome.
    Summed(&'a [(OutcomeId, OutcomeTally)]),
}

/// Observed frequency of an outcome within a scope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "percent", rename_all = "snake_case")]
pub enum Rate {
    /// Nothing logged in scope; never shown as 0%.
    NoData,
    /// Unrounded percentage.
    Observed(f64),
}

impl Rate {
    #[must_use]
    pub const fn percent(self) -> Option<f64> {
        match self {
            Self::NoData => None,
            Self::Observed(pct) => Some(pct),
        }
    }

    #[must_use]
    pub const fn is_no_data(self) -> bool {
        matches!(self, Self::NoData)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeStats {
    pub outcome_id: OutcomeId,
    pub name: String,
    pub count: u64,
    pub actual_rate: Rate,
    /// Declared probability as a percentage.
    pub expected_rate: f64,
    #[serde(default)]
    pub is_success: bool,
}

/// Percentage-point deviation of one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointDeviation {
    pub outcome_id: OutcomeId,
    /// `actual_rate - expected_rate`, absent without data.
    pub points: Option<f64>,
}

/// Absolute-count analysis of a legacy success/failure event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitDeviation {
    pub success_count: u64,
    pub total_attempts: u64,
    pub probability: f64,
    pub expected_hits: f64,
    /// `success_count - expected_hits`, absent without data.
    pub deviation: Option<f64>,
}

impl HitDeviation {
    #[must_use]
    pub fn is_above_expected(&self) -> bool {
        self.deviation.is_some_and(|hits| hits > 0.0)
    }
}

/// Deviation figures; one semantic per report, chosen by event shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Deviation {
    PercentagePoints { outcomes: Vec<PointDeviation> },
    AbsoluteCount(HitDeviation),
}

/// Counted attempts whose outcome is not part of the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanLog {
    pub outcome_id: OutcomeId,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub event_id: EventId,
    pub scope: Scope,
    pub total_attempts: u64,
    pub outcomes: Vec<OutcomeStats>,
    pub deviation: Deviation,
    #[serde(default)]
    pub orphans: Vec<OrphanLog>,
    /// Set when orphaned counts were skipped.
    #[serde(default)]
    pub partial: bool,
}

impl StatsReport {
    #[must_use]
    pub fn outcome(&self, id: OutcomeId) -> Option<&OutcomeStats> {
        self.outcomes.iter().find(|stats| stats.outcome_id == id)
    }

    /// Percentage-point deviation for one outcome of a multi-outcome report.
    #[must_use]
    pub fn point_deviation(&self, id: OutcomeId) -> Option<f64> {
        match &self.deviation {
            Deviation::PercentagePoints { outcomes } => outcomes
                .iter()
                .find(|dev| dev.outcome_id == id)
                .and_then(|dev| dev.points),
            Deviation::AbsoluteCount(_) => None,
        }
    }

    #[must_use]
    pub const fn hit_deviation(&self) -> Option<&HitDeviation> {
        match &self.deviation {
            Deviation::AbsoluteCount(hits) => Some(hits),
            Deviation::PercentagePoints { .. } => None,
        }
    }

    /// Turn a partial report into an error for callers that need every count.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::OrphanData`] for the first orphaned outcome.
    pub fn ensure_complete(&self) -> Result<()> {
        match self.orphans.first() {
            Some(orphan) => Err(TrackerError::OrphanData {
                outcome_id: orphan.outcome_id,
                count: orphan.count,
            }),
            None => Ok(()),
        }
    }
}

/// Derive statistics for one event.
///
/// # Errors
///
/// Returns a validation error when personal scope is requested over raw
/// entries without a contributor. Orphaned counts never fail the call; they
/// are skipped and the report is marked partial.
pub fn compute_stats(
    event: &Event,
    counts: CountSource<'_>,
    query: &StatsQuery<'_>,
) -> Result<StatsReport> {
    let mut per_outcome: BTreeMap<OutcomeId, u64> =
        event.outcomes.iter().map(|outcome| (outcome.id, 0)).collect();
    let mut orphans: BTreeMap<OutcomeId, u64> = BTreeMap::new();
    let mut add = |outcome_id: OutcomeId, count: u64| {
        if count == 0 {
            return;
        }
        match per_outcome.get_mut(&outcome_id) {
            Some(slot) => *slot += count,
            None => *orphans.entry(outcome_id).or_insert(0) += count,
        }
    };

    match counts {
        CountSource::Entries(entries) => {
            if query.scope == Scope::Personal && query.contributor.is_none() {
                return Err(TrackerError::validation(
                    "personal statistics need a contributor id",
                ));
            }
            for entry in entries.iter().filter(|entry| query.admits(entry)) {
                add(entry.outcome_id, u64::from(entry.count));
            }
        }
        CountSource::EventTallies => {
            for outcome in &event.outcomes {
                add(outcome.id, query.tally_count(&outcome.tally));
            }
        }
        CountSource::Summed(tallies) => {
            for (outcome_id, tally) in tallies {
                add(*outcome_id, query.tally_count(tally));
            }
        }
    }

    let total_attempts: u64 = per_outcome.values().sum();
    let outcomes: Vec<OutcomeStats> = event
        .outcomes
        .iter()
        .map(|outcome| {
            let count = per_outcome.get(&outcome.id).copied().unwrap_or(0);
            OutcomeStats {
                outcome_id: outcome.id,
                name: outcome.name.clone(),
                count,
                actual_rate: percent_of(count, total_attempts).map_or(Rate::NoData, Rate::Observed),
                expected_rate: outcome.expected_probability * 100.0,
                is_success: outcome.is_success,
            }
        })
        .collect();

    let deviation = match event.shape {
        EventShape::MultiOutcome => Deviation::PercentagePoints {
            outcomes: outcomes
                .iter()
                .map(|stats| PointDeviation {
                    outcome_id: stats.outcome_id,
                    points: stats
                        .actual_rate
                        .percent()
                        .map(|actual| actual - stats.expected_rate),
                })
                .collect(),
        },
        EventShape::Binary { probability } => {
            Deviation::AbsoluteCount(hit_deviation(&outcomes, total_attempts, probability))
        }
    };

    let orphans: Vec<OrphanLog> = orphans
        .into_iter()
        .map(|(outcome_id, count)| OrphanLog { outcome_id, count })
        .collect();
    let partial = !orphans.is_empty();
    if partial {
        log::warn!(
            "event {}: skipped {} orphaned outcome id(s) in {} scope",
            event.id,
            orphans.len(),
            query.scope
        );
    }

    Ok(StatsReport {
        event_id: event.id,
        scope: query.scope,
        total_attempts,
        outcomes,
        deviation,
        orphans,
        partial,
    })
}

fn hit_deviation(outcomes: &[OutcomeStats], total_attempts: u64, probability: f64) -> HitDeviation {
    let success_count: u64 = outcomes
        .iter()
        .filter(|stats| stats.is_success)
        .map(|stats| stats.count)
        .sum();
    let expected_hits = u64_to_f64(total_attempts) * probability;
    let deviation = (total_attempts > 0).then(|| u64_to_f64(success_count) - expected_hits);
    HitDeviation {
        success_count,
        total_attempts,
        probability,
        expected_hits,
        deviation,
    }
}
