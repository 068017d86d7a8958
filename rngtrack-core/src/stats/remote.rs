//! Backend pre-aggregated statistics, folded back into the local engine.
//!
//! The server-side figures (rates, deviation) are not trusted for display;
//! only the counts are taken so one numeric policy governs every report.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{CountSource, StatsQuery, StatsReport, compute_stats};
use crate::error::Result;
use crate::ledger::{Event, EventId, OutcomeId, OutcomeTally};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteStats {
    #[serde(default)]
    pub event_id: Option<EventId>,
    #[serde(default, alias = "total_logs")]
    pub total_attempts: u64,
    /// Global count per outcome id.
    #[serde(default)]
    pub outcomes: BTreeMap<OutcomeId, u64>,
    #[serde(default)]
    pub imported_outcomes: BTreeMap<OutcomeId, u64>,
    #[serde(default)]
    pub actual_rates: BTreeMap<OutcomeId, f64>,
    #[serde(default)]
    pub expected_rates: BTreeMap<OutcomeId, f64>,
    #[serde(default)]
    pub deviation: Option<f64>,
    #[serde(default)]
    pub user_total_attempts: Option<u64>,
    #[serde(default)]
    pub user_outcomes: Option<BTreeMap<OutcomeId, u64>>,
    #[serde(default)]
    pub user_imported_outcomes: BTreeMap<OutcomeId, u64>,
}

impl RemoteStats {
    /// Per-outcome tallies covering every outcome id mentioned in the payload.
    #[must_use]
    pub fn tallies(&self) -> Vec<(OutcomeId, OutcomeTally)> {
        let mut ids: BTreeSet<OutcomeId> = self.outcomes.keys().copied().collect();
        if let Some(user) = &self.user_outcomes {
            ids.extend(user.keys().copied());
        }
        ids.into_iter()
            .map(|id| {
                let tally = OutcomeTally {
                    global: self.outcomes.get(&id).copied().unwrap_or(0),
                    global_imported: self.imported_outcomes.get(&id).copied().unwrap_or(0),
                    personal: self
                        .user_outcomes
                        .as_ref()
                        .map(|user| user.get(&id).copied().unwrap_or(0)),
                    personal_imported: self.user_imported_outcomes.get(&id).copied().unwrap_or(0),
                };
                (id, tally)
            })
            .collect()
    }

    /// Run the engine over the server counts for `event`.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`compute_stats`].
    pub fn report(&self, event: &Event, query: &StatsQuery<'_>) -> Result<StatsReport> {
        let tallies = self.tallies();
        let report = compute_stats(event, CountSource::Summed(&tallies), query)?;
        let orphaned: u64 = report.orphans.iter().map(|orphan| orphan.count).sum();
        if query.scope == super::Scope::Global
            && report.total_attempts + orphaned != self.total_attempts
        {
            log::debug!(
                "event {}: server total {} differs from summed counts {}",
                event.id,
                self.total_attempts,
                report.total_attempts + orphaned
            );
        }
        Ok(report)
    }
}
