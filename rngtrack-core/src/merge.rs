//! Import of backup files: identity reconciliation and best-effort log replay.
//!
//! Planning is pure. The caller shows the plan to the user, collects
//! [`MergeDecisions`], and hands both to the tracker, which performs the
//! identity swap and the replay through [`replay_logs`].
use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};

use crate::DataSource;
use crate::ledger::{Backup, ContributorId, LogRef, LogRequest};

/// Parsed content of an import file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPayload {
    #[serde(default)]
    pub contributor_id: Option<ContributorId>,
    #[serde(default)]
    pub logs: Vec<LogRef>,
    /// Backup records refused before expansion.
    #[serde(default)]
    pub rejected: Vec<ReplayFailure>,
}

impl ImportPayload {
    /// Expand a backup: each record of count `n` becomes `n` single-attempt
    /// references. Records with a count of zero or above `bulk_limit` are not
    /// expanded and land in `rejected`.
    #[must_use]
    pub fn from_backup(backup: Backup, bulk_limit: u32) -> Self {
        let contributor_id = backup
            .contributor_id
            .and_then(|id| ContributorId::parse(id.as_str()));
        let mut logs = Vec::new();
        let mut rejected = Vec::new();
        for record in &backup.logs {
            let log = LogRef {
                event_id: record.event_id,
                outcome_id: record.outcome_id,
            };
            if record.count == 0 || record.count > bulk_limit {
                log::warn!(
                    "skipping backup record for outcome {} with count {}",
                    record.outcome_id,
                    record.count
                );
                rejected.push(ReplayFailure {
                    log,
                    reason: format!("count {} outside 1..={bulk_limit}", record.count),
                });
                continue;
            }
            let repeats = usize::try_from(record.count).unwrap_or(0);
            logs.extend(std::iter::repeat_n(log, repeats));
        }
        Self {
            contributor_id,
            logs,
            rejected,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the JSON is not a backup document.
    pub fn from_json(json: &str, bulk_limit: u32) -> Result<Self, serde_json::Error> {
        Backup::from_json(json).map(|backup| Self::from_backup(backup, bulk_limit))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityChange {
    pub from: ContributorId,
    pub to: ContributorId,
}

/// What an import would do, before the user decides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePlan {
    /// Present only when the file carries a different identifier.
    pub identity_change: Option<IdentityChange>,
    pub replay: Vec<LogRef>,
    /// Records that will not be replayed; reported as failures when replay is accepted.
    pub rejected: Vec<ReplayFailure>,
}

impl MergePlan {
    #[must_use]
    pub const fn needs_identity_confirmation(&self) -> bool {
        self.identity_change.is_some()
    }

    #[must_use]
    pub fn replay_count(&self) -> usize {
        self.replay.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identity_change.is_none() && self.replay.is_empty() && self.rejected.is_empty()
    }
}

/// Build the plan for `payload` against the identity currently in use.
#[must_use]
pub fn plan_import(payload: ImportPayload, current: &ContributorId) -> MergePlan {
    let identity_change = payload
        .contributor_id
        .filter(|incoming| incoming != current)
        .map(|incoming| IdentityChange {
            from: current.clone(),
            to: incoming,
        });
    MergePlan {
        identity_change,
        replay: payload.logs,
        rejected: payload.rejected,
    }
}

/// User answers to the two independent merge prompts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDecisions {
    pub adopt_identity: bool,
    pub replay_logs: bool,
}

impl MergeDecisions {
    #[must_use]
    pub const fn accept_all() -> Self {
        Self {
            adopt_identity: true,
            replay_logs: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayFailure {
    pub log: LogRef,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub identity_adopted: bool,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<ReplayFailure>,
}

impl MergeResult {
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// True when anything reached the backend or the identity changed.
    #[must_use]
    pub const fn changed_anything(&self) -> bool {
        self.identity_adopted || self.succeeded > 0
    }
}

/// Replay each reference as one imported attempt under `contributor`.
///
/// At most `width` writes are in flight; `1` replays strictly in file order.
/// Failures are collected and never abort the remaining writes.
pub async fn replay_logs<D: DataSource + ?Sized>(
    source: &D,
    logs: &[LogRef],
    contributor: &ContributorId,
    width: usize,
) -> MergeResult {
    let outcomes: Vec<(LogRef, crate::Result<()>)> = stream::iter(logs.iter().copied())
        .map(move |log| async move {
            let request = LogRequest {
                event_id: log.event_id,
                outcome_id: log.outcome_id,
                contributor_id: contributor.clone(),
                count: 1,
                is_imported: true,
            };
            (log, source.log_outcome(&request).await)
        })
        .buffer_unordered(width.max(1))
        .collect()
        .await;

    let mut result = MergeResult {
        attempted: outcomes.len(),
        ..MergeResult::default()
    };
    for (log, outcome) in outcomes {
        match outcome {
            Ok(()) => result.succeeded += 1,
            Err(err) => {
                log::warn!(
                    "replay of outcome {} (event {}) failed: {err}",
                    log.outcome_id,
                    log.event_id
                );
                result.failures.push(ReplayFailure {
                    log,
                    reason: err.to_string(),
                });
            }
        }
    }
    log::info!(
        "replayed {} of {} imported log(s)",
        result.succeeded,
        result.attempted
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{EventId, LogRecord, OutcomeId};

    fn me() -> ContributorId {
        ContributorId::parse("device-a").unwrap()
    }

    fn record(outcome: u64, count: u32) -> LogRecord {
        LogRecord {
            event_id: EventId(1),
            outcome_id: OutcomeId(outcome),
            contributor_id: me(),
            count,
            is_imported: false,
            created_at: None,
        }
    }

    #[test]
    fn backup_counts_expand_into_single_attempts() {
        let backup = Backup {
            contributor_id: Some(me()),
            logs: vec![record(10, 3), record(11, 1)],
        };
        let payload = ImportPayload::from_backup(backup, 1000);
        assert_eq!(payload.logs.len(), 4);
        assert!(payload.rejected.is_empty());
        assert_eq!(
            payload
                .logs
                .iter()
                .filter(|log| log.outcome_id == OutcomeId(10))
                .count(),
            3
        );
    }

    #[test]
    fn matching_identity_needs_no_confirmation() {
        let payload = ImportPayload {
            contributor_id: Some(me()),
            logs: vec![LogRef {
                event_id: EventId(1),
                outcome_id: OutcomeId(10),
            }],
            ..ImportPayload::default()
        };
        let plan = plan_import(payload, &me());
        assert!(!plan.needs_identity_confirmation());
        assert_eq!(plan.replay_count(), 1);
    }

    #[test]
    fn foreign_identity_is_offered_for_adoption() {
        let other = ContributorId::parse("device-b").unwrap();
        let payload = ImportPayload {
            contributor_id: Some(other.clone()),
            ..ImportPayload::default()
        };
        let plan = plan_import(payload, &me());
        assert_eq!(
            plan.identity_change,
            Some(IdentityChange {
                from: me(),
                to: other,
            })
        );
        assert_eq!(plan.replay_count(), 0);
    }

    #[test]
    fn missing_identity_and_logs_make_an_empty_plan() {
        let payload = ImportPayload::from_json(r#"{ "contributor_id": null }"#, 1000).unwrap();
        assert!(plan_import(payload, &me()).is_empty());
    }

    #[test]
    fn malformed_files_are_rejected() {
        assert!(ImportPayload::from_json("not json", 1000).is_err());
        assert!(ImportPayload::from_json(r#"{ "logs": 5 }"#, 1000).is_err());
    }

    #[test]
    fn oversized_records_are_refused_before_expansion() {
        let json = r#"{
            "contributor_id": "device-a",
            "logs": [
                { "event_id": 1, "outcome_id": 10, "user_id": "device-a", "count": 4294967295 },
                { "event_id": 1, "outcome_id": 11, "user_id": "device-a", "count": 2 }
            ]
        }"#;
        let payload = ImportPayload::from_json(json, 1000).unwrap();
        assert_eq!(payload.logs.len(), 2);
        assert!(payload.logs.iter().all(|log| log.outcome_id == OutcomeId(11)));
        assert_eq!(payload.rejected.len(), 1);
        assert_eq!(payload.rejected[0].log.outcome_id, OutcomeId(10));

        let plan = plan_import(payload, &me());
        assert_eq!(plan.replay_count(), 2);
        assert_eq!(plan.rejected.len(), 1);
    }
}
