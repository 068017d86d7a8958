//! Seeded random trials checked against the declared probabilities.
use anyhow::{Context, Result, ensure};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rngtrack_core::{EventDraft, MemoryBackend, OutcomeId};

use super::{Scenario, ScenarioCtx, ScenarioTracker, seed_event};

const DROP_TABLE: [(&str, f64); 3] = [("Legendary", 0.05), ("Rare", 0.25), ("Common", 0.70)];
const DROP_TRIALS: u32 = 4_000;
/// Percentage points a simulated rate may stray from its probability.
const DROP_TOLERANCE: f64 = 4.0;

const CRIT_CHANCE: f64 = 0.2;
const CRIT_TRIALS: u32 = 500;

/// Index into `weights` chosen with probability proportional to each weight.
pub fn weighted_index(rng: &mut impl Rng, weights: &[f64]) -> usize {
    let total: f64 = weights.iter().sum();
    let mut roll = rng.gen_range(0.0..total);
    for (index, weight) in weights.iter().enumerate() {
        if roll < *weight {
            return index;
        }
        roll -= weight;
    }
    weights.len().saturating_sub(1)
}

/// Log per-outcome totals in chunks no larger than the bulk limit.
async fn record_counts(
    tracker: &ScenarioTracker,
    event: rngtrack_core::EventId,
    counts: &[(OutcomeId, u32)],
) -> Result<()> {
    let limit = tracker.config().bulk_limit.max(1);
    for &(outcome, mut remaining) in counts {
        while remaining > 0 {
            let chunk = remaining.min(limit);
            tracker.record_outcome(event, outcome, chunk).await?;
            remaining -= chunk;
        }
    }
    Ok(())
}

pub struct SimulatedDrops;

#[async_trait::async_trait(?Send)]
impl Scenario for SimulatedDrops {
    fn name(&self) -> &'static str {
        "simulated-drops"
    }

    fn description(&self) -> &'static str {
        "Seeded loot rolls land within tolerance of their declared rates"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let backend = MemoryBackend::new();
        let tracker = ctx.tracker(&backend, "sim")?;
        let (event, outcomes) =
            seed_event(&tracker, "Borderlands", EventDraft::multi_outcome("Chest", &DROP_TABLE)).await?;

        let mut rng = ChaCha20Rng::seed_from_u64(ctx.seed);
        let weights: Vec<f64> = DROP_TABLE.iter().map(|(_, p)| *p).collect();
        let mut tallies = vec![0_u32; weights.len()];
        for _ in 0..DROP_TRIALS {
            tallies[weighted_index(&mut rng, &weights)] += 1;
        }
        let counts: Vec<(OutcomeId, u32)> = outcomes.iter().copied().zip(tallies).collect();
        record_counts(&tracker, event, &counts).await?;

        let report = tracker.event_stats(event).context("no stats for simulation")?;
        ensure!(
            report.total_attempts == u64::from(DROP_TRIALS),
            "total {} != {DROP_TRIALS}",
            report.total_attempts
        );
        let rate_sum: f64 = report
            .outcomes
            .iter()
            .filter_map(|stats| stats.actual_rate.percent())
            .sum();
        ensure!((rate_sum - 100.0).abs() < 1e-6, "rates sum to {rate_sum}");

        for stats in &report.outcomes {
            let points = report
                .point_deviation(stats.outcome_id)
                .context("deviation missing with data present")?;
            if ctx.verbose {
                println!(
                    "     {:<10} {:>5} hits  {}  expected {:.2}%",
                    stats.name,
                    stats.count,
                    stats.actual_rate.display(),
                    stats.expected_rate
                );
            }
            ensure!(
                points.abs() <= DROP_TOLERANCE,
                "{} strayed {points:.2} points from {:.2}%",
                stats.name,
                stats.expected_rate
            );
        }

        let remote = tracker.remote_stats(event).await?;
        ensure!(remote == report, "server aggregates disagree with cached report");
        Ok(())
    }
}

pub struct SimulatedCrits;

#[async_trait::async_trait(?Send)]
impl Scenario for SimulatedCrits {
    fn name(&self) -> &'static str {
        "simulated-crits"
    }

    fn description(&self) -> &'static str {
        "Seeded success/failure rolls report absolute hit deviation"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let backend = MemoryBackend::new();
        let tracker = ctx.tracker(&backend, "sim")?;
        let (event, outcomes) = seed_event(
            &tracker,
            "Baldur's Gate 3",
            EventDraft::binary("Critical hit", CRIT_CHANCE),
        )
        .await?;

        let mut rng = ChaCha20Rng::seed_from_u64(ctx.seed);
        let hits = (0..CRIT_TRIALS)
            .filter(|_| rng.gen_bool(CRIT_CHANCE))
            .count();
        let hits = u32::try_from(hits)?;
        record_counts(
            &tracker,
            event,
            &[(outcomes[0], hits), (outcomes[1], CRIT_TRIALS - hits)],
        )
        .await?;

        let report = tracker.event_stats(event).context("no stats for crits")?;
        let line = report
            .hits_line(&ctx.config.thresholds)
            .context("binary event without hits line")?;
        let deviation = report
            .hit_deviation()
            .and_then(|hit| hit.deviation)
            .context("hit deviation missing")?;
        ensure!(line.success_count == u64::from(hits), "success count mismatch");
        ensure!(line.expected_hits == "100.00", "expected hits {}", line.expected_hits);
        ensure!(
            (deviation - (f64::from(hits) - 100.0)).abs() < 1e-9,
            "deviation {deviation} for {hits} hits"
        );
        if ctx.verbose {
            println!("     {hits} crits, deviation {} ({})", line.deviation, line.band.label());
        }
        Ok(())
    }
}
