use anyhow::{Context, Result, bail, ensure};
use rngtrack_core::{
    EventDraft, ImportPayload, MemoryBackend, MergeDecisions, Scope, TrackerError,
};

use super::{Scenario, ScenarioCtx, seed_event};

pub struct RareDrop;

#[async_trait::async_trait(?Send)]
impl Scenario for RareDrop {
    fn name(&self) -> &'static str {
        "rare-drop"
    }

    fn description(&self) -> &'static str {
        "100 single drops against a 5% outcome show +95.00% deviation"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let backend = MemoryBackend::new();
        let tracker = ctx.tracker(&backend, "hunter")?;
        let (event, outcomes) = seed_event(
            &tracker,
            "Monster Hunter",
            EventDraft::multi_outcome("Rare Drop", &[("Drop", 0.05), ("Nothing", 0.95)]),
        )
        .await?;
        for _ in 0..100 {
            tracker.record_outcome(event, outcomes[0], 1).await?;
        }

        let report = tracker.event_stats(event).context("no stats for rare drop")?;
        let rows = report.display_rows(&ctx.config.thresholds);
        let drop = rows.first().context("missing drop row")?;
        ensure!(report.total_attempts == 100, "total {} != 100", report.total_attempts);
        ensure!(drop.count == 100, "drop count {} != 100", drop.count);
        ensure!(drop.actual == "100.00%", "actual rate {}", drop.actual);
        ensure!(drop.expected == "5%", "expected rate {}", drop.expected);
        ensure!(drop.deviation == "+95.00%", "deviation {}", drop.deviation);
        Ok(())
    }
}

pub struct BulkLog;

#[async_trait::async_trait(?Send)]
impl Scenario for BulkLog {
    fn name(&self) -> &'static str {
        "bulk-log"
    }

    fn description(&self) -> &'static str {
        "A count of 25 is one write and 25 attempts; out-of-range counts are refused"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let backend = MemoryBackend::new();
        let tracker = ctx.tracker(&backend, "farmer")?;
        let (event, outcomes) = seed_event(
            &tracker,
            "Path of Exile",
            EventDraft::multi_outcome("Divine orb", &[("Divine", 0.01), ("Other", 0.99)]),
        )
        .await?;

        tracker.record_outcome(event, outcomes[1], 25).await?;
        ensure!(
            backend.calls().log_outcome == 1,
            "bulk log issued {} writes",
            backend.calls().log_outcome
        );
        let report = tracker.event_stats(event).context("no stats")?;
        ensure!(report.total_attempts == 25, "total {} != 25", report.total_attempts);

        let over = ctx.config.bulk_limit.saturating_add(1);
        for count in [0, over] {
            match tracker.record_outcome(event, outcomes[1], count).await {
                Err(TrackerError::Validation(_)) => {}
                other => bail!("count {count} was not rejected: {other:?}"),
            }
        }
        ensure!(backend.calls().log_outcome == 1, "invalid counts reached the backend");
        Ok(())
    }
}

pub struct ScopeToggle;

#[async_trait::async_trait(?Send)]
impl Scenario for ScopeToggle {
    fn name(&self) -> &'static str {
        "scope-toggle"
    }

    fn description(&self) -> &'static str {
        "Switching global/personal re-derives from the cache without requests"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let backend = MemoryBackend::new();
        let tracker = ctx.tracker(&backend, "me")?;
        let (event, outcomes) = seed_event(
            &tracker,
            "Genshin Impact",
            EventDraft::multi_outcome("Wish", &[("5 star", 0.006), ("4 star", 0.051), ("3 star", 0.943)]),
        )
        .await?;

        let other = ctx.tracker(&backend, "someone-else")?;
        let game = tracker.session().active_game_id.context("no active game")?;
        other.set_active_game(game).await?;
        other.record_outcome(event, outcomes[2], 40).await?;
        tracker.record_outcome(event, outcomes[1], 10).await?;

        let calls = backend.calls().total();
        tracker.toggle_scope(Scope::Personal);
        let personal = tracker.event_stats(event).context("no personal stats")?;
        tracker.toggle_scope(Scope::Global);
        let global = tracker.event_stats(event).context("no global stats")?;

        ensure!(backend.calls().total() == calls, "scope toggle issued requests");
        ensure!(personal.total_attempts == 10, "personal total {}", personal.total_attempts);
        ensure!(global.total_attempts == 50, "global total {}", global.total_attempts);
        ensure!(
            personal.total_attempts <= global.total_attempts,
            "personal exceeds global"
        );
        Ok(())
    }
}

pub struct FailedWrite;

#[async_trait::async_trait(?Send)]
impl Scenario for FailedWrite {
    fn name(&self) -> &'static str {
        "failed-write"
    }

    fn description(&self) -> &'static str {
        "A write that fails on the network leaves cached statistics unchanged"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let backend = MemoryBackend::new();
        let tracker = ctx.tracker(&backend, "offline")?;
        let (event, outcomes) = seed_event(
            &tracker,
            "Hades",
            EventDraft::binary("Chaos gate", 0.3),
        )
        .await?;
        tracker.record_outcome(event, outcomes[0], 2).await?;
        let before = tracker.all_stats();

        backend.set_offline(true);
        match tracker.record_outcome(event, outcomes[0], 1).await {
            Err(TrackerError::Network(_)) => {}
            other => bail!("expected a network error, got {other:?}"),
        }
        ensure!(tracker.all_stats() == before, "cache changed after failed write");
        Ok(())
    }
}

pub struct ImportRestore;

#[async_trait::async_trait(?Send)]
impl Scenario for ImportRestore {
    fn name(&self) -> &'static str {
        "import-restore"
    }

    fn description(&self) -> &'static str {
        "A backup adopted on a new device restores personal statistics"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let backend = MemoryBackend::new();
        let old_device = ctx.tracker(&backend, "old-device")?;
        let (event, outcomes) = seed_event(
            &old_device,
            "Diablo IV",
            EventDraft::multi_outcome("Uber unique", &[("Shako", 0.02), ("Other", 0.98)]),
        )
        .await?;
        old_device.record_outcome(event, outcomes[0], 1).await?;
        old_device.record_outcome(event, outcomes[1], 7).await?;
        let backup = old_device.export_backup().await?;
        let json = backup.to_json()?;

        let new_device = ctx.tracker(&backend, "new-device")?;
        let game = old_device.session().active_game_id.context("no active game")?;
        new_device.set_active_game(game).await?;
        new_device.toggle_scope(Scope::Personal);

        let plan = new_device.plan_import(ImportPayload::from_json(&json, ctx.config.bulk_limit)?);
        ensure!(plan.needs_identity_confirmation(), "identity prompt missing");
        let decisions = MergeDecisions {
            adopt_identity: true,
            replay_logs: false,
        };
        let result = new_device.apply_import(plan, decisions).await?;
        ensure!(result.identity_adopted, "identity not adopted");
        ensure!(
            new_device.contributor_id() == old_device.contributor_id(),
            "contributor id not switched"
        );
        let personal = new_device.event_stats(event).context("no stats after adoption")?;
        ensure!(personal.total_attempts == 8, "personal total {}", personal.total_attempts);
        Ok(())
    }
}

pub struct ImportReplay;

#[async_trait::async_trait(?Send)]
impl Scenario for ImportReplay {
    fn name(&self) -> &'static str {
        "import-replay"
    }

    fn description(&self) -> &'static str {
        "Replaying a same-identity backup adds one imported attempt per logged attempt"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let backend = MemoryBackend::new();
        let tracker = ctx.tracker(&backend, "replayer")?;
        let (event, outcomes) = seed_event(
            &tracker,
            "Destiny 2",
            EventDraft::multi_outcome("Raid exotic", &[("Exotic", 0.05), ("Nothing", 0.95)]),
        )
        .await?;
        tracker.record_outcome(event, outcomes[0], 2).await?;
        tracker.record_outcome(event, outcomes[1], 4).await?;

        let backup = tracker.export_backup().await?;
        let plan = tracker.plan_backup(backup);
        ensure!(!plan.needs_identity_confirmation(), "unexpected identity prompt");
        ensure!(plan.replay_count() == 6, "replay count {}", plan.replay_count());

        let result = tracker.apply_import(plan, MergeDecisions::accept_all()).await?;
        ensure!(
            result.succeeded == 6 && result.failed() == 0,
            "replayed {} of {} ({} failed)",
            result.succeeded,
            result.attempted,
            result.failed()
        );
        let imported = backend.logs().iter().filter(|entry| entry.is_imported).count();
        ensure!(imported == 6, "{imported} imported rows");

        let report = tracker.event_stats(event).context("no stats after replay")?;
        if ctx.verbose {
            println!("     replay total after merge: {}", report.total_attempts);
        }
        let expected_total = match ctx.config.import_policy {
            rngtrack_core::ImportPolicy::Include => 12,
            rngtrack_core::ImportPolicy::Exclude => 6,
        };
        ensure!(
            report.total_attempts == expected_total,
            "total {} != {expected_total}",
            report.total_attempts
        );
        Ok(())
    }
}
