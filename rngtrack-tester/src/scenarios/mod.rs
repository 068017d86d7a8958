use anyhow::{Context, Result, ensure};
use rngtrack_core::{
    ContributorId, EngineConfig, EventDraft, EventId, GameDraft, MemoryBackend, MemoryIdentity,
    OutcomeId, Tracker,
};

pub mod flows;
pub mod simulation;

pub type ScenarioTracker = Tracker<MemoryBackend, MemoryIdentity>;

#[derive(Debug, Clone)]
pub struct ScenarioCtx {
    pub seed: u64,
    pub config: EngineConfig,
    pub verbose: bool,
}

impl ScenarioCtx {
    /// Tracker over a fresh in-memory backend, with a contributor derived from the seed.
    pub fn tracker(&self, backend: &MemoryBackend, label: &str) -> Result<ScenarioTracker> {
        let contributor = ContributorId::parse(&format!("{label}-{}", self.seed))
            .context("contributor label must not be blank")?;
        let tracker = Tracker::new(
            backend.clone(),
            MemoryIdentity::with_id(contributor),
            self.config.clone(),
        )?;
        Ok(tracker)
    }
}

#[async_trait::async_trait(?Send)]
pub trait Scenario {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn run(&self, ctx: &ScenarioCtx) -> Result<()>;
}

pub fn catalog() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(flows::RareDrop),
        Box::new(flows::BulkLog),
        Box::new(flows::ScopeToggle),
        Box::new(flows::FailedWrite),
        Box::new(flows::ImportRestore),
        Box::new(flows::ImportReplay),
        Box::new(simulation::SimulatedDrops),
        Box::new(simulation::SimulatedCrits),
    ]
}

pub fn get_scenario(name: &str) -> Option<Box<dyn Scenario>> {
    catalog().into_iter().find(|scenario| scenario.name() == name)
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    catalog()
        .iter()
        .map(|scenario| (scenario.name(), scenario.description()))
        .collect()
}

/// Create a game with one event, select it, and return the event with its outcome ids.
pub async fn seed_event(
    tracker: &ScenarioTracker,
    game: &str,
    draft: EventDraft,
) -> Result<(EventId, Vec<OutcomeId>)> {
    let game = tracker
        .create_game(GameDraft {
            name: game.to_string(),
            image_url: None,
        })
        .await?;
    tracker.set_active_game(game.id).await?;
    let event = tracker.create_event(draft).await?;
    let outcomes = event.outcomes.iter().map(|outcome| outcome.id).collect();
    ensure!(
        tracker.event_stats(event.id).is_some(),
        "event {} missing from cache after creation",
        event.id
    );
    Ok((event.id, outcomes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn scenario_names_are_unique_and_resolvable() {
        let names: BTreeSet<&str> = list_scenarios().iter().map(|(name, _)| *name).collect();
        assert_eq!(names.len(), catalog().len());
        for name in names {
            assert!(get_scenario(name).is_some());
        }
        assert!(get_scenario("missing").is_none());
    }
}
