use anyhow::Result;
use maze_autopilot::config::AutopilotConfig;
use maze_autopilot::level::Level;
use maze_autopilot::profiles::require_profile;
use maze_autopilot::runner::{run_agent, RunLimits};
use maze_autopilot::sim::SimConfig;
use maze_autopilot::trainer::{Trainer, TrainerConfig, TrainerPaths, LOG_HEADER};
use maze_core::policy::{PolicyConfig, TacticalPolicy};
use maze_core::qtable::TableSource;
use maze_core::{QTable, QTablePaths};
use std::fs;

const ROOM: &str = "\
#########
#S......#
#.##.##.#
#......E#
#########
";

#[test]
fn trained_table_is_picked_up_by_the_tactical_layer() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let level = Level::parse(ROOM)?;
    let config = TrainerConfig {
        max_episodes: 12,
        max_episode_duration: 3.0,
        ..TrainerConfig::default()
    };
    let paths = TrainerPaths::in_dir(dir.path());
    let mut trainer = Trainer::new(&level, SimConfig::default(), config, paths, 5)?;
    let summary = trainer.run()?;
    assert_eq!(summary.episodes, 12);

    let log = fs::read_to_string(&summary.log)?;
    let mut lines = log.lines();
    assert_eq!(lines.next(), Some(LOG_HEADER));
    assert_eq!(lines.count(), 12);

    let saved = QTable::load(&summary.saved_table)?;
    assert_eq!(saved.len(), summary.table_size);

    let policy = TacticalPolicy::load(PolicyConfig::default(), &QTablePaths::in_dir(dir.path()));
    assert_ne!(policy.source(), TableSource::Empty);
    assert!(!policy.table().is_empty());

    let artifact = run_agent(
        &level,
        &AutopilotConfig::default(),
        require_profile("tactical")?,
        policy,
        5,
        RunLimits {
            episodes: 1,
            max_time: 5.0,
        },
    )?;
    assert!(artifact.metrics.table_states > 0);
    assert_ne!(artifact.metrics.table_source, "empty");
    Ok(())
}
