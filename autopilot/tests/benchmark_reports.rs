use anyhow::Result;
use maze_autopilot::benchmark::{run_benchmark, BenchmarkConfig, Objective};
use maze_autopilot::config::AutopilotConfig;
use maze_autopilot::level::Level;
use maze_autopilot::profiles::resolve_profiles;
use maze_autopilot::runner::RunLimits;
use maze_core::policy::{PolicyConfig, TacticalPolicy};
use maze_core::QTable;
use std::fs;
use std::path::Path;

fn config(out_dir: &Path, jobs: Option<usize>) -> Result<BenchmarkConfig> {
    Ok(BenchmarkConfig {
        level: Level::builtin(),
        settings: AutopilotConfig::default(),
        policy: TacticalPolicy::new(PolicyConfig::default(), QTable::new()),
        profiles: resolve_profiles(Some("planner,hierarchical"))?,
        seeds: vec![1, 2],
        limits: RunLimits {
            episodes: 1,
            max_time: 8.0,
        },
        objective: Objective::Hybrid,
        out_dir: out_dir.to_path_buf(),
        jobs,
    })
}

#[test]
fn benchmark_writes_runs_rankings_and_summary() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("bench");
    let report = run_benchmark(config(&out, Some(2))?)?;
    assert_eq!(report.run_count, 4);
    assert_eq!(report.profile_rankings.len(), 2);
    assert_eq!(report.table_source, "empty");

    let runs = fs::read_to_string(out.join("runs.csv"))?;
    let lines: Vec<&str> = runs.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("profile,seed_hex,seed,"));

    let rankings = fs::read_to_string(out.join("rankings.csv"))?;
    assert_eq!(rankings.lines().count(), 3);
    assert!(rankings.lines().nth(1).is_some_and(|row| row.starts_with("1,")));

    let summary: serde_json::Value = serde_json::from_slice(&fs::read(out.join("summary.json"))?)?;
    assert_eq!(summary["run_count"], 4);
    assert_eq!(summary["objective"], "hybrid");
    assert_eq!(summary["runs"].as_array().map(Vec::len), Some(4));
    Ok(())
}

#[test]
fn thread_count_does_not_change_results() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let single = run_benchmark(config(&dir.path().join("one"), Some(1))?)?;
    let pooled = run_benchmark(config(&dir.path().join("auto"), None)?)?;
    let key = |report: &maze_autopilot::benchmark::BenchmarkReport| -> Result<Vec<String>> {
        report
            .runs
            .iter()
            .map(|run| Ok(serde_json::to_string(run)?))
            .collect()
    };
    assert_eq!(key(&single)?, key(&pooled)?);
    Ok(())
}

#[test]
fn zero_jobs_and_empty_seed_lists_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    assert!(run_benchmark(config(dir.path(), Some(0))?).is_err());
    let mut no_seeds = config(dir.path(), None)?;
    no_seeds.seeds.clear();
    assert!(run_benchmark(no_seeds).is_err());
    Ok(())
}
