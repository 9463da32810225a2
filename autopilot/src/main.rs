use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use maze_autopilot::benchmark::{run_benchmark, BenchmarkConfig, Objective};
use maze_autopilot::config::AutopilotConfig;
use maze_autopilot::level::Level;
use maze_autopilot::profiles::{profiles, require_profile, resolve_profiles, DEFAULT_PROFILE};
use maze_autopilot::runner::{run_agent, RunLimits};
use maze_autopilot::sim::MazeWorld;
use maze_autopilot::trainer::{Trainer, TrainerPaths};
use maze_autopilot::util::{parse_seed, resolve_seeds, seed_to_hex, timestamp_suffix};
use maze_core::policy::TacticalPolicy;
use maze_core::{Grid, GridCoord, QTable, QTablePaths};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "maze-autopilot")]
#[command(about = "Headless maze runs, Q-table training and layer benchmarks")]
struct Cli {
    /// JSON config with overrides for the sim, agent, brain and trainer
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// ASCII level file; the built-in level is used otherwise
    #[arg(long, global = true)]
    level: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a Q-table offline and write snapshots plus the episode log
    Train {
        #[arg(long)]
        episodes: Option<u32>,
        #[arg(long, default_value = "0x1")]
        seed: String,
        #[arg(long)]
        experiment: Option<String>,
        #[arg(long, default_value = "training")]
        out_dir: PathBuf,
    },
    /// Play episodes with the hierarchical agent and print metrics
    Run {
        #[arg(long, default_value = DEFAULT_PROFILE)]
        profile: String,
        #[arg(long, default_value = "0x1")]
        seed: String,
        #[arg(long, default_value_t = 5)]
        episodes: u32,
        #[arg(long, default_value_t = 300.0)]
        max_time: f32,
        /// Directory holding qtable_best.json / qtable_save.json
        #[arg(long, default_value = ".")]
        tables: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run several seeds and profiles in parallel and write CSV + JSON reports
    Benchmark {
        #[arg(long)]
        profiles: Option<String>,
        #[arg(long)]
        seeds: Option<String>,
        #[arg(long)]
        seed_file: Option<PathBuf>,
        #[arg(long)]
        seed_start: Option<String>,
        #[arg(long, default_value_t = 8)]
        seed_count: u32,
        #[arg(long, default_value_t = 5)]
        episodes: u32,
        #[arg(long, default_value_t = 300.0)]
        max_time: f32,
        #[arg(long, value_enum, default_value_t = CliObjective::Wins)]
        objective: CliObjective,
        #[arg(long, default_value = ".")]
        tables: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// List the layer profiles
    ListProfiles,
    /// Print the size and rows of a Q-table snapshot
    InspectTable {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the walkability grid built from the level
    ShowGrid {
        /// Overlay the A* path from the start to the exit
        #[arg(long, default_value_t = false)]
        path: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliObjective {
    Wins,
    Survival,
    Hybrid,
}

impl From<CliObjective> for Objective {
    fn from(value: CliObjective) -> Self {
        match value {
            CliObjective::Wins => Objective::Wins,
            CliObjective::Survival => Objective::Survival,
            CliObjective::Hybrid => Objective::Hybrid,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let Cli {
        config,
        level,
        command,
    } = Cli::parse();
    let settings = AutopilotConfig::load_or_default(config.as_deref())?;
    let level = Level::load_or_builtin(level.as_deref())?;

    match command {
        Commands::Train {
            episodes,
            seed,
            experiment,
            out_dir,
        } => {
            let seed = parse_seed(&seed)?;
            let mut trainer_config = settings.trainer.clone();
            if let Some(episodes) = episodes {
                trainer_config.max_episodes = episodes;
            }
            if let Some(experiment) = experiment {
                trainer_config.experiment = experiment;
            }
            let mut trainer = Trainer::new(
                &level,
                settings.sim,
                trainer_config,
                TrainerPaths::in_dir(&out_dir),
                seed,
            )?;
            let summary = trainer.run()?;

            println!("experiment={}", summary.experiment);
            println!("seed={}", seed_to_hex(seed));
            println!("episodes={}", summary.episodes);
            println!("successes={}", summary.successes);
            println!(
                "best_score={}",
                summary
                    .best_score
                    .map(|value| format!("{value:.1}"))
                    .unwrap_or_else(|| "none".to_string())
            );
            println!("epsilon={:.3}", summary.final_epsilon);
            println!("states={}", summary.table_size);
            println!("best_table={}", summary.best_table.display());
            println!("saved_table={}", summary.saved_table.display());
            println!("log={}", summary.log.display());
        }
        Commands::Run {
            profile,
            seed,
            episodes,
            max_time,
            tables,
            output,
        } => {
            let profile = require_profile(&profile)?;
            let seed = parse_seed(&seed)?;
            let policy = TacticalPolicy::load(settings.brain.policy, &QTablePaths::in_dir(&tables));
            let artifact = run_agent(
                &level,
                &settings,
                profile,
                policy,
                seed,
                RunLimits { episodes, max_time },
            )?;
            let m = &artifact.metrics;

            println!("profile={}", m.profile);
            println!("seed={}", m.seed_hex);
            println!("table_source={} states={}", m.table_source, m.table_states);
            println!("episodes={}", m.episodes);
            println!("wins={}", m.wins);
            println!("losses={}", m.losses);
            println!("win_rate={:.3}", m.win_rate);
            println!("coins={}", m.coins);
            println!("mean_survival_s={:.2}", m.mean_survival_time);
            println!("sim_time_s={:.2}", m.sim_time);
            println!("timed_out={}", m.timed_out);
            println!(
                "layers=magnet:{},reflex:{},tactical:{},strategic:{},halted:{},lockouts:{},conflict_replans:{}",
                m.layers.magnet,
                m.layers.reflex,
                m.layers.tactical,
                m.layers.strategic,
                m.layers.halted,
                m.layers.lockouts,
                m.layers.conflict_replans
            );
            for episode in &artifact.episodes {
                println!(
                    "  episode {} {:?} survival={:.2}s coins={}",
                    episode.index, episode.outcome, episode.survival_time, episode.coins
                );
            }
            if let Some(path) = output {
                write_json(&path, &artifact.metrics)?;
                println!("output={}", path.display());
            }
        }
        Commands::Benchmark {
            profiles,
            seeds,
            seed_file,
            seed_start,
            seed_count,
            episodes,
            max_time,
            objective,
            tables,
            out_dir,
            jobs,
        } => {
            let profiles = resolve_profiles(profiles.as_deref())?;
            let seeds = resolve_seeds(
                seeds.as_deref(),
                seed_file.as_deref(),
                seed_start.as_deref(),
                seed_count,
            )?;
            let objective: Objective = objective.into();
            let out_dir = out_dir.unwrap_or_else(|| {
                PathBuf::from(format!(
                    "benchmarks/{}-{}",
                    objective.as_str(),
                    timestamp_suffix()
                ))
            });
            let policy = TacticalPolicy::load(settings.brain.policy, &QTablePaths::in_dir(&tables));

            let report = run_benchmark(BenchmarkConfig {
                level,
                settings,
                policy,
                profiles,
                seeds,
                limits: RunLimits { episodes, max_time },
                objective,
                out_dir: out_dir.clone(),
                jobs,
            })?;

            println!("objective={}", objective.as_str());
            println!("runs={}", report.run_count);
            println!("table_source={}", report.table_source);
            println!(
                "jobs={}",
                report
                    .jobs
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| "auto".to_string())
            );
            println!("out_dir={}", out_dir.display());
            println!("profiles:");
            for (idx, row) in report.profile_rankings.iter().enumerate() {
                println!(
                    "  {}. {}  objective={:.2} win_rate={:.0}% avg_coins={:.1} avg_survival={:.1}s lockouts={:.1} timed_out={}",
                    idx + 1,
                    row.profile,
                    row.objective_value,
                    row.win_rate * 100.0,
                    row.avg_coins,
                    row.avg_survival_time,
                    row.avg_lockouts,
                    row.timed_out_runs,
                );
            }
        }
        Commands::ListProfiles => {
            for profile in profiles() {
                println!("{:16} {}", profile.id, profile.description);
            }
        }
        Commands::InspectTable { input, limit } => {
            let table = QTable::load(&input)
                .with_context(|| format!("failed loading q-table {}", input.display()))?;
            println!("input={}", input.display());
            println!("states={}", table.len());
            for (state, values) in table.iter().take(limit) {
                println!(
                    "  {state:12} up={:8.3} down={:8.3} left={:8.3} right={:8.3}",
                    values[0], values[1], values[2], values[3]
                );
            }
            if table.len() > limit {
                println!("  ... {} more", table.len() - limit);
            }
        }
        Commands::ShowGrid { path } => {
            let world = MazeWorld::new(level.clone(), settings.sim, 0);
            let mut grid = Grid::build(&world, level.grid_spec())
                .context("failed building grid from level")?;
            let route: HashSet<GridCoord> = if path {
                let exit = level
                    .exit()
                    .ok_or_else(|| anyhow!("level has no exit to plan toward"))?;
                match grid.find_path(level.start(), exit) {
                    Some(found) => {
                        println!("path_len={}", found.len());
                        found.waypoints().iter().map(|w| w.coord).collect()
                    }
                    None => {
                        println!("path_len=unreachable");
                        HashSet::new()
                    }
                }
            } else {
                HashSet::new()
            };

            let start = grid.world_to_cell(level.start());
            let exit = level.exit().map(|e| grid.world_to_cell(e));
            println!("cols={} rows={}", grid.cols(), grid.rows());
            println!("walkable={}", grid.walkable_count());
            for row in (0..grid.rows()).rev() {
                let line: String = (0..grid.cols())
                    .map(|col| {
                        let coord = GridCoord::new(col, row);
                        if coord == start {
                            'S'
                        } else if Some(coord) == exit {
                            'E'
                        } else if route.contains(&coord) {
                            '*'
                        } else if grid.is_walkable(coord) {
                            '.'
                        } else {
                            '#'
                        }
                    })
                    .collect();
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    let encoded = serde_json::to_vec_pretty(value).context("failed to serialize json")?;
    std::fs::write(path, encoded).with_context(|| format!("failed writing {}", path.display()))
}
