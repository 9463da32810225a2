use crate::config::AutopilotConfig;
use crate::level::Level;
use crate::profiles::ProfileSpec;
use crate::runner::{run_agent, RunLimits, RunMetrics};
use anyhow::{anyhow, Context, Result};
use maze_core::policy::TacticalPolicy;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Wins,
    Survival,
    Hybrid,
}

impl Objective {
    pub fn run_value(self, metrics: &RunMetrics) -> f64 {
        match self {
            Self::Wins => metrics.win_rate * 100.0 + metrics.coins as f64 * 0.5,
            Self::Survival => {
                metrics.mean_survival_time * (1.0 - metrics.win_rate) + metrics.wins as f64 * 60.0
            }
            Self::Hybrid => {
                metrics.win_rate * 70.0
                    + metrics.coins as f64 * 2.0
                    + metrics.mean_survival_time.min(60.0) * 0.25
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wins => "wins",
            Self::Survival => "survival",
            Self::Hybrid => "hybrid",
        }
    }
}

#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    pub level: Level,
    pub settings: AutopilotConfig,
    pub policy: TacticalPolicy,
    pub profiles: Vec<&'static ProfileSpec>,
    pub seeds: Vec<u64>,
    pub limits: RunLimits,
    pub objective: Objective,
    pub out_dir: PathBuf,
    pub jobs: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunRecord {
    #[serde(flatten)]
    pub metrics: RunMetrics,
    pub objective_value: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileAggregate {
    pub profile: String,
    pub runs: usize,
    pub episodes: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f64,
    pub avg_coins: f64,
    pub avg_survival_time: f64,
    pub timed_out_runs: usize,
    pub objective_value: f64,
    pub avg_magnet: f64,
    pub avg_reflex: f64,
    pub avg_tactical: f64,
    pub avg_strategic: f64,
    pub avg_lockouts: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct BenchmarkReport {
    pub generated_unix_s: u64,
    pub objective: Objective,
    pub episodes_per_run: u32,
    pub max_time: f32,
    pub jobs: Option<usize>,
    pub profiles: Vec<String>,
    pub seeds: Vec<u64>,
    pub table_source: String,
    pub run_count: usize,
    pub profile_rankings: Vec<ProfileAggregate>,
    pub runs: Vec<RunRecord>,
}

pub fn run_benchmark(config: BenchmarkConfig) -> Result<BenchmarkReport> {
    if config.seeds.is_empty() {
        return Err(anyhow!("benchmark requires at least one seed"));
    }
    if config.profiles.is_empty() {
        return Err(anyhow!("benchmark requires at least one profile"));
    }
    fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("failed creating {}", config.out_dir.display()))?;

    if let Some(jobs) = config.jobs {
        if jobs == 0 {
            return Err(anyhow!("benchmark --jobs must be >= 1 when provided"));
        }
    }

    let run_jobs: Vec<(&'static ProfileSpec, u64)> = config
        .profiles
        .iter()
        .flat_map(|profile| config.seeds.iter().map(move |seed| (*profile, *seed)))
        .collect();

    let run_one = |(profile, seed): &(&'static ProfileSpec, u64)| -> Result<RunRecord> {
        let artifact = run_agent(
            &config.level,
            &config.settings,
            profile,
            config.policy.clone(),
            *seed,
            config.limits,
        )
        .with_context(|| format!("benchmark run failed for profile={} seed={seed:#x}", profile.id))?;
        let objective_value = config.objective.run_value(&artifact.metrics);
        Ok(RunRecord {
            metrics: artifact.metrics,
            objective_value,
        })
    };

    let run_results: Vec<Result<RunRecord>> = if let Some(jobs) = config.jobs {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("failed to build rayon threadpool")?;
        pool.install(|| run_jobs.par_iter().map(run_one).collect())
    } else {
        run_jobs.par_iter().map(run_one).collect()
    };

    let mut runs = Vec::with_capacity(run_results.len());
    for result in run_results {
        runs.push(result?);
    }

    let rankings = aggregate(&runs);

    runs.sort_by(|a, b| {
        b.objective_value
            .total_cmp(&a.objective_value)
            .then_with(|| b.metrics.wins.cmp(&a.metrics.wins))
            .then_with(|| a.metrics.seed.cmp(&b.metrics.seed))
    });

    write_runs_csv(&config.out_dir.join("runs.csv"), &runs)?;
    write_rankings_csv(&config.out_dir.join("rankings.csv"), &rankings)?;

    let report = BenchmarkReport {
        generated_unix_s: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        objective: config.objective,
        episodes_per_run: config.limits.episodes,
        max_time: config.limits.max_time,
        jobs: config.jobs,
        profiles: config.profiles.iter().map(|p| p.id.to_string()).collect(),
        seeds: config.seeds,
        table_source: crate::runner::source_label(config.policy.source()),
        run_count: runs.len(),
        profile_rankings: rankings,
        runs,
    };

    let report_path = config.out_dir.join("summary.json");
    fs::write(
        &report_path,
        serde_json::to_vec_pretty(&report).context("failed to serialize summary json")?,
    )
    .with_context(|| format!("failed writing {}", report_path.display()))?;
    info!(runs = report.run_count, out = %config.out_dir.display(), "benchmark written");

    Ok(report)
}

fn aggregate(runs: &[RunRecord]) -> Vec<ProfileAggregate> {
    let mut grouped: HashMap<&str, Vec<&RunRecord>> = HashMap::new();
    for run in runs {
        grouped.entry(run.metrics.profile.as_str()).or_default().push(run);
    }

    let mut rankings = Vec::new();
    for (profile, profile_runs) in grouped {
        let episodes: u32 = profile_runs.iter().map(|r| r.metrics.episodes).sum();
        let wins: u32 = profile_runs.iter().map(|r| r.metrics.wins).sum();
        let losses: u32 = profile_runs.iter().map(|r| r.metrics.losses).sum();
        rankings.push(ProfileAggregate {
            profile: profile.to_string(),
            runs: profile_runs.len(),
            episodes,
            wins,
            losses,
            win_rate: if episodes == 0 {
                0.0
            } else {
                wins as f64 / episodes as f64
            },
            avg_coins: mean(&profile_runs, |r| r.metrics.coins as f64),
            avg_survival_time: mean(&profile_runs, |r| r.metrics.mean_survival_time),
            timed_out_runs: profile_runs.iter().filter(|r| r.metrics.timed_out).count(),
            objective_value: mean(&profile_runs, |r| r.objective_value),
            avg_magnet: mean(&profile_runs, |r| r.metrics.layers.magnet as f64),
            avg_reflex: mean(&profile_runs, |r| r.metrics.layers.reflex as f64),
            avg_tactical: mean(&profile_runs, |r| r.metrics.layers.tactical as f64),
            avg_strategic: mean(&profile_runs, |r| r.metrics.layers.strategic as f64),
            avg_lockouts: mean(&profile_runs, |r| r.metrics.layers.lockouts as f64),
        });
    }

    rankings.sort_by(|a, b| {
        b.objective_value
            .total_cmp(&a.objective_value)
            .then_with(|| b.win_rate.total_cmp(&a.win_rate))
            .then_with(|| a.profile.cmp(&b.profile))
    });
    rankings
}

fn mean<F: Fn(&RunRecord) -> f64>(runs: &[&RunRecord], f: F) -> f64 {
    if runs.is_empty() {
        return 0.0;
    }
    runs.iter().map(|r| f(r)).sum::<f64>() / runs.len() as f64
}

fn write_runs_csv(path: &Path, rows: &[RunRecord]) -> Result<()> {
    let mut csv = String::from(
        "profile,seed_hex,seed,episodes,wins,losses,win_rate,coins,mean_survival_time,sim_time,timed_out,table_states,objective_value,magnet,reflex,tactical,strategic,halted,lockouts,conflict_replans\n",
    );
    for row in rows {
        let m = &row.metrics;
        csv.push_str(&format!(
            "{},{},{},{},{},{},{:.4},{},{:.2},{:.2},{},{},{:.4},{},{},{},{},{},{},{}\n",
            m.profile,
            m.seed_hex,
            m.seed,
            m.episodes,
            m.wins,
            m.losses,
            m.win_rate,
            m.coins,
            m.mean_survival_time,
            m.sim_time,
            m.timed_out,
            m.table_states,
            row.objective_value,
            m.layers.magnet,
            m.layers.reflex,
            m.layers.tactical,
            m.layers.strategic,
            m.layers.halted,
            m.layers.lockouts,
            m.layers.conflict_replans
        ));
    }
    fs::write(path, csv).with_context(|| format!("failed writing {}", path.display()))
}

fn write_rankings_csv(path: &Path, rows: &[ProfileAggregate]) -> Result<()> {
    let mut csv = String::from(
        "rank,profile,runs,episodes,wins,losses,win_rate,avg_coins,avg_survival_time,timed_out_runs,objective_value,avg_magnet,avg_reflex,avg_tactical,avg_strategic,avg_lockouts\n",
    );
    for (idx, row) in rows.iter().enumerate() {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{:.4},{:.2},{:.2},{},{:.4},{:.1},{:.1},{:.1},{:.1},{:.2}\n",
            idx + 1,
            row.profile,
            row.runs,
            row.episodes,
            row.wins,
            row.losses,
            row.win_rate,
            row.avg_coins,
            row.avg_survival_time,
            row.timed_out_runs,
            row.objective_value,
            row.avg_magnet,
            row.avg_reflex,
            row.avg_tactical,
            row.avg_strategic,
            row.avg_lockouts
        ));
    }
    fs::write(path, csv).with_context(|| format!("failed writing {}", path.display()))
}
