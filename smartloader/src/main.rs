// src/main.rs
//
// Harness CLI: run episodes of a task against the kinematic scene with the
// scripted drive-forward policy.
//
// - Task precedence: --task overrides SMARTLOADER_TASK; default push.
// - Other knobs start from SMARTLOADER_* env values; flags override them.
// - Deterministic target and scene via --seed.
// - Prints a one-line run header and one summary line per episode.

use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use smartloader::config::{resolve_effective_task, EnvConfig, TaskKind};
use smartloader::context::ControlContext;
use smartloader::io::sim::{KinematicScene, SceneConfig};
use smartloader::rl::{run_episode, DriveForwardPolicy};
use smartloader::LoaderEnv;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TaskArg {
    PickUp,
    PutDown,
    Relocate,
    Push,
}

impl From<TaskArg> for TaskKind {
    fn from(t: TaskArg) -> Self {
        match t {
            TaskArg::PickUp => TaskKind::PickUp,
            TaskArg::PutDown => TaskKind::PutDown,
            TaskArg::Relocate => TaskKind::Relocate,
            TaskArg::Push => TaskKind::Push,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "smartloader",
    about = "Loader episode control loop against a kinematic scene",
    version
)]
struct Args {
    /// Task variant. If omitted, uses SMARTLOADER_TASK (default push).
    #[arg(long, value_enum)]
    task: Option<TaskArg>,

    /// Number of episodes to run.
    #[arg(long, default_value_t = 1)]
    episodes: u64,

    /// Number of tracked stones.
    #[arg(long)]
    stones: Option<usize>,

    /// Deterministic seed for scene noise and target placement.
    #[arg(long)]
    seed: Option<u64>,

    /// Settle time after scene generation, in milliseconds.
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Control period, in milliseconds.
    #[arg(long)]
    period_ms: Option<u64>,

    /// Bound on every blocking wait, in milliseconds. 0 waits forever.
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Stop an episode after this many steps even if the task has not ended.
    #[arg(long)]
    max_steps: Option<u64>,

    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let effective = resolve_effective_task(args.task.map(TaskKind::from));
    effective.log_startup();

    let mut cfg = EnvConfig::from_env_or_default()
        .with_task(effective.task)
        .with_seed(args.seed);
    if let Some(n) = args.stones {
        cfg = cfg.with_num_stones(n);
    }
    if let Some(ms) = args.settle_ms {
        cfg = cfg.with_settle(Duration::from_millis(ms));
    }
    if let Some(ms) = args.period_ms {
        cfg = cfg.with_control_period(Duration::from_millis(ms));
    }
    if let Some(ms) = args.deadline_ms {
        cfg = cfg.with_deadline((ms > 0).then(|| Duration::from_millis(ms)));
    }
    cfg.validate().context("invalid configuration")?;

    println!(
        "smartloader | task={} | source={} | stones={} | period_ms={} | episodes={} | seed={}",
        cfg.task.as_str(),
        effective.source.as_str(),
        cfg.num_stones,
        cfg.control_period.as_millis(),
        args.episodes,
        args.seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    let ctx = ControlContext::from_env();
    let scene_cfg = SceneConfig::default()
        .with_num_stones(cfg.num_stones)
        .with_seed(args.seed.unwrap_or(0));
    let scene = KinematicScene::new(ctx.sensor_hub(), scene_cfg);
    let actuator = scene.actuator();
    let mut env = LoaderEnv::new(cfg, ctx, actuator, scene).context("building episode controller")?;

    let mut policy = DriveForwardPolicy;
    for _ in 0..args.episodes {
        let summary = run_episode(&mut env, &mut policy, args.max_steps)
            .with_context(|| format!("episode {}", env.episodes_started()))?;
        println!(
            "episode={} | steps={} | total_reward={:.3} | reason={} | target_distance={:.3} | mean_interval_ms={:.2}",
            summary.episode_id,
            summary.steps,
            summary.total_reward,
            summary.reason.map(|r| r.as_str()).unwrap_or("step cap"),
            summary.target_distance,
            summary.mean_interval_ms,
        );
    }
    env.close()?;
    Ok(())
}
