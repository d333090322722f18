// src/bin/llc.rs
//
// Blade-hold controller against the kinematic scene.
//
// Starts one scene, then drives lift and blade pitch to their set-points
// with the saturated PID pair. Prints one line per iteration (or JSON with
// --json) and exits non-zero if the set-points were not reached.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use smartloader::config::Randomization;
use smartloader::io::sim::{KinematicScene, SceneConfig};
use smartloader::io::SimulatorLifecycle;
use smartloader::llc::{BladeHoldController, LlcConfig};
use smartloader::sensors::SensorHub;
use smartloader::world_state::WorldStateStore;

#[derive(Debug, Parser)]
#[command(name = "llc", about = "Hold lift and blade pitch at set-points", version)]
struct Args {
    /// Lift (arm height) set-point.
    #[arg(long, default_value_t = 100.0)]
    lift: f64,

    /// Blade pitch set-point, degrees.
    #[arg(long, default_value_t = 0.0)]
    pitch: f64,

    /// Maximum controller iterations.
    #[arg(long, default_value_t = 100)]
    iterations: usize,

    /// Accept readings within this distance of the set-points.
    #[arg(long, default_value_t = 0.5)]
    tolerance: f64,

    /// Controller period, in milliseconds.
    #[arg(long, default_value_t = 50)]
    period_ms: u64,

    /// Bound on each sensor wait, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    deadline_ms: u64,

    #[arg(long)]
    seed: Option<u64>,

    /// Emit the report as JSON instead of text lines.
    #[arg(long)]
    json: bool,

    /// Verbosity: -v, -vv
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let default = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .init();

    let store = Arc::new(WorldStateStore::new());
    let scene_cfg = SceneConfig::default().with_seed(args.seed.unwrap_or(0));
    let mut scene = KinematicScene::new(SensorHub::new(Arc::clone(&store)), scene_cfg);
    scene
        .generate_and_run_episode(Randomization::VeryBasic)
        .context("starting scene")?;

    let cfg = LlcConfig {
        lift_set_point: args.lift,
        pitch_set_point: args.pitch,
        period: Duration::from_millis(args.period_ms),
        max_iterations: args.iterations,
        tolerance: args.tolerance,
        deadline: Some(Duration::from_millis(args.deadline_ms)),
        ..LlcConfig::default()
    };
    let mut controller = BladeHoldController::new(cfg, store, scene.actuator());
    let report = controller.run().context("running blade-hold controller")?;
    scene.kill_simulation()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for s in &report.samples {
            println!(
                "iter={} | lift={:.2} | pitch={:.2} | lift_out={:.3} | pitch_out={:.3} | dt_ms={:.1}",
                s.iteration, s.lift, s.pitch, s.lift_output, s.pitch_output, s.interval_ms
            );
        }
        println!("reached={}", report.reached);
    }

    Ok(if report.reached {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
