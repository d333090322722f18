// Episode controller behaviour against a scripted rig.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{fast_config, frames, ingest, scripted_rig, stuck_arm_rig, FrameSpec};

use smartloader::config::{Randomization, TaskKind, TaskParams};
use smartloader::context::ControlContext;
use smartloader::error::EnvError;
use smartloader::io::noop::{CommandRecorder, NoopSimulator, RecordingActuator};
use smartloader::rl::{run_episode, ActuatorCommand, ControlDecision, EpisodePhase, Observation};
use smartloader::{LoaderEnv, TerminationReason};

#[track_caller]
fn assert_close(got: f64, want: f64) {
    assert!((got - want).abs() < 1e-9, "expected {want}, got {got}");
}

const STONE_START: [f64; 3] = [12.5, 10.0, 0.25];

fn forward() -> ControlDecision {
    ControlDecision::drive_forward()
}

#[test]
fn step_before_reset_is_a_contract_violation() {
    let mut rig = scripted_rig(
        fast_config(TaskKind::Push),
        FrameSpec::new([10.0, 10.0, 0.0], vec![STONE_START]),
        vec![],
    );
    let err = rig.env.step(&forward()).unwrap_err();
    assert!(err.is_contract_violation());
    assert!(matches!(
        err,
        EnvError::ContractViolation {
            op: "step",
            phase: EpisodePhase::Uninitialized
        }
    ));
    assert!(rig.recorder.is_empty(), "no command may reach the rig");
}

#[test]
fn put_down_success_after_forty_two_steps() {
    let cfg = fast_config(TaskKind::PutDown);
    let script = frames(42, |i| {
        if i < 42 {
            FrameSpec::new([100.0, 100.0, 0.0], vec![[100.0, 100.0, 1.0]]).loaded(vec![true])
        } else {
            FrameSpec::new([250.0, 244.0, 0.0], vec![[250.0, 246.8, 0.0]]).loaded(vec![false])
        }
    });
    let mut rig = scripted_rig(
        cfg,
        FrameSpec::new([100.0, 100.0, 0.0], vec![[100.0, 100.0, 1.0]]).loaded(vec![true]),
        script,
    );

    rig.env.reset().unwrap();
    assert_eq!(rig.env.phase(), EpisodePhase::Ready);

    let mut last = None;
    for i in 1..=42u64 {
        let r = rig.env.step(&forward()).unwrap();
        assert_eq!(r.info.step, i);
        if i < 42 {
            assert!(!r.done, "step {i} ended early");
            assert_eq!(r.info.reason_label(), "No");
            assert_close(r.reward, -0.1);
        }
        last = Some(r);
    }
    let last = last.unwrap();
    assert!(last.done);
    assert_eq!(last.info.reason, Some(TerminationReason::Success));
    assert_eq!(last.info.reason_label(), "sim success");
    assert!((last.info.reward.terminal - 996.8).abs() < 1e-6);
    assert!((last.reward - 996.7).abs() < 1e-6);
    assert!((last.info.total_reward - 992.6).abs() < 1e-6);
    assert_eq!(rig.env.phase(), EpisodePhase::Terminated);
    assert_eq!(rig.counts.lock().killed, 1, "done step stops the scene");
}

#[test]
fn put_down_ignores_stones_that_were_never_loaded() {
    let script = frames(3, |_| {
        FrameSpec::new([250.0, 250.0, 0.0], vec![[250.0, 250.0, 0.0]]).loaded(vec![false])
    });
    let mut rig = scripted_rig(
        fast_config(TaskKind::PutDown),
        FrameSpec::new([250.0, 250.0, 0.0], vec![[250.0, 250.0, 0.0]]).loaded(vec![false]),
        script,
    );
    rig.env.reset().unwrap();
    for _ in 0..3 {
        let r = rig.env.step(&forward()).unwrap();
        assert!(!r.done, "step {} ended the episode", r.info.step);
        assert_close(r.reward, -0.1);
    }
    assert_eq!(rig.env.phase(), EpisodePhase::Running);
}

#[test]
fn step_after_done_is_rejected_until_reset() {
    let script = frames(2, |i| {
        FrameSpec::new([250.0, 249.0, 0.0], vec![[250.0, 250.0, 0.0]]).loaded(vec![i < 2])
    });
    let mut rig = scripted_rig(
        fast_config(TaskKind::PutDown),
        FrameSpec::new([100.0, 100.0, 0.0], vec![[100.0, 100.0, 1.0]]).loaded(vec![true]),
        script,
    );
    rig.env.reset().unwrap();
    assert!(!rig.env.step(&forward()).unwrap().done);
    assert!(rig.env.step(&forward()).unwrap().done);

    let sent = rig.recorder.len();
    let err = rig.env.step(&forward()).unwrap_err();
    assert!(matches!(
        err,
        EnvError::ContractViolation {
            phase: EpisodePhase::Terminated,
            ..
        }
    ));
    assert_eq!(rig.recorder.len(), sent);

    // A fresh episode replays the script from the start.
    rig.env.reset().unwrap();
    assert_eq!(rig.env.episodes_started(), 2);
    assert!(!rig.env.step(&forward()).unwrap().done);
    assert!(rig.env.step(&forward()).unwrap().done);
    assert_eq!(rig.counts.lock().started, 2);
}

#[test]
fn pick_up_pays_per_rising_stone_and_succeeds_at_threshold() {
    let params = TaskParams {
        pickup_height_limit: 15.0,
        ..TaskParams::default()
    };
    let heights = [5.0, 5.0, 12.0, 12.0, 20.0];
    let script = frames(5, |i| FrameSpec::new([10.0, 10.0, 0.0], vec![[12.5, 10.0, heights[i - 1]]]));
    let mut rig = scripted_rig(
        fast_config(TaskKind::PickUp).with_params(params),
        FrameSpec::new([10.0, 10.0, 0.0], vec![[12.5, 10.0, 0.25]]),
        script,
    );
    rig.env.reset().unwrap();

    let rewards: Vec<f64> = (0..5)
        .map(|_| rig.env.step(&forward()).unwrap())
        .map(|r| {
            assert_eq!(r.done, r.info.step == 5);
            r.reward
        })
        .collect();

    // No baseline on the first step, so only steps 3 and 5 earn the bonus.
    let expected = [-0.1, -0.1, 9.9, -0.1, 9.9];
    for (got, want) in rewards.iter().zip(expected) {
        assert_close(*got, want);
    }
    let ep = rig.env.episode().unwrap();
    assert!((ep.total_reward - 19.5).abs() < 1e-9);
}

#[test]
fn pick_up_times_out_at_the_step_budget() {
    let params = TaskParams {
        max_steps: 3,
        ..TaskParams::default()
    };
    let script = frames(3, |_| FrameSpec::new([10.0, 10.0, 0.0], vec![STONE_START]));
    let mut rig = scripted_rig(
        fast_config(TaskKind::PickUp).with_params(params),
        FrameSpec::new([10.0, 10.0, 0.0], vec![STONE_START]),
        script,
    );
    rig.env.reset().unwrap();
    assert!(!rig.env.step(&forward()).unwrap().done);
    assert!(!rig.env.step(&forward()).unwrap().done);
    let last = rig.env.step(&forward()).unwrap();
    assert!(last.done);
    assert_eq!(last.info.reason_label(), "limit time steps");
}

#[test]
fn relocate_penalises_the_first_drop_once() {
    let script = vec![
        FrameSpec::new([100.0, 100.0, 0.0], vec![[100.0, 100.0, 1.0]]).loaded(vec![true]),
        FrameSpec::new([120.0, 120.0, 0.0], vec![[120.0, 120.0, 0.0]]).loaded(vec![false]),
        FrameSpec::new([200.0, 200.0, 0.0], vec![[120.0, 120.0, 0.0]]).loaded(vec![false]),
        FrameSpec::new([250.0, 250.05, 0.0], vec![[120.0, 120.0, 0.0]]).loaded(vec![false]),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, f)| f.tick(i as f64 + 1.0).build())
    .collect();
    let mut rig = scripted_rig(
        fast_config(TaskKind::Relocate),
        FrameSpec::new([100.0, 100.0, 0.0], vec![[100.0, 100.0, 1.0]]).loaded(vec![true]),
        script,
    );
    rig.env.reset().unwrap();

    let r1 = rig.env.step(&forward()).unwrap();
    assert_close(r1.reward, -0.1);
    let r2 = rig.env.step(&forward()).unwrap();
    assert_close(r2.info.reward.drop_penalty, -1000.0);
    let r3 = rig.env.step(&forward()).unwrap();
    assert_close(r3.info.reward.drop_penalty, 0.0);
    assert!(!r3.done);
    let r4 = rig.env.step(&forward()).unwrap();
    assert!(r4.done);
    assert_eq!(r4.info.reason, Some(TerminationReason::Success));
    assert!((r4.reward - 999.9).abs() < 1e-9);
}

#[test]
fn relocate_stone_resting_on_the_ground_is_not_a_drop() {
    let script = frames(3, |i| {
        FrameSpec::new([100.0 + i as f64, 100.0, 0.0], vec![[120.0, 120.0, 0.0]]).loaded(vec![false])
    });
    let mut rig = scripted_rig(
        fast_config(TaskKind::Relocate),
        FrameSpec::new([100.0, 100.0, 0.0], vec![[120.0, 120.0, 0.0]]).loaded(vec![false]),
        script,
    );
    rig.env.reset().unwrap();
    for _ in 0..3 {
        let r = rig.env.step(&forward()).unwrap();
        assert_close(r.info.reward.drop_penalty, 0.0);
        assert_close(r.reward, -0.1);
    }
}

#[test]
fn push_rewards_blade_progress_toward_the_stone() {
    let script = vec![
        FrameSpec::new([10.0, 10.0, 0.0], vec![STONE_START]).tick(1.0).build(),
        FrameSpec::new([11.0, 10.0, 0.0], vec![STONE_START]).tick(2.0).build(),
    ];
    let mut rig = scripted_rig(
        fast_config(TaskKind::Push),
        FrameSpec::new([10.0, 10.0, 0.0], vec![STONE_START]),
        script,
    );
    rig.env.reset().unwrap();
    let first = rig.env.step(&forward()).unwrap();
    // Blade sits on the vehicle with identity orientation: 2.5^2 from the stone.
    assert!((first.info.reward.blade_progress - 0.1 * (9.0 - 6.25)).abs() < 1e-9);

    let second = rig.env.step(&forward()).unwrap();
    assert!(!second.done);
    assert!((second.info.reward.blade_progress - 0.4).abs() < 1e-9);
    assert!(second.info.reward.stone_progress.abs() < 1e-9);
    assert!((second.reward - 0.4).abs() < 1e-9);
}

#[test]
fn push_leaving_the_scene_ends_out_of_bounds() {
    let script = frames(1, |_| FrameSpec::new([10.0, 20.0, 0.0], vec![STONE_START]));
    let mut rig = scripted_rig(
        fast_config(TaskKind::Push),
        FrameSpec::new([10.0, 10.0, 0.0], vec![STONE_START]),
        script,
    );
    rig.env.reset().unwrap();
    let r = rig.env.step(&forward()).unwrap();
    assert!(r.done);
    assert_eq!(r.info.reason_label(), "out of boarders");
    assert_close(r.info.reward.terminal, -10_000.0);
    assert!(r.reward < -9_000.0);
}

#[test]
fn observations_are_relative_to_the_target_when_normalized() {
    let initial = FrameSpec::new([100.0, 90.0, 0.5], vec![[110.0, 120.0, 1.0]]).arm(18.0);
    let mut rig = scripted_rig(fast_config(TaskKind::PutDown), initial.clone(), vec![]);
    let obs = rig.env.reset().unwrap();
    assert_eq!(obs.len(), 27);
    assert_eq!(obs.step, 0);
    assert!(obs.normalized);
    assert_eq!(&obs.as_slice()[0..3], &[-150.0, -160.0, 0.5]);
    assert_eq!(obs.as_slice()[13], 18.0, "arm height is not shifted");
    assert_eq!(&obs.as_slice()[24..27], &[-140.0, -130.0, 1.0]);

    let mut raw = scripted_rig(
        fast_config(TaskKind::PutDown).with_normalized(false),
        initial,
        vec![],
    );
    let obs = raw.env.reset().unwrap();
    assert_eq!(&obs.as_slice()[0..3], &[100.0, 90.0, 0.5]);
    assert!(raw.env.observation_space().contains(&obs));
}

#[test]
fn reset_lowers_the_blade_before_the_first_observation() {
    let mut rig = scripted_rig(
        fast_config(TaskKind::Push),
        FrameSpec::new([10.0, 10.0, 0.0], vec![STONE_START]).arm(60.0),
        vec![],
    );
    let obs = rig.env.reset().unwrap();
    // 60 -> 40 -> 20 with two blade-down commands.
    let sent: Vec<ActuatorCommand> = rig.recorder.commands().iter().map(|r| r.command).collect();
    assert_eq!(sent, vec![ActuatorCommand::blade_down(); 2]);
    assert_eq!(obs.as_slice()[13], 20.0);
}

#[test]
fn stuck_arm_times_out_the_reset_as_a_whole() {
    let mut rig = stuck_arm_rig(
        fast_config(TaskKind::Push).with_deadline(Some(Duration::from_millis(100))),
        FrameSpec::new([10.0, 10.0, 0.0], vec![STONE_START]).arm(60.0),
    );
    let started = Instant::now();
    let err = rig.env.reset().unwrap_err();
    assert!(matches!(err, EnvError::Timeout { .. }), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!rig.recorder.is_empty());
    assert!(rig
        .recorder
        .commands()
        .iter()
        .all(|r| r.command == ActuatorCommand::blade_down()));
}

#[test]
fn repeated_sample_is_skipped_until_the_observation_changes() {
    let initial = FrameSpec::new([10.0, 10.0, 0.0], vec![STONE_START]);
    let repeat = initial.build();
    let moved = FrameSpec::new([11.0, 10.0, 0.0], vec![STONE_START]).tick(1.0).build();

    let ctx = ControlContext::quiet();
    let store = Arc::clone(ctx.store());
    let start_store = Arc::clone(&store);
    let initial_frame = initial.build();
    let simulator = NoopSimulator::new().with_start_hook(Box::new(move |_: Randomization, _: usize| {
        ingest(&start_store, &initial_frame);
    }));
    let send_store = Arc::clone(&store);
    let actuator = RecordingActuator::new(CommandRecorder::new()).with_hook(Box::new(
        move |_: &ActuatorCommand, _: usize| {
            // Same values again right away, the real change a little later.
            ingest(&send_store, &repeat);
            let late_store = Arc::clone(&send_store);
            let late = moved.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ingest(&late_store, &late);
            });
        },
    ));
    let cfg = fast_config(TaskKind::Push).with_normalized(false);
    let mut env = LoaderEnv::new(cfg, ctx, actuator, simulator).unwrap();

    env.reset().unwrap();
    let r = env.step(&forward()).unwrap();
    assert_eq!(r.observation.as_slice()[0], 11.0);
    // Blade 1.5 from the stone in the scored snapshot, not 2.5.
    assert_close(r.info.reward.blade_progress, 0.1 * (9.0 - 2.25));
}

#[test]
fn stalled_rig_times_out_the_step() {
    let mut rig = scripted_rig(
        fast_config(TaskKind::Push).with_deadline(Some(Duration::from_millis(50))),
        FrameSpec::new([10.0, 10.0, 0.0], vec![STONE_START]),
        vec![],
    );
    rig.env.reset().unwrap();
    let err = rig.env.step(&forward()).unwrap_err();
    assert!(matches!(err, EnvError::Timeout { .. }), "got {err:?}");
    assert!(!err.is_contract_violation());
}

#[test]
fn steps_are_paced_to_the_control_period() {
    let period = Duration::from_millis(15);
    let script = frames(4, |i| FrameSpec::new([10.0 + 0.01 * i as f64, 10.0, 0.0], vec![STONE_START]));
    let mut rig = scripted_rig(
        fast_config(TaskKind::Push).with_control_period(period),
        FrameSpec::new([10.0, 10.0, 0.0], vec![STONE_START]),
        script,
    );
    rig.env.reset().unwrap();
    for _ in 0..4 {
        rig.env.step(&forward()).unwrap();
    }
    let intervals = rig.env.time_steps();
    assert_eq!(intervals.len(), 4);
    assert!(intervals.iter().all(|dt| *dt >= period), "{intervals:?}");
}

#[test]
fn run_episode_drives_until_done() {
    let script = frames(3, |i| {
        let loaded = i < 3;
        FrameSpec::new([250.0, 250.0, 0.0], vec![[250.0, 250.0, 0.0]]).loaded(vec![loaded])
    });
    let mut rig = scripted_rig(
        fast_config(TaskKind::PutDown),
        FrameSpec::new([250.0, 250.0, 0.0], vec![[250.0, 250.0, 1.0]]).loaded(vec![true]),
        script,
    );
    let mut seen = Vec::new();
    let mut policy = |obs: &Observation| {
        seen.push(obs.step);
        ControlDecision::drive_forward()
    };
    let summary = run_episode(&mut rig.env, &mut policy, None).unwrap();
    assert_eq!(seen, vec![0, 1, 2]);
    assert_eq!(summary.steps, 3);
    assert_eq!(summary.reason, Some(TerminationReason::Success));
    assert_eq!(summary.task, "put_down");
    assert!((summary.total_reward - (1000.0 - 0.3)).abs() < 1e-9);
}

#[test]
fn run_episode_step_cap_closes_the_scene() {
    let script = frames(10, |i| FrameSpec::new([10.0 + 0.01 * i as f64, 10.0, 0.0], vec![STONE_START]));
    let mut rig = scripted_rig(
        fast_config(TaskKind::Push),
        FrameSpec::new([10.0, 10.0, 0.0], vec![STONE_START]),
        script,
    );
    let mut policy = |_: &Observation| ControlDecision::idle();
    let summary = run_episode(&mut rig.env, &mut policy, Some(2)).unwrap();
    assert_eq!(summary.steps, 2);
    assert_eq!(summary.reason, None);
    assert_eq!(rig.env.phase(), EpisodePhase::Terminated);
    assert_eq!(rig.counts.lock().killed, 1);
}

#[test]
fn run_episode_closes_the_scene_when_a_step_fails() {
    let mut rig = scripted_rig(
        fast_config(TaskKind::Push).with_deadline(Some(Duration::from_millis(50))),
        FrameSpec::new([10.0, 10.0, 0.0], vec![STONE_START]),
        vec![],
    );
    let mut policy = |_: &Observation| ControlDecision::idle();
    let err = run_episode(&mut rig.env, &mut policy, Some(5)).unwrap_err();
    assert!(matches!(err, EnvError::Timeout { .. }), "got {err:?}");
    assert_eq!(rig.counts.lock().killed, 1);
    assert_eq!(rig.env.phase(), EpisodePhase::Terminated);
}
