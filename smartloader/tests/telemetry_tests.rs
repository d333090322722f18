// JSONL records written by the episode controller.

mod common;

use common::{fast_config, frames, scripted_rig_with_context, FrameSpec};

use smartloader::config::TaskKind;
use smartloader::context::ControlContext;
use smartloader::rl::ControlDecision;
use smartloader::telemetry::{TelemetryConfig, TelemetrySink};

#[test]
fn episode_writes_step_and_end_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("episode.jsonl");
    let ctx = ControlContext::new(TelemetrySink::from_config(TelemetryConfig::jsonl(&path)));

    let script = frames(3, |i| {
        FrameSpec::new([250.0, 250.0, 0.0], vec![[250.0, 252.0, 0.0]]).loaded(vec![i < 3])
    });
    let mut rig = scripted_rig_with_context(
        fast_config(TaskKind::PutDown),
        ctx,
        FrameSpec::new([250.0, 250.0, 0.0], vec![[250.0, 252.0, 1.0]]).loaded(vec![true]),
        script,
    );
    rig.env.reset().unwrap();
    for _ in 0..3 {
        rig.env.step(&ControlDecision::new(0.25, 0.5, 0.0, 0.0)).unwrap();
    }

    let text = std::fs::read_to_string(&path).unwrap();
    let records: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(records.len(), 4);

    for (i, r) in records[..3].iter().enumerate() {
        assert_eq!(r["kind"], "step");
        assert_eq!(r["episode"], 1);
        assert_eq!(r["step"], i as u64 + 1);
        assert_eq!(r["decision"]["steer"], 0.25);
        assert_eq!(r["done"], i == 2);
    }
    assert!(records[1]["reason"].is_null());
    assert_eq!(records[2]["reason"], "sim success");
    assert_eq!(records[2]["reward"]["terminal"], 998.0);

    let end = &records[3];
    assert_eq!(end["kind"], "episode_end");
    assert_eq!(end["task"], "put_down");
    assert_eq!(end["steps"], 3);
    assert_eq!(end["reason"], "sim success");
    let total = end["total_reward"].as_f64().unwrap();
    assert!((total - (998.0 - 0.3)).abs() < 1e-9);
}
