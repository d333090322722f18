// src/io/sim.rs
//
// In-process kinematic scene.
//
// A stand-in for the external simulator, good enough to exercise the full
// reset/step loop without a rig:
// - one integrator thread advances a planar vehicle model from the latest
//   actuator command every `tick`
// - one producer thread per sensor channel publishes through `SensorHub`
//   at `publish_period`, with a little seeded IMU noise so consecutive
//   observations always differ
// - stones in front of the blade are pushed along; a stone in contact with
//   the arm raised past `load_height` is carried and reported loaded
//
// There is no physics beyond that.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::Randomization;
use crate::error::{EnvError, Result};
use crate::io::{ActuatorSink, SimulatorLifecycle};
use crate::io::noop::CommandRecorder;
use crate::rl::action_encoding::ActuatorCommand;
use crate::sensors::{Imu, PoseStamped, SensorHub, TwistStamped};

/// Scene tuning.
#[derive(Debug, Clone)]
pub struct SceneConfig {
    pub num_stones: usize,
    /// Integrator step.
    pub tick: Duration,
    /// Spacing between samples on each sensor channel.
    pub publish_period: Duration,
    /// Vehicle speed at a fully pressed pedal (units/s).
    pub max_speed: f64,
    /// Yaw rate at full steer (rad/s).
    pub turn_rate: f64,
    /// Arm height change at full command (height units/s).
    pub arm_rate: f64,
    /// Blade pitch change at full command (deg/s).
    pub pitch_rate: f64,
    pub initial_arm_height: f64,
    /// Distance from vehicle centre to the blade edge used for contact.
    pub blade_reach: f64,
    pub contact_radius: f64,
    /// Arm height above which a stone in contact is carried.
    pub load_height: f64,
    /// Amplitude of the uniform IMU acceleration noise.
    pub imu_noise: f64,
    pub seed: u64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            num_stones: 1,
            tick: Duration::from_millis(5),
            publish_period: Duration::from_millis(5),
            max_speed: 2.0,
            turn_rate: 0.8,
            arm_rate: 40.0,
            pitch_rate: 45.0,
            initial_arm_height: 60.0,
            blade_reach: 1.0,
            contact_radius: 0.6,
            load_height: 50.0,
            imu_noise: 1e-3,
            seed: 0,
        }
    }
}

impl SceneConfig {
    pub fn with_num_stones(mut self, n: usize) -> Self {
        self.num_stones = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Integrated scene state.
#[derive(Debug, Clone)]
pub struct Kinematics {
    pub vehicle: Vector3<f64>,
    pub yaw: f64,
    pub speed: f64,
    pub yaw_rate: f64,
    pub arm_height: f64,
    pub blade_pitch_deg: f64,
    pub stones: Vec<Vector3<f64>>,
    pub ground_z: Vec<f64>,
    pub loaded: Vec<bool>,
}

impl Kinematics {
    pub fn spawn<R: Rng>(cfg: &SceneConfig, randomization: Randomization, rng: &mut R) -> Self {
        let vehicle = Vector3::new(10.0, 10.0, 0.0);
        let stones: Vec<Vector3<f64>> = (0..cfg.num_stones)
            .map(|i| match randomization {
                Randomization::VeryBasic => Vector3::new(
                    12.5 + rng.gen_range(-0.05..0.05),
                    10.0 + i as f64 + rng.gen_range(-0.05..0.05),
                    0.25,
                ),
                Randomization::Basic => Vector3::new(
                    vehicle.x + rng.gen_range(2.0..4.0),
                    vehicle.y + rng.gen_range(-2.0..2.0),
                    0.25,
                ),
            })
            .collect();
        Self {
            vehicle,
            yaw: 0.0,
            speed: 0.0,
            yaw_rate: 0.0,
            arm_height: cfg.initial_arm_height,
            blade_pitch_deg: 0.0,
            ground_z: stones.iter().map(|s| s.z).collect(),
            loaded: vec![false; stones.len()],
            stones,
        }
    }

    pub fn heading(&self) -> Vector3<f64> {
        Vector3::new(self.yaw.cos(), self.yaw.sin(), 0.0)
    }

    pub fn blade_tip(&self, reach: f64) -> Vector3<f64> {
        self.vehicle + self.heading() * reach
    }

    pub fn orientation(&self) -> Quaternion<f64> {
        UnitQuaternion::from_euler_angles(0.0, 0.0, self.yaw).into_inner()
    }

    pub fn blade_orientation(&self) -> Quaternion<f64> {
        UnitQuaternion::from_euler_angles(0.0, self.blade_pitch_deg.to_radians(), self.yaw).into_inner()
    }

    /// Advance by `dt` seconds under `cmd`.
    pub fn advance(&mut self, cmd: &ActuatorCommand, dt: f64, cfg: &SceneConfig) {
        // pedals: +1 released, -1 fully pressed
        let throttle = (cmd.drive_backward() - cmd.drive_forward()) / 2.0;
        self.speed = throttle * cfg.max_speed;
        self.yaw_rate = cmd.steer() * cfg.turn_rate;

        let tip_before = self.blade_tip(cfg.blade_reach);
        self.yaw = wrap_angle(self.yaw + self.yaw_rate * dt);
        self.vehicle += self.heading() * self.speed * dt;
        let tip_after = self.blade_tip(cfg.blade_reach);

        self.arm_height = (self.arm_height + cmd.arm_height() * cfg.arm_rate * dt).clamp(0.0, 100.0);
        self.blade_pitch_deg = (self.blade_pitch_deg + cmd.blade_pitch() * cfg.pitch_rate * dt).clamp(-45.0, 45.0);

        let shift = tip_after - tip_before;
        for i in 0..self.stones.len() {
            let stone = &mut self.stones[i];
            let dx = stone.x - tip_after.x;
            let dy = stone.y - tip_after.y;
            let in_contact = (dx * dx + dy * dy).sqrt() < cfg.contact_radius;

            if self.loaded[i] {
                if self.arm_height < cfg.load_height {
                    self.loaded[i] = false;
                    stone.z = self.ground_z[i];
                } else {
                    stone.x = tip_after.x;
                    stone.y = tip_after.y;
                    stone.z = self.arm_height;
                }
            } else if in_contact {
                if self.arm_height >= cfg.load_height {
                    self.loaded[i] = true;
                    stone.z = self.arm_height;
                } else if self.speed > 0.0 {
                    stone.x += shift.x;
                    stone.y += shift.y;
                }
            }
        }
    }
}

fn wrap_angle(a: f64) -> f64 {
    let mut a = a;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Actuator sink feeding the scene's integrator.
#[derive(Clone)]
pub struct SceneActuator {
    command: Arc<Mutex<ActuatorCommand>>,
    recorder: Option<CommandRecorder>,
}

impl SceneActuator {
    pub fn with_recorder(mut self, recorder: CommandRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }
}

impl ActuatorSink for SceneActuator {
    fn send(&mut self, command: &ActuatorCommand) -> Result<()> {
        *self.command.lock() = *command;
        if let Some(recorder) = &self.recorder {
            recorder.record(*command);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "SceneActuator"
    }
}

pub struct KinematicScene {
    cfg: SceneConfig,
    hub: SensorHub,
    command: Arc<Mutex<ActuatorCommand>>,
    state: Arc<Mutex<Option<Kinematics>>>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    rng: ChaCha8Rng,
    episodes: u64,
}

impl KinematicScene {
    pub fn new(hub: SensorHub, cfg: SceneConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(cfg.seed);
        Self {
            cfg,
            hub,
            command: Arc::new(Mutex::new(ActuatorCommand::neutral())),
            state: Arc::new(Mutex::new(None)),
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            rng,
            episodes: 0,
        }
    }

    pub fn actuator(&self) -> SceneActuator {
        SceneActuator {
            command: Arc::clone(&self.command),
            recorder: None,
        }
    }

    /// Copy of the integrated state, if a scene is running.
    pub fn kinematics(&self) -> Option<Kinematics> {
        self.state.lock().clone()
    }

    fn spawn_worker<F>(&mut self, name: String, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(name)
            .spawn(body)
            .map_err(|e| EnvError::Simulator(format!("failed to spawn scene thread: {e}")))?;
        self.workers.push(handle);
        Ok(())
    }

    fn spawn_integrator(&mut self) -> Result<()> {
        let stop = Arc::clone(&self.stop);
        let state = Arc::clone(&self.state);
        let command = Arc::clone(&self.command);
        let cfg = self.cfg.clone();
        self.spawn_worker("scene-integrator".into(), move || {
            let dt = cfg.tick.as_secs_f64();
            while !stop.load(Ordering::Acquire) {
                let cmd = *command.lock();
                if let Some(k) = state.lock().as_mut() {
                    k.advance(&cmd, dt, &cfg);
                }
                thread::sleep(cfg.tick);
            }
        })
    }

    /// One producer per channel. `publish` reads the state and writes samples.
    fn spawn_producer<F>(&mut self, name: String, seed: u64, mut publish: F) -> Result<()>
    where
        F: FnMut(&SensorHub, &Kinematics, &mut ChaCha8Rng) + Send + 'static,
    {
        let stop = Arc::clone(&self.stop);
        let state = Arc::clone(&self.state);
        let hub = self.hub.clone();
        let period = self.cfg.publish_period;
        self.spawn_worker(name, move || {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            while !stop.load(Ordering::Acquire) {
                let snapshot = state.lock().clone();
                if let Some(k) = snapshot {
                    publish(&hub, &k, &mut rng);
                }
                thread::sleep(period);
            }
        })
    }

    fn spawn_producers(&mut self) -> Result<()> {
        let base = self.cfg.seed.wrapping_mul(31).wrapping_add(self.episodes);
        let noise = self.cfg.imu_noise;

        self.spawn_producer("sensor-vehicle-pose".into(), base, |hub, k, _| {
            hub.on_vehicle_pose(&PoseStamped {
                position: k.vehicle,
                orientation: k.orientation(),
            });
        })?;
        self.spawn_producer("sensor-vehicle-velocity".into(), base + 1, |hub, k, _| {
            hub.on_vehicle_velocity(&TwistStamped {
                linear: k.heading() * k.speed,
                angular: Vector3::new(0.0, 0.0, k.yaw_rate),
            });
        })?;
        self.spawn_producer("sensor-vehicle-imu".into(), base + 2, move |hub, k, rng| {
            hub.on_vehicle_imu(&Imu {
                orientation: k.orientation(),
                angular_velocity: Vector3::new(0.0, 0.0, k.yaw_rate),
                linear_acceleration: noise_vector(rng, noise),
            });
        })?;
        self.spawn_producer("sensor-arm-height".into(), base + 3, |hub, k, _| {
            hub.on_arm_height(k.arm_height.round() as i32);
        })?;
        self.spawn_producer("sensor-blade-imu".into(), base + 4, move |hub, k, rng| {
            hub.on_blade_imu(&Imu {
                orientation: k.blade_orientation(),
                angular_velocity: Vector3::new(0.0, 0.0, k.yaw_rate),
                linear_acceleration: noise_vector(rng, noise),
            });
        })?;

        for i in 0..self.cfg.num_stones {
            let id = i + 1;
            self.spawn_producer(format!("sensor-stone-{id}"), base + 5 + i as u64, move |hub, k, _| {
                if let (Some(pos), Some(loaded)) = (k.stones.get(i), k.loaded.get(i)) {
                    hub.on_stone_pose(
                        id,
                        &PoseStamped {
                            position: *pos,
                            orientation: Quaternion::identity(),
                        },
                    );
                    hub.on_stone_is_loaded(id, *loaded);
                }
            })?;
        }
        Ok(())
    }
}

fn noise_vector(rng: &mut ChaCha8Rng, amplitude: f64) -> Vector3<f64> {
    if amplitude <= 0.0 {
        return Vector3::zeros();
    }
    Vector3::new(
        rng.gen_range(-amplitude..amplitude),
        rng.gen_range(-amplitude..amplitude),
        rng.gen_range(-amplitude..amplitude),
    )
}

impl SimulatorLifecycle for KinematicScene {
    fn generate_and_run_episode(&mut self, randomization: Randomization) -> Result<()> {
        self.kill_simulation()?;

        let k = Kinematics::spawn(&self.cfg, randomization, &mut self.rng);
        info!(
            episode = self.episodes,
            randomization = randomization.as_str(),
            stones = k.stones.len(),
            "scene generated"
        );
        *self.state.lock() = Some(k);
        *self.command.lock() = ActuatorCommand::neutral();
        self.stop.store(false, Ordering::Release);

        self.spawn_integrator()?;
        self.spawn_producers()?;
        self.episodes += 1;
        Ok(())
    }

    fn kill_simulation(&mut self) -> Result<()> {
        if self.workers.is_empty() {
            return Ok(());
        }
        self.stop.store(true, Ordering::Release);
        let mut panicked = 0;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        *self.state.lock() = None;
        debug!("scene stopped");
        if panicked > 0 {
            return Err(EnvError::Simulator(format!("{panicked} scene threads panicked")));
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        !self.workers.is_empty()
    }

    fn name(&self) -> &str {
        "KinematicScene"
    }
}

impl Drop for KinematicScene {
    fn drop(&mut self) {
        let _ = self.kill_simulation();
    }
}
