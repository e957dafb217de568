//! Runs a random policy on a synthetic world served by a bridge thread.
//!
//! The bridge plays the role of the simulator: a straight road with walls on both
//! sides, and a goal 100 m ahead. Leaving the lane crosses a solid marking.
use anyhow::{anyhow, Result};
use border_carla_env::{
    simulator::{SimulatorCommand, Vector3, WorldFrame},
    CarlaAct, CarlaEnv, CarlaEnvConfig, CarlaObs, ChannelSimulator, ChannelSimulatorConfig,
    LaneMarkingType, Location, PointCloud, VehicleControl, VehicleKinematics,
};
use border_core::{DefaultEvaluator, Evaluator, Policy};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::thread;

type Env = CarlaEnv<ChannelSimulator>;

const DT: f32 = 0.05;
const LANE_HALF_WIDTH: f32 = 1.75;
const ROAD_HALF_WIDTH: f32 = 5.0;

struct RandomPolicy;

impl Policy<Env> for RandomPolicy {
    fn sample(&mut self, _: &CarlaObs) -> CarlaAct {
        let accel = fastrand::f32() * 1.5 - 0.5;
        let steer = fastrand::f32() * 0.2 - 0.1;
        CarlaAct::new(accel, steer).unwrap_or_else(|_| CarlaAct::stop())
    }
}

/// Points on the walls of the road, in the frame of the vehicle.
fn walls(y: f32) -> PointCloud {
    let points = (-20..=20)
        .flat_map(|i| {
            let x = i as f32;
            vec![
                [x, ROAD_HALF_WIDTH - y, 0.5, 1.0],
                [x, -ROAD_HALF_WIDTH - y, 0.5, 1.0],
            ]
        })
        .collect();
    PointCloud::from_points(points)
}

fn bridge(commands: Receiver<SimulatorCommand>, frames: Sender<WorldFrame>) {
    let mut control = VehicleControl::STOP;
    let mut kinematics = VehicleKinematics::default();
    let mut frame = 0;

    for command in commands.iter() {
        match command {
            SimulatorCommand::SpawnLidar(handle, config) => {
                log::info!("Lidar {:?} with {} bins", handle, config.n_bins);
            }
            SimulatorCommand::ApplyControl(c) => control = c,
            SimulatorCommand::ResetEventSensors => {
                kinematics = VehicleKinematics::default();
            }
            SimulatorCommand::Tick(tick) => {
                frame += 1;
                let accel = (control.throttle - control.brake) * 4.0;
                let speed = (kinematics.velocity.x + accel * DT).max(0.0);
                kinematics.acceleration =
                    Vector3::new((speed - kinematics.velocity.x) / DT, 0.0, 0.0);
                kinematics.velocity = Vector3::new(speed, control.steer * speed, 0.0);
                kinematics.location.x += kinematics.velocity.x * DT;
                kinematics.location.y += kinematics.velocity.y * DT;
                kinematics.forward_vector = kinematics.rotation.forward_vector();

                let lane_invasions = if kinematics.location.y.abs() > LANE_HALF_WIDTH {
                    vec![LaneMarkingType::Solid]
                } else {
                    vec![]
                };
                let world = WorldFrame {
                    tick,
                    frame,
                    lidar: walls(kinematics.location.y).to_bytes(),
                    kinematics,
                    collisions: vec![],
                    lane_invasions,
                    expert_control: VehicleControl {
                        throttle: 0.5,
                        steer: -0.1 * kinematics.location.y,
                        brake: 0.0,
                    },
                };
                if frames.send(world).is_err() {
                    break;
                }
            }
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    fastrand::seed(42);

    let (frame_s, frame_r) = unbounded();
    let (cmd_s, cmd_r) = unbounded();
    let handle = thread::spawn(move || bridge(cmd_r, frame_s));

    let config = CarlaEnvConfig::with_client(ChannelSimulatorConfig {
        frames: frame_r,
        commands: cmd_s,
        target_location: Location::new(100.0, 0.0, 0.0),
    })
    .route(0)
    .max_episode_steps(200);

    let mut evaluator = DefaultEvaluator::<Env>::new(&config, 42, 5)?;
    let record = evaluator.evaluate(&mut RandomPolicy)?;
    println!(
        "Episode return: {}, episode length: {}",
        record.get_scalar("Episode return")?,
        record.get_scalar("Episode length")?
    );

    drop(evaluator);
    drop(config);
    handle
        .join()
        .map_err(|_| anyhow!("The bridge thread panicked"))?;

    Ok(())
}
