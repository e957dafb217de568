//! A driving environment on the [CARLA](https://carla.org) simulator.
//!
//! [`CarlaEnv`] drives one vehicle along a route to its goal. At every step the
//! action `[accel, steer]` is applied for a tick of the simulator running in
//! synchronous mode, and the environment returns
//!
//! - an observation made of a lidar range histogram and the vehicle state,
//!   together with a one-hot encoding of the route,
//! - a reward shaped by the distance to the goal,
//! - termination flags for collisions, crossing solid lane markings and reaching the goal.
//!
//! The simulator is accessed through [`SimulatorClient`]. [`ChannelSimulator`]
//! implements it on channels fed by a bridge thread, which is how the environment
//! is connected to a running server and how it is tested.
//!
//! # Example
//!
//! ```no_run
//! # use anyhow::Result;
//! use border_carla_env::{
//!     CarlaAct, CarlaEnv, CarlaEnvConfig, ChannelSimulator, ChannelSimulatorConfig, Location,
//! };
//! use border_core::Env;
//!
//! fn main() -> Result<()> {
//!     let (frame_tx, frame_rx) = crossbeam_channel::unbounded();
//!     let (command_tx, command_rx) = crossbeam_channel::unbounded();
//!     // A bridge thread forwards `command_rx` to the simulator and sends
//!     // the world state of every tick to `frame_tx`.
//!     # let _ = (frame_tx, command_rx);
//!
//!     let client = ChannelSimulatorConfig {
//!         frames: frame_rx,
//!         commands: command_tx,
//!         target_location: Location::new(100.0, 0.0, 0.0),
//!     };
//!     let config = CarlaEnvConfig::with_client(client).route(3);
//!     let mut env = CarlaEnv::<ChannelSimulator>::build(&config, 42)?;
//!
//!     let _obs = env.reset()?;
//!     let (step, _record) = env.step(&CarlaAct::new(1.0, 0.0)?)?;
//!     println!("reward = {}", step.reward[0]);
//!
//!     Ok(())
//! }
//! ```
mod act;
mod config;
mod env;
mod error;
pub mod lidar;
mod obs;
pub mod reward;
pub mod simulator;

pub use act::CarlaAct;
pub use config::{CarlaEnvConfig, EnvSettings};
pub use env::{CarlaEnv, CarlaInfo, EpisodeState, TRAFFIC_LIGHTS_UNLABELED};
pub use error::CarlaEnvError;
pub use lidar::{AngularHistogram, BinSelection, LidarConfig, PointCloud, PolarPoint};
pub use obs::{CarlaObs, ObsLayout, ObservationAssembler, SensorFeatures, N_STATE_FEATURES};
pub use reward::{
    BaseOutcome, DistanceShapedReward, DoneFlags, EpisodeOutcomeEvaluator, GoalReward,
    RewardConfig, RewardDecision,
};
pub use simulator::{
    ChannelSimulator, ChannelSimulatorConfig, CollisionEvent, LaneMarkingType, Location,
    SensorFactory, SimulatorClient, VehicleControl, VehicleKinematics,
};
